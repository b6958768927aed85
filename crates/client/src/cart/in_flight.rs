//! Per-record serialization of cart mutations.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use record_store_core::RecordId;

/// Records with an add or remove awaiting the remote service.
#[derive(Debug, Default)]
pub(super) struct InFlight {
    records: Mutex<HashSet<RecordId>>,
}

impl InFlight {
    /// Claim `record_id`, or `None` if a mutation for it is still running.
    pub(super) fn claim(&self, record_id: RecordId) -> Option<InFlightGuard<'_>> {
        let inserted = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record_id);
        inserted.then_some(InFlightGuard {
            owner: self,
            record_id,
        })
    }

    pub(super) fn contains(&self, record_id: RecordId) -> bool {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&record_id)
    }
}

/// Releases the claim on drop, whether the mutation succeeded or rolled back.
#[derive(Debug)]
pub(super) struct InFlightGuard<'a> {
    owner: &'a InFlight,
    record_id: RecordId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.owner
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.record_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive_per_record() {
        let in_flight = InFlight::default();
        let first = in_flight.claim(RecordId::new(1));
        assert!(first.is_some());
        assert!(in_flight.claim(RecordId::new(1)).is_none());
        assert!(in_flight.claim(RecordId::new(2)).is_some());

        drop(first);
        assert!(!in_flight.contains(RecordId::new(1)));
        assert!(in_flight.claim(RecordId::new(1)).is_some());
    }
}

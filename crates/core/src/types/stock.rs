//! Stock change notifications.

use serde::{Deserialize, Serialize};

use super::id::RecordId;

/// A record's available stock changed to `new_stock`.
///
/// Events carry no timestamp; their delivery order is the order of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEvent {
    pub record_id: RecordId,
    pub new_stock: u32,
}

impl StockEvent {
    #[must_use]
    pub const fn new(record_id: RecordId, new_stock: u32) -> Self {
        Self {
            record_id,
            new_stock,
        }
    }
}

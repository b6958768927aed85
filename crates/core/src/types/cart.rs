//! Cart lines and the derived cart state.
//!
//! [`CartState`] is immutable: every mutation returns a new value whose item
//! count and monetary total are recomputed from its lines. That keeps the
//! count/total invariants true after any mutation, rollbacks included.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::RecordId;
use super::price::Price;

/// One record's quantity and locked-in unit price within a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub record_id: RecordId,
    pub quantity: u32,
    /// Unit price captured when the record was first added.
    pub unit_price: Price,
}

impl CartLine {
    /// Create a line.
    #[must_use]
    pub const fn new(record_id: RecordId, quantity: u32, unit_price: Price) -> Self {
        Self {
            record_id,
            quantity,
            unit_price,
        }
    }

    /// Quantity times the snapshot price.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// Whether cart functionality is available for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartStatus {
    pub enabled: bool,
}

/// Remote response to an add or remove call.
///
/// The server may report the record's remaining stock and the line quantity
/// it now holds. Either may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartMutation {
    pub record_id: RecordId,
    pub stock: Option<u32>,
    pub quantity: Option<u32>,
}

/// The complete cart of one session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CartState {
    lines: BTreeMap<RecordId, CartLine>,
    enabled: bool,
    item_count: u32,
    total: Price,
    synced_at: Option<DateTime<Utc>>,
}

impl CartState {
    /// An empty cart with cart functionality switched off.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// An empty cart with the given enabled flag.
    #[must_use]
    pub fn empty(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    /// Build a cart from remote lines.
    ///
    /// Lines with zero quantity are dropped. When a record appears more than
    /// once the last line wins.
    #[must_use]
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>, enabled: bool) -> Self {
        let lines = lines
            .into_iter()
            .filter(|line| line.quantity > 0)
            .map(|line| (line.record_id, line))
            .collect();
        Self::rebuild(lines, enabled, None)
    }

    fn rebuild(
        lines: BTreeMap<RecordId, CartLine>,
        enabled: bool,
        synced_at: Option<DateTime<Utc>>,
    ) -> Self {
        let item_count = lines
            .values()
            .fold(0_u32, |acc, line| acc.saturating_add(line.quantity));
        let total = lines.values().map(CartLine::subtotal).sum();
        Self {
            lines,
            enabled,
            item_count,
            total,
            synced_at,
        }
    }

    /// Stamp the state with the time it was fetched from the remote cart.
    #[must_use]
    pub fn synced(mut self, at: DateTime<Utc>) -> Self {
        self.synced_at = Some(at);
        self
    }

    /// Copy of this cart with a different enabled flag.
    #[must_use]
    pub fn with_enabled(&self, enabled: bool) -> Self {
        Self {
            enabled,
            ..self.clone()
        }
    }

    /// Copy of this cart with one more unit of `record_id`.
    ///
    /// A new line captures `unit_price`; an existing line keeps its snapshot.
    #[must_use]
    pub fn with_added(&self, record_id: RecordId, unit_price: Price) -> Self {
        let mut lines = self.lines.clone();
        lines
            .entry(record_id)
            .and_modify(|line| line.quantity = line.quantity.saturating_add(1))
            .or_insert_with(|| CartLine::new(record_id, 1, unit_price));
        Self::rebuild(lines, self.enabled, self.synced_at)
    }

    /// Copy of this cart with one unit of `record_id` less.
    ///
    /// Quantity floors at zero and the line disappears when it reaches zero.
    #[must_use]
    pub fn with_removed(&self, record_id: RecordId) -> Self {
        let mut lines = self.lines.clone();
        if let Some(line) = lines.get_mut(&record_id) {
            line.quantity = line.quantity.saturating_sub(1);
            if line.quantity == 0 {
                lines.remove(&record_id);
            }
        }
        Self::rebuild(lines, self.enabled, self.synced_at)
    }

    /// Iterate over the lines in record id order.
    pub fn lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.values()
    }

    /// The line for a record, if present.
    #[must_use]
    pub fn line(&self, record_id: RecordId) -> Option<&CartLine> {
        self.lines.get(&record_id)
    }

    /// Quantity of a record in the cart, zero when absent.
    #[must_use]
    pub fn quantity_of(&self, record_id: RecordId) -> u32 {
        self.lines.get(&record_id).map_or(0, |line| line.quantity)
    }

    /// Sum of all line quantities.
    #[must_use]
    pub const fn item_count(&self) -> u32 {
        self.item_count
    }

    /// Sum of quantity times snapshot price over all lines.
    #[must_use]
    pub const fn total(&self) -> Price {
        self.total
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// When the state was last replaced from the remote cart.
    #[must_use]
    pub const fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.synced_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: i32) -> RecordId {
        RecordId::new(n)
    }

    fn assert_derived_consistent(cart: &CartState) {
        let count: u32 = cart.lines().map(|l| l.quantity).sum();
        let total: Price = cart.lines().map(CartLine::subtotal).sum();
        assert_eq!(cart.item_count(), count);
        assert_eq!(cart.total(), total);
        assert!(cart.lines().all(|l| l.quantity > 0));
    }

    #[test]
    fn test_add_and_remove_keep_totals_consistent() {
        let price = Price::from_cents(1500);
        let mut cart = CartState::empty(true);
        for step in [true, true, false, true, false, false, false] {
            cart = if step {
                cart.with_added(id(1), price)
            } else {
                cart.with_removed(id(1))
            };
            assert_derived_consistent(&cart);
        }
        assert_eq!(cart.quantity_of(id(1)), 0);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_existing_line_keeps_price_snapshot() {
        let cart = CartState::empty(true)
            .with_added(id(1), Price::from_cents(1000))
            .with_added(id(1), Price::from_cents(9999));
        assert_eq!(cart.line(id(1)).map(|l| l.unit_price), Some(Price::from_cents(1000)));
        assert_eq!(cart.total(), Price::from_cents(2000));
    }

    #[test]
    fn test_from_lines_drops_zero_and_keeps_last_duplicate() {
        let cart = CartState::from_lines(
            [
                CartLine::new(id(1), 2, Price::from_cents(500)),
                CartLine::new(id(2), 0, Price::from_cents(700)),
                CartLine::new(id(1), 3, Price::from_cents(500)),
            ],
            true,
        );
        assert_eq!(cart.quantity_of(id(1)), 3);
        assert!(cart.line(id(2)).is_none());
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.total(), Price::from_cents(1500));
        assert_derived_consistent(&cart);
    }

    #[test]
    fn test_remove_missing_line_is_noop() {
        let cart = CartState::empty(true).with_removed(id(4));
        assert!(cart.is_empty());
        assert_eq!(cart.item_count(), 0);
    }

    #[test]
    fn test_disabled_is_empty() {
        let cart = CartState::disabled();
        assert!(!cart.is_enabled());
        assert_eq!(cart.total(), Price::ZERO);
        assert!(cart.synced_at().is_none());
    }
}

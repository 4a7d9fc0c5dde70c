//! Issues receipts and maps materialized requests to their reactor timers.

use crate::common::{Receipt, TimerHandle};
use std::collections::HashMap;

/// Where a receipt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptState {
    /// Accepted and still waiting in the schedule queue.
    Pending,
    /// Registered with the reactor under a live timer.
    Materialized(TimerHandle),
    /// Cancelled, completed, or never issued.
    Unknown,
}

#[derive(Debug, Default)]
pub struct ReceiptRegistry {
    last_receipt: u64,
    timers: HashMap<Receipt, TimerHandle>,
}

impl ReceiptRegistry {
    /// Allocates the next receipt. The first receipt is 1.
    pub fn issue(&mut self) -> Receipt {
        self.last_receipt += 1;
        Receipt(self.last_receipt)
    }

    pub fn insert(&mut self, receipt: Receipt, handle: TimerHandle) {
        self.timers.insert(receipt, handle);
    }

    pub fn remove(&mut self, receipt: Receipt) -> Option<TimerHandle> {
        self.timers.remove(&receipt)
    }

    pub fn handle(&self, receipt: Receipt) -> Option<TimerHandle> {
        self.timers.get(&receipt).copied()
    }

    /// Number of materialized receipts.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_receipts_start_at_one_and_increase() {
        let mut registry = ReceiptRegistry::default();
        let issued: Vec<_> = (0..4).map(|_| registry.issue()).collect();
        assert_eq!(issued, vec![Receipt(1), Receipt(2), Receipt(3), Receipt(4)]);
    }

    #[test]
    fn test_remove_hands_back_the_timer_once() {
        let mut handles: SlotMap<TimerHandle, ()> = SlotMap::with_key();
        let handle = handles.insert(());
        let mut registry = ReceiptRegistry::default();
        let receipt = registry.issue();

        registry.insert(receipt, handle);
        assert_eq!(registry.handle(receipt), Some(handle));
        assert_eq!(registry.remove(receipt), Some(handle));
        assert_eq!(registry.remove(receipt), None);
        assert!(registry.is_empty());
    }
}

use std::sync::atomic::{AtomicI64, Ordering};

use crossbeam_utils::CachePadded;

use crate::epoch::Epoch;

/// Two signed accumulators, one per epoch slot.
pub(crate) struct CounterCell {
    slots: [CachePadded<AtomicI64>; 2],
}

impl CounterCell {
    pub(crate) fn new() -> CounterCell {
        CounterCell {
            slots: [CachePadded::new(AtomicI64::new(0)), CachePadded::new(AtomicI64::new(0))],
        }
    }

    pub(crate) fn inc(&self, epoch: Epoch, value: i64) {
        self.slots[epoch.index()].fetch_add(value, Ordering::Relaxed);
    }

    /// Takes the count accumulated in the slot since it was last read.
    pub(crate) fn read(&self, epoch: Epoch) -> i64 {
        self.slots[epoch.index()].swap(0, Ordering::Relaxed)
    }
}

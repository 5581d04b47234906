use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::epoch::Epoch;

/// Two bit-punned doubles, one per epoch slot.
///
/// A NaN in a slot marks it as already read.  Reading swaps the sentinel in and copies any
/// observed value forward into the other slot, so a gauge that goes quiet keeps reporting its
/// last value instead of dropping out of the sweep.  The forward copy can lose a race against a
/// concurrent `set` on the live slot; the freshly set value wins either way at the next read.
pub(crate) struct GaugeCell {
    slots: [CachePadded<AtomicU64>; 2],
}

impl GaugeCell {
    pub(crate) fn new() -> GaugeCell {
        let zero = 0f64.to_bits();
        GaugeCell {
            slots: [CachePadded::new(AtomicU64::new(zero)), CachePadded::new(AtomicU64::new(zero))],
        }
    }

    pub(crate) fn set(&self, epoch: Epoch, value: f64) {
        self.slots[epoch.index()].store(value.to_bits(), Ordering::Relaxed);
    }

    /// Takes the slot value, or `None` when nothing was observed since the last read.
    ///
    /// Setting a gauge to NaN is allowed and reads back as "no value".
    pub(crate) fn read(&self, epoch: Epoch) -> Option<f64> {
        let bits = self.slots[epoch.index()].swap(f64::NAN.to_bits(), Ordering::Relaxed);
        let value = f64::from_bits(bits);
        if value.is_nan() {
            return None;
        }

        // Keep the value around for the next epoch.
        self.slots[epoch.other().index()].store(bits, Ordering::Relaxed);
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::GaugeCell;
    use crate::epoch::Epoch;

    #[test]
    fn test_fresh_gauge_reads_zero() {
        let gauge = GaugeCell::new();
        assert_eq!(gauge.read(Epoch(0)), Some(0.0));
    }

    #[test]
    fn test_read_is_sticky_across_slots() {
        let gauge = GaugeCell::new();
        gauge.set(Epoch(0), 4.2);

        assert_eq!(gauge.read(Epoch(0)), Some(4.2));
        assert_eq!(gauge.read(Epoch(1)), Some(4.2));
        assert_eq!(gauge.read(Epoch(0)), Some(4.2));
    }

    #[test]
    fn test_second_read_of_slot_is_empty() {
        let gauge = GaugeCell::new();
        gauge.set(Epoch(0), 1.0);

        assert_eq!(gauge.read(Epoch(0)), Some(1.0));

        // The forward copy landed in slot 1; slot 0 holds the sentinel until the next set.
        gauge.set(Epoch(1), 2.0);
        assert_eq!(gauge.read(Epoch(0)), None);
    }

    #[test]
    fn test_nan_set_reads_as_absent() {
        let gauge = GaugeCell::new();
        gauge.set(Epoch(0), f64::NAN);
        assert_eq!(gauge.read(Epoch(0)), None);
    }
}

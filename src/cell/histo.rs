use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::epoch::Epoch;
use crate::error::Error;
use crate::poll::HistoSummary;

/// Maximum number of buckets in a histogram.
pub const MAX_BUCKETS: usize = 8;

struct HistoSlot {
    counts: [AtomicU64; MAX_BUCKETS],
    below: AtomicU64,
    above: AtomicU64,
}

impl HistoSlot {
    fn new() -> HistoSlot {
        HistoSlot {
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
            below: AtomicU64::new(0),
            above: AtomicU64::new(0),
        }
    }
}

/// Fixed-threshold bucket counts, two slots sharing one set of thresholds.
///
/// `thresholds` holds `buckets + 1` strictly ascending values delimiting half-open buckets
/// `[t[i], t[i+1])`; values below the first threshold land in `below`, values at or past the
/// last land in `above`.
pub(crate) struct HistoCell {
    thresholds: Box<[u64]>,
    slots: [CachePadded<HistoSlot>; 2],
}

impl HistoCell {
    pub(crate) fn new(thresholds: &[u64]) -> Result<HistoCell, Error> {
        if thresholds.len() < 2 || thresholds.len() > MAX_BUCKETS + 1 {
            return Err(Error::InvalidThresholds);
        }
        if thresholds.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(Error::InvalidThresholds);
        }

        Ok(HistoCell {
            thresholds: thresholds.into(),
            slots: [CachePadded::new(HistoSlot::new()), CachePadded::new(HistoSlot::new())],
        })
    }

    pub(crate) fn record(&self, epoch: Epoch, value: f64) {
        // NaN compares outside every bucket; drop it rather than misfile it.
        if value.is_nan() {
            return;
        }

        let slot = &self.slots[epoch.index()];

        let first = self.thresholds[0] as f64;
        let last = self.thresholds[self.thresholds.len() - 1] as f64;

        if value < first {
            slot.below.fetch_add(1, Ordering::Relaxed);
        } else if value >= last {
            slot.above.fetch_add(1, Ordering::Relaxed);
        } else {
            let bucket = self.thresholds.partition_point(|&t| (t as f64) <= value) - 1;
            slot.counts[bucket].fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Takes every count accumulated in the slot since it was last read.
    pub(crate) fn read(&self, epoch: Epoch) -> HistoSummary {
        let slot = &self.slots[epoch.index()];
        let buckets = self.thresholds.len() - 1;

        HistoSummary {
            thresholds: self.thresholds.to_vec(),
            counts: (0..buckets).map(|i| slot.counts[i].swap(0, Ordering::Relaxed)).collect(),
            below: slot.below.swap(0, Ordering::Relaxed),
            above: slot.above.swap(0, Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::HistoCell;
    use crate::epoch::Epoch;
    use crate::error::Error;

    #[test]
    fn test_rejects_bad_thresholds() {
        assert!(matches!(HistoCell::new(&[]), Err(Error::InvalidThresholds)));
        assert!(matches!(HistoCell::new(&[10]), Err(Error::InvalidThresholds)));
        assert!(matches!(HistoCell::new(&[10, 10]), Err(Error::InvalidThresholds)));
        assert!(matches!(HistoCell::new(&[20, 10]), Err(Error::InvalidThresholds)));
        assert!(matches!(
            HistoCell::new(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]),
            Err(Error::InvalidThresholds)
        ));
        assert!(HistoCell::new(&[1, 2, 3, 4, 5, 6, 7, 8, 9]).is_ok());
    }

    #[test]
    fn test_boundary_values() {
        let histo = HistoCell::new(&[10, 20, 30, 40]).unwrap();
        let epoch = Epoch(0);

        for value in [5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0] {
            histo.record(epoch, value);
        }

        let summary = histo.read(epoch);
        assert_eq!(summary.below, 1);
        assert_eq!(summary.counts, vec![2, 2, 2]);
        assert_eq!(summary.above, 1);
    }

    #[test]
    fn test_read_resets_slot() {
        let histo = HistoCell::new(&[1, 2]).unwrap();
        let epoch = Epoch(1);

        histo.record(epoch, 1.5);
        histo.record(epoch, 0.0);
        histo.record(epoch, 9.0);

        let summary = histo.read(epoch);
        assert_eq!((summary.below, summary.above), (1, 1));
        assert_eq!(summary.counts, vec![1]);

        let summary = histo.read(epoch);
        assert_eq!((summary.below, summary.above), (0, 0));
        assert_eq!(summary.counts, vec![0]);
    }
}

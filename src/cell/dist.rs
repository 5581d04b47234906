use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

use crate::epoch::Epoch;
use crate::error::ReadError;
use crate::poll::DistSummary;
use crate::rng;

/// Number of samples kept per slot.
///
/// The size here is a trade-off between memory usage and the growth rate of the error bounds as
/// more elements are added to the reservoir.  Percentiles need at least 100 values, and there is
/// no way to achieve a constant error bound with reservoir sampling, so this stays on the low
/// side of memory consumption.
pub const RESERVOIR_LEN: usize = 200;

struct Reservoir {
    n: u64,
    max: f64,
    samples: [f64; RESERVOIR_LEN],
}

impl Reservoir {
    fn new() -> Reservoir {
        Reservoir { n: 0, max: 0.0, samples: [0.0; RESERVOIR_LEN] }
    }
}

/// Two lock-guarded reservoirs, one per epoch slot.
///
/// The lock is per-slot: recorders only contend with other recorders hitting the same metric at
/// the same instant, and the poller only touches the retired slot, so steady-state recording
/// never waits on a sweep.
pub(crate) struct DistCell {
    slots: [CachePadded<Mutex<Reservoir>>; 2],
}

impl DistCell {
    pub(crate) fn new() -> DistCell {
        DistCell {
            slots: [
                CachePadded::new(Mutex::new(Reservoir::new())),
                CachePadded::new(Mutex::new(Reservoir::new())),
            ],
        }
    }

    pub(crate) fn record(&self, epoch: Epoch, value: f64) {
        let mut slot = self.slots[epoch.index()].lock();

        let mut index = slot.n as usize;
        if index >= RESERVOIR_LEN {
            index = rng::sample_index(slot.n as usize);
        }
        if index < RESERVOIR_LEN {
            slot.samples[index] = value;
        }

        slot.n += 1;
        if value > slot.max {
            slot.max = value;
        }
    }

    /// Drains the slot and summarizes it.
    ///
    /// A straggling recorder still holding the slot surfaces as [`ReadError::Busy`]; the slot is
    /// left intact for the next sweep.
    pub(crate) fn read(&self, epoch: Epoch) -> Result<DistSummary, ReadError> {
        let (count, max, mut samples) = {
            let mut slot = self.slots[epoch.index()].try_lock().ok_or(ReadError::Busy)?;

            let count = slot.n;
            let max = slot.max;
            let len = (count as usize).min(RESERVOIR_LEN);
            let samples = slot.samples[..len].to_vec();

            slot.n = 0;
            slot.max = 0.0;

            (count, max, samples)
        };

        if count == 0 {
            return Ok(DistSummary { count: 0, p50: 0.0, p90: 0.0, p99: 0.0, max: 0.0 });
        }

        samples.sort_unstable_by(f64::total_cmp);

        Ok(DistSummary {
            count,
            p50: percentile(&samples, 50),
            p90: percentile(&samples, 90),
            p99: percentile(&samples, 99),
            max,
        })
    }
}

fn percentile(sorted: &[f64], pct: usize) -> f64 {
    sorted[(sorted.len() * pct) / 100]
}

#[cfg(test)]
mod tests {
    use super::{DistCell, RESERVOIR_LEN};
    use crate::epoch::Epoch;
    use crate::error::ReadError;

    #[test]
    fn test_exact_percentiles_below_capacity() {
        let dist = DistCell::new();
        let epoch = Epoch(0);

        for value in 1..=100 {
            dist.record(epoch, value as f64);
        }

        let summary = dist.read(epoch).unwrap();
        assert_eq!(summary.count, 100);
        assert_eq!(summary.p50, 51.0);
        assert_eq!(summary.p90, 91.0);
        assert_eq!(summary.p99, 100.0);
        assert_eq!(summary.max, 100.0);
    }

    #[test]
    fn test_read_resets_slot() {
        let dist = DistCell::new();
        let epoch = Epoch(1);

        dist.record(epoch, 10.0);
        let summary = dist.read(epoch).unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.max, 10.0);

        let summary = dist.read(epoch).unwrap();
        assert_eq!(summary.count, 0);
        assert_eq!(summary.max, 0.0);
    }

    #[test]
    fn test_overflow_keeps_reservoir_bounded() {
        let dist = DistCell::new();
        let epoch = Epoch(0);

        for value in 0..10 * RESERVOIR_LEN as u64 {
            dist.record(epoch, value as f64);
        }

        let summary = dist.read(epoch).unwrap();
        assert_eq!(summary.count, 10 * RESERVOIR_LEN as u64);
        assert_eq!(summary.max, (10 * RESERVOIR_LEN - 1) as f64);
        assert!(summary.p50 > 0.0);
        assert!(summary.p50 <= summary.p90);
        assert!(summary.p90 <= summary.p99);
    }

    #[test]
    fn test_held_slot_reads_busy() {
        let dist = DistCell::new();
        let epoch = Epoch(0);
        dist.record(epoch, 1.0);

        let guard = dist.slots[epoch.index()].lock();
        assert_eq!(dist.read(epoch).unwrap_err(), ReadError::Busy);
        drop(guard);

        assert_eq!(dist.read(epoch).unwrap().count, 1);
    }
}

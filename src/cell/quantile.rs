use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::epoch::Epoch;
use crate::error::Error;
use crate::poll::QuantileSummary;
use crate::rng;

/// Streaming quantile estimator.
///
/// The estimate is `estimate + multiplier * adjustment` and moves by one adjustment step at a
/// time: each observation runs a Bernoulli trial with the target quantile as its probability and
/// nudges the multiplier when the trial disagrees with the side of the estimate the value fell
/// on.  At the target quantile the two nudges balance out.
///
/// The multiplier is shared across both slots rather than double-buffered; the estimate has to
/// evolve continuously across flips.  Only the observation counters are windowed.
pub(crate) struct QuantileCell {
    quantile: f64,
    estimate: f64,
    adjustment: f64,
    multiplier: CachePadded<AtomicI64>,
    counts: [CachePadded<AtomicU64>; 2],
}

impl QuantileCell {
    pub(crate) fn new(quantile: f64, estimate: f64, adjustment: f64) -> Result<QuantileCell, Error> {
        if !(quantile > 0.0 && quantile < 1.0) {
            return Err(Error::InvalidQuantile(quantile));
        }

        Ok(QuantileCell {
            quantile,
            estimate,
            adjustment,
            multiplier: CachePadded::new(AtomicI64::new(0)),
            counts: [CachePadded::new(AtomicU64::new(0)), CachePadded::new(AtomicU64::new(0))],
        })
    }

    fn value(&self) -> f64 {
        self.estimate + self.multiplier.load(Ordering::Relaxed) as f64 * self.adjustment
    }

    pub(crate) fn update(&self, epoch: Epoch, value: f64) {
        let estimate = self.value();
        let trial = rng::coin_flip(self.quantile);

        if value < estimate {
            if !trial {
                self.multiplier.fetch_sub(1, Ordering::Relaxed);
            }
        } else if trial {
            self.multiplier.fetch_add(1, Ordering::Relaxed);
        }

        // The count is not used to steer the estimate, so how exact it is doesn't matter much
        // and relaxed is fine.
        self.counts[epoch.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn read(&self, epoch: Epoch) -> QuantileSummary {
        QuantileSummary {
            quantile: self.quantile,
            sample: self.value(),
            count: self.counts[epoch.index()].swap(0, Ordering::Relaxed),
        }
    }
}

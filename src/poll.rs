use std::ops::ControlFlow;

use crate::cell::Kind;
use crate::key::Key;

/// Summary of one distribution slot: sample count plus percentiles over the sorted reservoir.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistSummary {
    /// Values recorded in the window, including those the reservoir sampled away.
    pub count: u64,
    /// Median.
    pub p50: f64,
    /// 90th percentile.
    pub p90: f64,
    /// 99th percentile.
    pub p99: f64,
    /// Largest value recorded in the window.
    pub max: f64,
}

/// Summary of one histogram slot.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoSummary {
    /// The `counts.len() + 1` thresholds delimiting the buckets.
    pub thresholds: Vec<u64>,
    /// Per-bucket counts for the window.
    pub counts: Vec<u64>,
    /// Values below the first threshold.
    pub below: u64,
    /// Values at or above the last threshold.
    pub above: u64,
}

/// Summary of one quantile slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuantileSummary {
    /// The target quantile.
    pub quantile: f64,
    /// The current estimate.
    pub sample: f64,
    /// Observations seen in the window.
    pub count: u64,
}

/// A value read out of one metric slot during a sweep.
#[derive(Clone, Debug, PartialEq)]
pub enum Reading {
    /// Windowed event count.
    Counter(i64),
    /// Last observed value, or `None` when the window saw no value.
    Gauge(Option<f64>),
    /// Distribution summary.
    Dist(DistSummary),
    /// Histogram summary.
    Histo(HistoSummary),
    /// Quantile summary.
    Quantile(QuantileSummary),
}

impl Reading {
    /// The kind of metric this reading came from.
    pub fn kind(&self) -> Kind {
        match self {
            Reading::Counter(_) => Kind::Counter,
            Reading::Gauge(_) => Kind::Gauge,
            Reading::Dist(_) => Kind::Dist,
            Reading::Histo(_) => Kind::Histo,
            Reading::Quantile(_) => Kind::Quantile,
        }
    }
}

/// One polled metric, handed to backends for the duration of a [`Metric`] event.
///
/// Nothing borrowed from a `Poll` may be retained past the event callback; the borrow checker
/// holds backends to that.
///
/// [`Metric`]: crate::PollEvent::Metric
#[derive(Clone, Debug)]
pub struct Poll<'a> {
    /// The polling host, possibly empty.
    pub host: &'a str,
    /// The registry prefix.
    pub prefix: &'a str,
    /// The metric name.
    pub name: &'a str,
    /// Timestamp of the sweep, in seconds.
    pub ts: u64,
    /// Seconds covered by the window; always at least one.
    pub elapsed: u64,
    /// The value read from the retired slot.
    pub reading: Reading,
}

impl Poll<'_> {
    /// Flattens the reading into `(ts, dotted-key, value)` tuples.
    ///
    /// Keys are `prefix.host.name`, extended with a suffix for composite kinds.  Event counts
    /// are rescaled to per-second rates over the window; gauges, percentiles, maxima, and
    /// quantile estimates are passed through as-is.  A gauge with no value for the window emits
    /// nothing.
    ///
    /// The callback can stop the emission early by returning [`ControlFlow::Break`].
    pub fn normalize<F>(&self, mut emit: F) -> ControlFlow<()>
    where
        F: FnMut(u64, &str, f64) -> ControlFlow<()>,
    {
        let mut key = Key::new();
        key.push(self.prefix);
        key.push(self.host);
        key.push(self.name);

        match &self.reading {
            Reading::Counter(count) => emit(self.ts, key.as_str(), self.rescale(*count as f64)),

            Reading::Gauge(value) => match value {
                Some(value) if !value.is_nan() => emit(self.ts, key.as_str(), *value),
                _ => ControlFlow::Continue(()),
            },

            Reading::Dist(dist) => {
                let parts = [
                    ("count", self.rescale(dist.count as f64)),
                    ("p50", dist.p50),
                    ("p90", dist.p90),
                    ("p99", dist.p99),
                    ("max", dist.max),
                ];
                for (suffix, value) in parts {
                    let pos = key.push(suffix);
                    let flow = emit(self.ts, key.as_str(), value);
                    key.pop(pos);
                    flow?;
                }
                ControlFlow::Continue(())
            }

            Reading::Histo(histo) => {
                let pos = key.push("below");
                let flow = emit(self.ts, key.as_str(), self.rescale(histo.below as f64));
                key.pop(pos);
                flow?;

                for (bucket, count) in histo.counts.iter().enumerate() {
                    let pos = key.pushf(format_args!("{}", histo.thresholds[bucket + 1]));
                    let flow = emit(self.ts, key.as_str(), self.rescale(*count as f64));
                    key.pop(pos);
                    flow?;
                }

                let pos = key.push("above");
                let flow = emit(self.ts, key.as_str(), self.rescale(histo.above as f64));
                key.pop(pos);
                flow
            }

            Reading::Quantile(quantile) => emit(self.ts, key.as_str(), quantile.sample),
        }
    }

    fn rescale(&self, value: f64) -> f64 {
        value / self.elapsed.max(1) as f64
    }
}

//! User-facing metric handles.
//!
//! Handles are cheap to clone and free to record through: each one is a shared reference to its
//! cell plus the registry whose epoch steers the slot selection.  Dropping a handle releases
//! nothing but the reference; [`close`](Counter::close) is what actually unregisters a metric.

use std::sync::Arc;

use crate::cell::{Body, Cell, Kind};
use crate::epoch::Epoch;
use crate::error::ReadError;
use crate::poll::{DistSummary, HistoSummary, QuantileSummary};
use crate::registry::Registry;
use crate::timer::{Scale, Timer};

macro_rules! common_methods {
    ($kind:expr) => {
        /// The metric name.
        pub fn name(&self) -> &str {
            self.cell.name()
        }

        /// The metric kind.
        pub fn kind(&self) -> Kind {
            $kind
        }

        /// Unregisters the metric.
        ///
        /// Returns `false` when the metric was already closed.  Other clones of the handle stay
        /// usable but their records no longer reach any sweep.
        pub fn close(self) -> bool {
            self.registry.close_cell(&self.cell)
        }
    };
}

/// A windowed event counter, reported as a per-second rate.
#[derive(Clone)]
pub struct Counter {
    cell: Arc<Cell>,
    registry: Registry,
}

impl Counter {
    pub(crate) fn new(cell: Arc<Cell>, registry: Registry) -> Counter {
        debug_assert_eq!(cell.kind(), Kind::Counter);
        Counter { cell, registry }
    }

    fn body(&self) -> &crate::cell::CounterCell {
        match self.cell.body() {
            Body::Counter(counter) => counter,
            _ => unreachable!("counter handle over non-counter cell"),
        }
    }

    /// Adds `value` to the current window.  One relaxed atomic add.
    pub fn inc(&self, value: i64) {
        self.body().inc(self.registry.epoch(), value);
    }

    /// Reads and resets the slot for `epoch`.
    pub fn read(&self, epoch: Epoch) -> i64 {
        self.body().read(epoch)
    }

    common_methods!(Kind::Counter);
}

/// A last-value-wins measurement.
#[derive(Clone)]
pub struct Gauge {
    cell: Arc<Cell>,
    registry: Registry,
}

impl Gauge {
    pub(crate) fn new(cell: Arc<Cell>, registry: Registry) -> Gauge {
        debug_assert_eq!(cell.kind(), Kind::Gauge);
        Gauge { cell, registry }
    }

    fn body(&self) -> &crate::cell::GaugeCell {
        match self.cell.body() {
            Body::Gauge(gauge) => gauge,
            _ => unreachable!("gauge handle over non-gauge cell"),
        }
    }

    /// Records the measurement.  One relaxed atomic store.
    ///
    /// Setting NaN is allowed and reads back as "no value".
    pub fn set(&self, value: f64) {
        self.body().set(self.registry.epoch(), value);
    }

    /// Reads the slot for `epoch`, carrying any observed value over to the other slot.
    pub fn read(&self, epoch: Epoch) -> Option<f64> {
        self.body().read(epoch)
    }

    common_methods!(Kind::Gauge);
}

/// A reservoir-sampled distribution, reported as count, percentiles, and max.
#[derive(Clone)]
pub struct Distribution {
    cell: Arc<Cell>,
    registry: Registry,
}

impl Distribution {
    pub(crate) fn new(cell: Arc<Cell>, registry: Registry) -> Distribution {
        debug_assert_eq!(cell.kind(), Kind::Dist);
        Distribution { cell, registry }
    }

    fn body(&self) -> &crate::cell::DistCell {
        match self.cell.body() {
            Body::Dist(dist) => dist,
            _ => unreachable!("distribution handle over non-distribution cell"),
        }
    }

    /// Records one sample.  Takes the slot lock; contention is recorder-vs-recorder only.
    pub fn record(&self, value: f64) {
        self.body().record(self.registry.epoch(), value);
    }

    /// Records the seconds elapsed on `timer`.
    pub fn record_elapsed(&self, timer: Timer) {
        self.record(timer.elapsed(Scale::Seconds));
    }

    /// Reads and resets the slot for `epoch`.
    pub fn read(&self, epoch: Epoch) -> Result<DistSummary, ReadError> {
        self.body().read(epoch)
    }

    common_methods!(Kind::Dist);
}

/// A fixed-threshold bucketed histogram.
#[derive(Clone)]
pub struct Histogram {
    cell: Arc<Cell>,
    registry: Registry,
}

impl Histogram {
    pub(crate) fn new(cell: Arc<Cell>, registry: Registry) -> Histogram {
        debug_assert_eq!(cell.kind(), Kind::Histo);
        Histogram { cell, registry }
    }

    fn body(&self) -> &crate::cell::HistoCell {
        match self.cell.body() {
            Body::Histo(histo) => histo,
            _ => unreachable!("histogram handle over non-histogram cell"),
        }
    }

    /// Counts `value` into its bucket.  A binary search plus one relaxed atomic add.
    pub fn record(&self, value: f64) {
        self.body().record(self.registry.epoch(), value);
    }

    /// Reads and resets the slot for `epoch`.
    pub fn read(&self, epoch: Epoch) -> HistoSummary {
        self.body().read(epoch)
    }

    common_methods!(Kind::Histo);
}

/// A streaming quantile estimator.
#[derive(Clone)]
pub struct Quantile {
    cell: Arc<Cell>,
    registry: Registry,
}

impl Quantile {
    pub(crate) fn new(cell: Arc<Cell>, registry: Registry) -> Quantile {
        debug_assert_eq!(cell.kind(), Kind::Quantile);
        Quantile { cell, registry }
    }

    fn body(&self) -> &crate::cell::QuantileCell {
        match self.cell.body() {
            Body::Quantile(quantile) => quantile,
            _ => unreachable!("quantile handle over non-quantile cell"),
        }
    }

    /// Feeds one observation into the estimate.
    pub fn update(&self, value: f64) {
        self.body().update(self.registry.epoch(), value);
    }

    /// Reads the current estimate and resets the observation count for `epoch`.
    pub fn read(&self, epoch: Epoch) -> QuantileSummary {
        self.body().read(epoch)
    }

    common_methods!(Kind::Quantile);
}

/// A metric handle of any kind, as returned by [`Registry::get`].
#[derive(Clone)]
pub enum Handle {
    /// A counter.
    Counter(Counter),
    /// A gauge.
    Gauge(Gauge),
    /// A distribution.
    Distribution(Distribution),
    /// A histogram.
    Histogram(Histogram),
    /// A quantile estimator.
    Quantile(Quantile),
}

impl Handle {
    pub(crate) fn from_cell(cell: Arc<Cell>, registry: Registry) -> Handle {
        match cell.kind() {
            Kind::Counter => Handle::Counter(Counter::new(cell, registry)),
            Kind::Gauge => Handle::Gauge(Gauge::new(cell, registry)),
            Kind::Dist => Handle::Distribution(Distribution::new(cell, registry)),
            Kind::Histo => Handle::Histogram(Histogram::new(cell, registry)),
            Kind::Quantile => Handle::Quantile(Quantile::new(cell, registry)),
        }
    }

    /// The metric name.
    pub fn name(&self) -> &str {
        match self {
            Handle::Counter(h) => h.name(),
            Handle::Gauge(h) => h.name(),
            Handle::Distribution(h) => h.name(),
            Handle::Histogram(h) => h.name(),
            Handle::Quantile(h) => h.name(),
        }
    }

    /// The metric kind.
    pub fn kind(&self) -> Kind {
        match self {
            Handle::Counter(_) => Kind::Counter,
            Handle::Gauge(_) => Kind::Gauge,
            Handle::Distribution(_) => Kind::Dist,
            Handle::Histogram(_) => Kind::Histo,
            Handle::Quantile(_) => Kind::Quantile,
        }
    }

    /// Unregisters the metric.
    pub fn close(self) -> bool {
        match self {
            Handle::Counter(h) => h.close(),
            Handle::Gauge(h) => h.close(),
            Handle::Distribution(h) => h.close(),
            Handle::Histogram(h) => h.close(),
            Handle::Quantile(h) => h.close(),
        }
    }
}

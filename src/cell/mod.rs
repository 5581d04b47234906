//! Metric storage cells.
//!
//! Every metric is one heap allocation: a header carrying the name, the kind tag, and the
//! intrusive list links the registry traverses, followed by a kind-specific body.  Bodies are
//! two-slot so that the poller can read and reset one slot while recorders keep hitting the
//! other; which slot is live is decided by the registry epoch at record time.

mod counter;
mod dist;
mod gauge;
mod histo;
mod quantile;

pub(crate) use self::counter::CounterCell;
pub(crate) use self::dist::DistCell;
pub(crate) use self::gauge::GaugeCell;
pub(crate) use self::histo::HistoCell;
pub(crate) use self::quantile::QuantileCell;

pub use self::dist::RESERVOIR_LEN;
pub use self::histo::MAX_BUCKETS;

use std::fmt;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::epoch::Epoch;
use crate::error::ReadError;
use crate::poll::Reading;

/// Metric kind.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Kind {
    /// Windowed event count, reported as a rate.
    Counter,
    /// Last-value-wins measurement.
    Gauge,
    /// Reservoir-sampled value distribution, reported as percentiles.
    Dist,
    /// Fixed-threshold bucketed histogram.
    Histo,
    /// Streaming quantile estimate.
    Quantile,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Counter => "counter",
            Kind::Gauge => "gauge",
            Kind::Dist => "dist",
            Kind::Histo => "histo",
            Kind::Quantile => "quantile",
        };
        f.write_str(name)
    }
}

// The dist and histo bodies are boxed so that a cell's footprint follows its own kind rather
// than the largest body; a counter is two words of slots, a distribution is two full reservoirs.
pub(crate) enum Body {
    Counter(CounterCell),
    Gauge(GaugeCell),
    Dist(Box<DistCell>),
    Histo(Box<HistoCell>),
    Quantile(QuantileCell),
}

/// One live metric.
///
/// Aligned to a cache line; several bodies do atomic ops on their first word and an atomic that
/// straddles a line is atrociously slow.  The slots themselves are padded out by their own types.
#[repr(align(64))]
pub(crate) struct Cell {
    name: Box<str>,
    kind: Kind,

    // Traversed without the registry lock; written only under it.  `prev` is never read during
    // traversal, so a stale `next` on a removed cell stays harmless until the deferred free.
    pub(crate) next: AtomicPtr<Cell>,
    pub(crate) prev: AtomicPtr<Cell>,

    body: Body,
}

impl Cell {
    pub(crate) fn new(name: &str, body: Body) -> Cell {
        let kind = match &body {
            Body::Counter(_) => Kind::Counter,
            Body::Gauge(_) => Kind::Gauge,
            Body::Dist(_) => Kind::Dist,
            Body::Histo(_) => Kind::Histo,
            Body::Quantile(_) => Kind::Quantile,
        };

        Cell {
            name: name.into(),
            kind,
            next: AtomicPtr::new(std::ptr::null_mut()),
            prev: AtomicPtr::new(std::ptr::null_mut()),
            body,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn kind(&self) -> Kind {
        self.kind
    }

    pub(crate) fn body(&self) -> &Body {
        &self.body
    }

    pub(crate) fn next_ptr(&self) -> *mut Cell {
        // Synchronization happens on the list head; see `Registry::for_each`.
        self.next.load(Ordering::Relaxed)
    }

    /// Reads and resets the given slot, summarizing it for normalization.
    pub(crate) fn read(&self, epoch: Epoch) -> Result<Reading, ReadError> {
        match &self.body {
            Body::Counter(counter) => Ok(Reading::Counter(counter.read(epoch))),
            Body::Gauge(gauge) => Ok(Reading::Gauge(gauge.read(epoch))),
            Body::Dist(dist) => Ok(Reading::Dist(dist.read(epoch)?)),
            Body::Histo(histo) => Ok(Reading::Histo(histo.read(epoch))),
            Body::Quantile(quantile) => Ok(Reading::Quantile(quantile.read(epoch))),
        }
    }
}

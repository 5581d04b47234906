//! Epoch-windowed in-process metrics for latency-sensitive services.
//!
//! Recording a metric costs one relaxed atomic operation on the hot path, and polling runs
//! concurrently with recording without ever blocking it.  The trick is double buffering: every
//! metric carries two slots, and a global one-bit epoch decides which slot recorders write.
//! Each sweep flips the epoch, waits a moment for stragglers, then reads and resets the slot
//! recorders just vacated.
//!
//! # Metric kinds
//!
//! - [`Counter`]: windowed event count, reported as a per-second rate.
//! - [`Gauge`]: last-value-wins measurement, sticky across windows.
//! - [`Distribution`]: reservoir-sampled values, reported as count, p50/p90/p99, and max.
//! - [`Histogram`]: fixed-threshold bucket counts, reported as per-second rates.
//! - [`Quantile`]: streaming quantile estimate that survives window flips.
//!
//! # Recording
//!
//! Metrics live in a [`Registry`], keyed by name.  The `create_*` constructors insist on a fresh
//! name; the plain accessors register on first use and hand back the existing metric afterwards.
//! Handles are cheap to clone and safe to record through from any thread.
//!
//! # Polling
//!
//! A [`Poller`] owns the other side: it flips the epoch, reads every live metric, normalizes
//! composite values into flat `(timestamp, dotted-key, value)` tuples, and fans them out to
//! registered [`Backend`]s.  Keys are `prefix.host.name`, plus a suffix for composite kinds.
//! Run it by hand with [`Poller::poll`] or park it on a background thread with
//! [`Poller::spawn`].
//!
//! ```
//! use std::ops::ControlFlow;
//! use aperture::{Backend, PollEvent, Poller, Registry};
//!
//! struct Dump;
//!
//! impl Backend for Dump {
//!     fn on_poll(&mut self, event: PollEvent<'_>) {
//!         if let PollEvent::Metric(poll) = event {
//!             let _ = poll.normalize(|ts, key, value| {
//!                 println!("{} {} {}", ts, key, value);
//!                 ControlFlow::Continue(())
//!             });
//!         }
//!     }
//! }
//!
//! # fn main() -> Result<(), aperture::Error> {
//! let registry = Registry::create("web")?;
//! let requests = registry.counter("requests")?;
//! let latency = registry.dist("latency")?;
//!
//! requests.inc(1);
//! latency.record(0.087);
//!
//! let mut poller = Poller::new(&registry);
//! poller.set_host("web-01")?;
//! poller.add_backend(Box::new(Dump));
//! poller.poll();
//! # Ok(())
//! # }
//! ```
//!
//! # Guarantees, and what is given up
//!
//! A record that completes before a flip is visible to the poll of the retired epoch; the
//! library is otherwise best-effort by design.  A recorder preempted for longer than the
//! straggler grace can lose its sample to the reset, a busy distribution slot is skipped until
//! the next sweep, and a poll against a rewound clock reports a one-second window rather than
//! failing.  Overload sheds data, never blocks recorders.

mod cell;
mod epoch;
mod error;
mod handle;
mod key;
mod poll;
mod poller;
mod registry;
mod rng;
mod timer;

pub use cell::{Kind, MAX_BUCKETS, RESERVOIR_LEN};
pub use epoch::Epoch;
pub use error::{Error, ReadError};
pub use handle::{Counter, Distribution, Gauge, Handle, Histogram, Quantile};
pub use key::{Key, KEY_CAPACITY};
pub use poll::{DistSummary, HistoSummary, Poll, QuantileSummary, Reading};
pub use poller::{Backend, PollEvent, Poller, PollerThread};
pub use registry::{CellView, Registry, NAME_MAX_LEN};
pub use timer::{Scale, Timer};

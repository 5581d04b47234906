use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::warn;

use crate::error::{Error, ReadError};
use crate::key::Key;
use crate::poll::Poll;
use crate::registry::{Registry, NAME_MAX_LEN};
use crate::timer;

/// How long a flip waits before the sweep reads the retired slots.
///
/// A recorder that loaded the epoch right before the flip may still be mid-record on the slot we
/// are about to read.  Full epoch-based reclamation would track those readers exactly but would
/// also tax the record path, so the poller just waits out the stragglers and accepts that one
/// preempted for longer than this loses its sample.
const STRAGGLER_GRACE: Duration = Duration::from_millis(1);

/// Events delivered to a [`Backend`] over one sweep.
pub enum PollEvent<'a> {
    /// The sweep is starting.
    Begin,
    /// One metric's windowed value.  Emitted between `Begin` and `Done`, in no particular order.
    Metric(&'a Poll<'a>),
    /// The sweep is complete.
    Done,
}

/// A sink for polled metrics.
///
/// Implementations typically buffer [`Metric`](PollEvent::Metric) events and ship them on
/// [`Done`](PollEvent::Done).  Cleanup belongs in `Drop`.
pub trait Backend: Send {
    /// Receives one sweep event.
    fn on_poll(&mut self, event: PollEvent<'_>);
}

/// Drives the epoch and fans polled values out to backends.
///
/// Exactly one poller should drive a given registry; the window arithmetic assumes a single
/// flipper.  The poller itself holds no lock while sweeping, so recorders never wait on it.
pub struct Poller {
    registry: Registry,
    host: Box<str>,
    backends: Vec<Box<dyn Backend>>,
}

impl Poller {
    /// Creates a poller over `registry` with no host and no backends.
    pub fn new(registry: &Registry) -> Poller {
        Poller { registry: registry.clone(), host: Box::from(""), backends: Vec::new() }
    }

    /// Sets the host segment stamped into every emitted key.
    pub fn set_host(&mut self, host: &str) -> Result<(), Error> {
        if host.len() > NAME_MAX_LEN {
            return Err(Error::NameTooLong { name: host.to_string(), max: NAME_MAX_LEN });
        }
        if host.bytes().any(|b| b.is_ascii_control()) {
            return Err(Error::NameInvalid { name: host.to_string() });
        }
        self.host = host.into();
        Ok(())
    }

    /// The configured host segment, possibly empty.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Registers a backend.  Backends receive every sweep in registration order.
    pub fn add_backend(&mut self, backend: Box<dyn Backend>) {
        self.backends.push(backend);
    }

    /// Sweeps at the current wall-clock time.
    pub fn poll(&mut self) {
        self.poll_at(timer::wall_clock());
    }

    /// Sweeps with an explicit timestamp, in seconds.
    ///
    /// Flips the epoch, waits out stragglers, then reads and resets the retired slot of every
    /// live metric, delivering the normalized values to the backends bracketed by one
    /// [`Begin`](PollEvent::Begin) and one [`Done`](PollEvent::Done).
    ///
    /// Timestamps are expected to be monotonic across calls; a timestamp behind the previous
    /// flip logs a warning and reports the window as one second.
    pub fn poll_at(&mut self, ts: u64) {
        let (retired, last_flip) = self.registry.flip_at(ts);

        let elapsed = if ts > last_flip {
            ts - last_flip
        } else {
            if ts < last_flip {
                warn!(
                    prefix = %self.registry.prefix(),
                    last_flip,
                    poll = ts,
                    "clock out of sync, using a one second window",
                );
            }
            1
        };

        thread::sleep(STRAGGLER_GRACE);

        let registry = self.registry.clone();
        let prefix = registry.prefix();
        let host: &str = &self.host;
        let backends = &mut self.backends;

        for backend in backends.iter_mut() {
            backend.on_poll(PollEvent::Begin);
        }

        let _ = registry.for_each(|cell| {
            let reading = match cell.read(retired) {
                Ok(reading) => reading,
                Err(ReadError::Busy) => {
                    let mut key = Key::new();
                    key.push(&prefix);
                    key.push(host);
                    key.push(cell.name());
                    warn!(key = %key, "skipping busy metric");
                    return ControlFlow::Continue(());
                }
            };

            let poll =
                Poll { host, prefix: prefix.as_str(), name: cell.name(), ts, elapsed, reading };
            for backend in backends.iter_mut() {
                backend.on_poll(PollEvent::Metric(&poll));
            }

            ControlFlow::Continue(())
        });

        for backend in backends.iter_mut() {
            backend.on_poll(PollEvent::Done);
        }
    }

    /// Moves the poller onto a background thread sweeping every `freq`.
    pub fn spawn(self, freq: Duration) -> Result<PollerThread, Error> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let mut poller = self;

        let handle = thread::Builder::new().name("metrics-poller".into()).spawn(move || {
            while !flag.load(Ordering::Acquire) {
                thread::sleep(freq);
                if flag.load(Ordering::Acquire) {
                    break;
                }
                poller.poll();
            }
        })?;

        Ok(PollerThread { stop, handle: Some(handle) })
    }
}

/// Handle to a background poll thread; stops and joins it on [`stop`](PollerThread::stop) or drop.
pub struct PollerThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PollerThread {
    /// Stops the poll loop and waits for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PollerThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

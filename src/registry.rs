use std::collections::hash_map::{Entry, HashMap};
use std::ops::ControlFlow;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::cell::{Body, Cell, CounterCell, DistCell, GaugeCell, HistoCell, Kind, QuantileCell};
use crate::epoch::{Epoch, EpochGate};
use crate::error::{Error, ReadError};
use crate::handle::{Counter, Distribution, Gauge, Handle, Histogram, Quantile};
use crate::poll::Reading;
use crate::timer;

/// Maximum byte length of metric names, registry names, prefixes, and hosts.
pub const NAME_MAX_LEN: usize = 255;

/// A named collection of metrics sharing one epoch.
///
/// The registry owns every metric registered against it: a name-indexed map for lookups plus an
/// intrusive list the poller walks without taking any lock.  Structural changes (register,
/// close) briefly serialize on one mutex; recording and polling never do.
///
/// `Registry` is a cheap clonable handle to the shared state, the same way recorder front-ends
/// clone their way around the codebase.  One [`Poller`](crate::Poller) per registry drives the
/// epoch; see the crate docs for the full lifecycle.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

struct Inner {
    prefix: RwLock<Box<str>>,
    // Synchronizes the name map and the list head writes; list reads are lock-free.  The two
    // structures are kept consistent with each other under this lock.
    keys: Mutex<HashMap<Box<str>, Arc<Cell>>>,
    head: AtomicPtr<Cell>,
    gate: EpochGate,
}

impl Registry {
    /// Creates a registry whose prefix starts out as `name`.
    pub fn create(name: &str) -> Result<Registry, Error> {
        Registry::create_at(name, timer::wall_clock())
    }

    /// Creates a registry with an explicit creation timestamp, in seconds.
    ///
    /// The timestamp seeds the window arithmetic: the first poll reports over the span between
    /// `now` and the poll's own timestamp.
    pub fn create_at(name: &str, now: u64) -> Result<Registry, Error> {
        validate_name(name)?;

        Ok(Registry {
            inner: Arc::new(Inner {
                prefix: RwLock::new(name.into()),
                keys: Mutex::new(HashMap::new()),
                head: AtomicPtr::new(ptr::null_mut()),
                gate: EpochGate::new(now),
            }),
        })
    }

    /// The prefix stamped onto every emitted key.
    pub fn prefix(&self) -> String {
        self.inner.prefix.read().to_string()
    }

    /// Replaces the key prefix.
    pub fn set_prefix(&self, prefix: &str) -> Result<(), Error> {
        validate_name(prefix)?;
        *self.inner.prefix.write() = prefix.into();
        Ok(())
    }

    /// The epoch recorders are currently writing into.
    pub fn epoch(&self) -> Epoch {
        self.inner.gate.current()
    }

    /// Registers a counter, failing if the name is taken.
    pub fn create_counter(&self, name: &str) -> Result<Counter, Error> {
        let cell = self.register(name, Body::Counter(CounterCell::new()), true)?;
        Ok(Counter::new(cell, self.clone()))
    }

    /// Returns the counter under `name`, registering it on first use.
    pub fn counter(&self, name: &str) -> Result<Counter, Error> {
        let cell = self.register(name, Body::Counter(CounterCell::new()), false)?;
        Ok(Counter::new(cell, self.clone()))
    }

    /// Registers a gauge, failing if the name is taken.
    pub fn create_gauge(&self, name: &str) -> Result<Gauge, Error> {
        let cell = self.register(name, Body::Gauge(GaugeCell::new()), true)?;
        Ok(Gauge::new(cell, self.clone()))
    }

    /// Returns the gauge under `name`, registering it on first use.
    pub fn gauge(&self, name: &str) -> Result<Gauge, Error> {
        let cell = self.register(name, Body::Gauge(GaugeCell::new()), false)?;
        Ok(Gauge::new(cell, self.clone()))
    }

    /// Registers a distribution, failing if the name is taken.
    pub fn create_dist(&self, name: &str) -> Result<Distribution, Error> {
        let cell = self.register(name, Body::Dist(Box::new(DistCell::new())), true)?;
        Ok(Distribution::new(cell, self.clone()))
    }

    /// Returns the distribution under `name`, registering it on first use.
    pub fn dist(&self, name: &str) -> Result<Distribution, Error> {
        let cell = self.register(name, Body::Dist(Box::new(DistCell::new())), false)?;
        Ok(Distribution::new(cell, self.clone()))
    }

    /// Registers a histogram over the given thresholds, failing if the name is taken.
    pub fn create_histo(&self, name: &str, thresholds: &[u64]) -> Result<Histogram, Error> {
        let body = Body::Histo(Box::new(HistoCell::new(thresholds)?));
        let cell = self.register(name, body, true)?;
        Ok(Histogram::new(cell, self.clone()))
    }

    /// Returns the histogram under `name`, registering it on first use.
    ///
    /// When the histogram already exists its thresholds win; the ones passed here are dropped.
    pub fn histo(&self, name: &str, thresholds: &[u64]) -> Result<Histogram, Error> {
        let body = Body::Histo(Box::new(HistoCell::new(thresholds)?));
        let cell = self.register(name, body, false)?;
        Ok(Histogram::new(cell, self.clone()))
    }

    /// Registers a quantile estimator, failing if the name is taken.
    ///
    /// `estimate` seeds the walk and `adjustment` is its step size.
    pub fn create_quantile(
        &self,
        name: &str,
        quantile: f64,
        estimate: f64,
        adjustment: f64,
    ) -> Result<Quantile, Error> {
        let body = Body::Quantile(QuantileCell::new(quantile, estimate, adjustment)?);
        let cell = self.register(name, body, true)?;
        Ok(Quantile::new(cell, self.clone()))
    }

    /// Returns the quantile estimator under `name`, registering it on first use.
    ///
    /// When the estimator already exists its parameters win; the ones passed here are dropped.
    pub fn quantile(
        &self,
        name: &str,
        quantile: f64,
        estimate: f64,
        adjustment: f64,
    ) -> Result<Quantile, Error> {
        let body = Body::Quantile(QuantileCell::new(quantile, estimate, adjustment)?);
        let cell = self.register(name, body, false)?;
        Ok(Quantile::new(cell, self.clone()))
    }

    /// Looks up a metric of any kind by name.
    pub fn get(&self, name: &str) -> Option<Handle> {
        let cell = self.inner.keys.lock().get(name).cloned()?;
        Some(Handle::from_cell(cell, self.clone()))
    }

    /// Visits every live metric without blocking recorders or registration.
    ///
    /// Metrics registered before the traversal starts are all visited; metrics registered or
    /// closed mid-flight may or may not be.  The closure can stop the walk early by returning
    /// [`ControlFlow::Break`].
    pub fn for_each<F>(&self, mut f: F) -> ControlFlow<()>
    where
        F: FnMut(CellView<'_>) -> ControlFlow<()>,
    {
        let _pin = self.inner.gate.pin();

        // Synchronizes with `link_front` so nodes are fully written before we chase them.
        let mut ptr = self.inner.head.load(Ordering::Acquire);
        while !ptr.is_null() {
            // SAFETY: closed cells stay allocated for two flips after unlinking, and the pin
            // above holds back any drain that would otherwise run mid-walk, so every pointer
            // reachable from the head we loaded is still backed by a live cell.
            let cell = unsafe { &*ptr };
            if f(CellView { cell }).is_break() {
                return ControlFlow::Break(());
            }
            ptr = cell.next_ptr();
        }

        ControlFlow::Continue(())
    }

    pub(crate) fn flip_at(&self, now: u64) -> (Epoch, u64) {
        self.inner.gate.flip_at(now)
    }

    fn register(&self, name: &str, body: Body, strict: bool) -> Result<Arc<Cell>, Error> {
        validate_name(name)?;

        let cell = Arc::new(Cell::new(name, body));
        let mut keys = self.inner.keys.lock();

        match keys.entry(name.into()) {
            Entry::Occupied(entry) => {
                let existing = entry.get();
                if strict {
                    Err(Error::AlreadyExists { name: name.to_string() })
                } else if existing.kind() != cell.kind() {
                    Err(Error::KindMismatch {
                        name: name.to_string(),
                        existing: existing.kind(),
                        requested: cell.kind(),
                    })
                } else {
                    Ok(existing.clone())
                }
            }
            Entry::Vacant(entry) => {
                self.link_front(&cell);
                entry.insert(cell.clone());
                Ok(cell)
            }
        }
    }

    /// Unregisters the cell, provided `name` still maps to this exact cell.
    ///
    /// The cell comes off the map and the list right away but stays allocated until two epoch
    /// flips from now, when no traversal can possibly still reach it.
    pub(crate) fn close_cell(&self, cell: &Arc<Cell>) -> bool {
        let removed = {
            let mut keys = self.inner.keys.lock();

            match keys.get(cell.name()) {
                Some(live) if Arc::ptr_eq(live, cell) => {}
                _ => return false,
            }

            let removed = match keys.remove(cell.name()) {
                Some(removed) => removed,
                None => return false,
            };
            self.unlink(&removed);
            removed
        };

        self.inner.gate.defer(removed);
        true
    }

    // Both list writers run under the `keys` lock, which is what makes touching `prev` safe.

    fn link_front(&self, cell: &Arc<Cell>) {
        debug_assert!(self.inner.keys.is_locked(), "linking a cell without the lock held");
        let ptr = Arc::as_ptr(cell) as *mut Cell;

        let old_head = self.inner.head.load(Ordering::Relaxed);
        cell.next.store(old_head, Ordering::Relaxed);
        cell.prev.store(ptr::null_mut(), Ordering::Relaxed);
        if !old_head.is_null() {
            // SAFETY: `old_head` is in the map, hence alive; we hold the structural lock.
            unsafe { (*old_head).prev.store(ptr, Ordering::Relaxed) };
        }

        // Synchronizes with `for_each` so the node is fully written before it is reachable.
        self.inner.head.store(ptr, Ordering::Release);
    }

    fn unlink(&self, cell: &Arc<Cell>) {
        debug_assert!(self.inner.keys.is_locked(), "unlinking a cell without the lock held");
        let ptr = Arc::as_ptr(cell) as *mut Cell;

        let next = cell.next.load(Ordering::Relaxed);
        let prev = cell.prev.load(Ordering::Relaxed);

        // SAFETY: neighbours are either in the map or themselves awaiting a deferred free, so
        // both pointers are backed by live cells; we hold the structural lock.
        unsafe {
            if !next.is_null() {
                (*next).prev.store(prev, Ordering::Relaxed);
            }
            if !prev.is_null() {
                (*prev).next.store(next, Ordering::Relaxed);
            }
        }

        // A traversal already past the head may still step through this cell; its own `next` is
        // left intact so the walk falls back into the live list.
        if self.inner.head.load(Ordering::Relaxed) == ptr {
            self.inner.head.store(next, Ordering::Relaxed);
        }
    }
}

/// A metric as seen during [`Registry::for_each`].
pub struct CellView<'a> {
    cell: &'a Cell,
}

impl CellView<'_> {
    /// The metric name.
    pub fn name(&self) -> &str {
        self.cell.name()
    }

    /// The metric kind.
    pub fn kind(&self) -> Kind {
        self.cell.kind()
    }

    /// Reads and resets the metric's slot for the given epoch.
    pub fn read(&self, epoch: Epoch) -> Result<Reading, ReadError> {
        self.cell.read(epoch)
    }
}

fn validate_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::NameEmpty);
    }
    if name.len() > NAME_MAX_LEN {
        return Err(Error::NameTooLong { name: name.to_string(), max: NAME_MAX_LEN });
    }
    if name.bytes().any(|b| b.is_ascii_control()) {
        return Err(Error::NameInvalid { name: name.to_string() });
    }
    Ok(())
}

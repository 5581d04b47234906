use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

use crate::cell::Cell;

/// Index of one of the two slots every metric carries.
///
/// The poller's flip toggles which slot is live; recorders pick their slot with
/// [`Registry::epoch`](crate::Registry::epoch) while the poller reads and resets the other one.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Epoch(pub(crate) usize);

impl Epoch {
    /// The slot index, `0` or `1`.
    pub fn index(self) -> usize {
        self.0
    }

    pub(crate) fn other(self) -> Epoch {
        Epoch(self.0 ^ 1)
    }
}

/// The global epoch counter plus the two deferred-free lists hanging off it.
///
/// Memory order semantics are pretty weird here since the flip does not need to synchronize any
/// data with the record op, yet the record op should still prevent the slot access from hoisting
/// above the epoch selection; hence the acquire load in `current`.
pub(crate) struct EpochGate {
    counter: CachePadded<AtomicUsize>,
    last_flip: AtomicU64,
    pins: AtomicUsize,
    defers: [DeferList; 2],
}

impl EpochGate {
    pub(crate) fn new(now: u64) -> EpochGate {
        EpochGate {
            counter: CachePadded::new(AtomicUsize::new(0)),
            last_flip: AtomicU64::new(now),
            pins: AtomicUsize::new(0),
            defers: [DeferList::new(), DeferList::new()],
        }
    }

    pub(crate) fn current(&self) -> Epoch {
        Epoch(self.counter.load(Ordering::Acquire) & 1)
    }

    /// Advances the epoch and swaps in the flip timestamp.
    ///
    /// Returns the epoch that was live before the increment (the one the poller should now read)
    /// and the previous flip timestamp.  Cells deferred before the *previous* flip have been
    /// quiescent for a full window and are freed here, unless a traversal is pinned, in which
    /// case they are held for one more flip.
    pub(crate) fn flip_at(&self, now: u64) -> (Epoch, u64) {
        let prev_ts = self.last_flip.swap(now, Ordering::Relaxed);

        if self.pins.load(Ordering::SeqCst) == 0 {
            self.defers[self.current().other().index()].drain();
        }

        let prev = self.counter.fetch_add(1, Ordering::AcqRel);
        (Epoch(prev & 1), prev_ts)
    }

    /// Queues a removed cell to be freed once all readers that could still see it are done;
    /// that is, at the second flip from now.
    pub(crate) fn defer(&self, cell: Arc<Cell>) {
        self.defers[self.current().index()].push(cell);
    }

    /// Marks a lock-free traversal as in flight, delaying any drain that would otherwise run
    /// under it.  The record path never takes a pin.
    pub(crate) fn pin(&self) -> Pin<'_> {
        self.pins.fetch_add(1, Ordering::SeqCst);
        Pin { gate: self }
    }
}

pub(crate) struct Pin<'a> {
    gate: &'a EpochGate,
}

impl Drop for Pin<'_> {
    fn drop(&mut self) {
        self.gate.pins.fetch_sub(1, Ordering::Release);
    }
}

struct DeferNode {
    cell: Arc<Cell>,
    next: *mut DeferNode,
}

/// Lock-free stack of cells awaiting reclamation.
struct DeferList {
    head: AtomicPtr<DeferNode>,
}

impl DeferList {
    fn new() -> DeferList {
        DeferList { head: AtomicPtr::new(ptr::null_mut()) }
    }

    fn push(&self, cell: Arc<Cell>) {
        let node = Box::into_raw(Box::new(DeferNode { cell, next: ptr::null_mut() }));

        // Synchronizes with `drain` to make sure the node is fully written before it is read.
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: the node is exclusively ours until the exchange below succeeds.
            unsafe { (*node).next = head };
            match self.head.compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(current) => head = current,
            }
        }
    }

    fn drain(&self) {
        // Synchronizes with `push` to make sure all nodes have been fully written before we
        // read them.
        let mut node = self.head.swap(ptr::null_mut(), Ordering::Acquire);

        while !node.is_null() {
            // SAFETY: we own the whole detached chain; every node was created by `push`.
            let owned = unsafe { Box::from_raw(node) };
            node = owned.next;
        }
    }
}

impl Drop for DeferList {
    fn drop(&mut self) {
        self.drain();
    }
}

//! Pending-Operation Queue
//!
//! Tracks a set of in-flight asynchronous operations and reports when the set
//! transitions between empty and non-empty. Modal dialogs use it to hold a
//! "close" or "save" action until every request they fired has settled,
//! without keeping a counter per call site.
//!
//! # Example
//! ```
//! use compliance_ui::deferred::Deferred;
//! use compliance_ui::notifier::{NotifierConfig, PendingOperationQueue};
//!
//! let queue = PendingOperationQueue::new(
//!     NotifierConfig::new()
//!         .on_non_empty(|| println!("saving..."))
//!         .on_empty(|| println!("all saved")),
//! );
//! let save: Deferred<(), ()> = Deferred::new();
//! queue.enqueue(&save).unwrap();  // prints "saving..."
//! save.resolve(());               // prints "all saved"
//! assert!(queue.is_empty());
//! ```
//!
//! Handles are compared by [`OperationId`], so queueing the same operation
//! from two code paths tracks it once. The queue only tracks liveness: a
//! rejected operation is removed exactly like a resolved one.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::Result;

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an in-flight operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OperationId(pub u64);

impl OperationId {
    /// Allocate a process-unique id
    pub fn next() -> Self {
        OperationId(NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Operation({})", self.0)
    }
}

/// Work to run once an operation settles
pub type Continuation = Box<dyn FnOnce()>;

/// Capability of an operation handle to report its settlement.
///
/// Clones of the same handle must report the same [`OperationId`].
pub trait Settle {
    /// Stable identity of the operation behind this handle
    fn operation_id(&self) -> OperationId;

    /// Run `continuation` once the operation settles, successfully or not.
    ///
    /// Already-settled handles run it before returning. Handles that can
    /// never settle must return `Error::InvalidOperationHandle` without
    /// retaining the continuation.
    fn on_settled(&self, continuation: Continuation) -> Result<()>;
}

/// Zero-argument callback; listeners are deduplicated by allocation
pub type Callback = Rc<dyn Fn()>;

/// Construction-time configuration for a [`PendingOperationQueue`]
#[derive(Clone)]
pub struct NotifierConfig {
    on_non_empty: Callback,
    on_empty: Callback,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            on_non_empty: Rc::new(|| {}),
            on_empty: Rc::new(|| {}),
        }
    }
}

impl NotifierConfig {
    /// Configuration with no-op transition callbacks
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback fired on every empty -> non-empty transition
    pub fn on_non_empty(mut self, callback: impl Fn() + 'static) -> Self {
        self.on_non_empty = Rc::new(callback);
        self
    }

    /// Callback fired on every non-empty -> empty transition
    pub fn on_empty(mut self, callback: impl Fn() + 'static) -> Self {
        self.on_empty = Rc::new(callback);
        self
    }
}

impl fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierConfig").finish_non_exhaustive()
    }
}

/// Counters describing what a queue has seen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Distinct operations accepted
    pub enqueued: u64,
    /// Re-enqueues of an operation that was already pending
    pub deduplicated: u64,
    /// Operations removed after settling
    pub settled: u64,
    /// Empty -> non-empty transitions
    pub became_non_empty: u64,
    /// Non-empty -> empty transitions
    pub became_empty: u64,
}

/// Transition waiting to be reported
enum Notice {
    NonEmpty,
    /// Listeners drained at the moment the queue emptied
    Empty(Vec<Callback>),
}

struct QueueState {
    pending: FxHashSet<OperationId>,
    on_empty_listeners: Vec<Callback>,
    config: NotifierConfig,
    /// Operations whose continuation is being attached, and whether it
    /// already ran
    attaching: FxHashMap<OperationId, bool>,
    notices: VecDeque<Notice>,
    dispatching: bool,
    stats: QueueStats,
}

/// Clears the dispatching flag even if a callback unwinds
struct DispatchGuard<'a>(&'a RefCell<QueueState>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.borrow_mut().dispatching = false;
    }
}

/// Deduplicating set of in-flight operations with empty/non-empty hooks.
///
/// Cloning yields another handle to the same queue. Continuations hold only
/// a weak reference, so dropping every handle silences later settlements.
#[derive(Clone)]
pub struct PendingOperationQueue {
    inner: Rc<RefCell<QueueState>>,
}

impl Default for PendingOperationQueue {
    fn default() -> Self {
        Self::new(NotifierConfig::default())
    }
}

impl PendingOperationQueue {
    /// Create an empty queue
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(QueueState {
                pending: FxHashSet::default(),
                on_empty_listeners: Vec::new(),
                config,
                attaching: FxHashMap::default(),
                notices: VecDeque::new(),
                dispatching: false,
                stats: QueueStats::default(),
            })),
        }
    }

    /// Start tracking `operation` until it settles.
    ///
    /// Re-enqueueing a pending operation is a no-op. A handle that refuses
    /// the settlement continuation is rejected with
    /// `Error::InvalidOperationHandle` and leaves the queue untouched.
    pub fn enqueue<S: Settle + ?Sized>(&self, operation: &S) -> Result<()> {
        let id = operation.operation_id();
        let was_empty = {
            let mut state = self.inner.borrow_mut();
            if state.pending.contains(&id) {
                state.stats.deduplicated += 1;
                trace!(%id, "operation already pending");
                return Ok(());
            }
            let was_empty = state.pending.is_empty();
            state.pending.insert(id);
            state.attaching.insert(id, false);
            was_empty
        };

        let attached = operation.on_settled(self.settle_continuation(id));

        let settled_early = {
            let mut state = self.inner.borrow_mut();
            let settled_early = state.attaching.remove(&id).unwrap_or(false);
            if attached.is_err() {
                state.pending.remove(&id);
            } else {
                state.stats.enqueued += 1;
                if was_empty {
                    state.stats.became_non_empty += 1;
                    state.notices.push_back(Notice::NonEmpty);
                    debug!(%id, "queue became non-empty");
                }
            }
            settled_early
        };

        if let Err(err) = attached {
            warn!(%id, error = %err, "refused operation handle");
            return Err(err);
        }

        trace!(%id, "operation enqueued");
        // An already-settled handle still produces a full non-empty/empty pair.
        if settled_early {
            self.settle(id);
        }
        self.dispatch();
        Ok(())
    }

    /// Call `listener` once the queue is empty.
    ///
    /// Runs immediately when nothing is pending. Otherwise the listener is
    /// kept until the next empty transition, unless the same `Rc` is already
    /// waiting.
    pub fn notify_when_empty(&self, listener: Callback) {
        {
            let mut state = self.inner.borrow_mut();
            if !state.pending.is_empty() {
                if !state
                    .on_empty_listeners
                    .iter()
                    .any(|existing| Rc::ptr_eq(existing, &listener))
                {
                    state.on_empty_listeners.push(listener);
                }
                return;
            }
        }
        listener();
    }

    /// Number of pending operations
    pub fn len(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().pending.is_empty()
    }

    /// Whether `id` is still pending
    pub fn contains(&self, id: OperationId) -> bool {
        self.inner.borrow().pending.contains(&id)
    }

    /// Pending operation ids in ascending order
    pub fn pending_ids(&self) -> Vec<OperationId> {
        let mut ids: Vec<_> = self.inner.borrow().pending.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of listeners waiting for the next empty transition
    pub fn waiting_listeners(&self) -> usize {
        self.inner.borrow().on_empty_listeners.len()
    }

    /// Snapshot of the queue counters
    pub fn stats(&self) -> QueueStats {
        self.inner.borrow().stats
    }

    fn settle_continuation(&self, id: OperationId) -> Continuation {
        let queue: Weak<RefCell<QueueState>> = Rc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = queue.upgrade() {
                PendingOperationQueue { inner }.settle(id);
            }
        })
    }

    fn settle(&self, id: OperationId) {
        {
            let mut state = self.inner.borrow_mut();
            if let Some(settled) = state.attaching.get_mut(&id) {
                *settled = true;
                return;
            }
            if !state.pending.remove(&id) {
                return;
            }
            state.stats.settled += 1;
            if !state.pending.is_empty() {
                trace!(%id, remaining = state.pending.len(), "operation settled");
                return;
            }
            state.stats.became_empty += 1;
            let listeners = std::mem::take(&mut state.on_empty_listeners);
            debug!(%id, listeners = listeners.len(), "queue became empty");
            state.notices.push_back(Notice::Empty(listeners));
        }
        self.dispatch();
    }

    /// Report queued transitions in the order they happened.
    ///
    /// Callbacks may enqueue or settle operations; the transitions they cause
    /// are appended and reported by the outermost dispatch, after the one
    /// currently running.
    fn dispatch(&self) {
        {
            let mut state = self.inner.borrow_mut();
            if state.dispatching {
                return;
            }
            state.dispatching = true;
        }
        let _guard = DispatchGuard(&self.inner);

        loop {
            let notice = self.inner.borrow_mut().notices.pop_front();
            match notice {
                None => break,
                Some(Notice::NonEmpty) => {
                    let on_non_empty = self.inner.borrow().config.on_non_empty.clone();
                    on_non_empty();
                }
                Some(Notice::Empty(listeners)) => {
                    for listener in listeners {
                        listener();
                    }
                    let on_empty = self.inner.borrow().config.on_empty.clone();
                    on_empty();
                }
            }
        }
    }
}

impl fmt::Debug for PendingOperationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("PendingOperationQueue")
            .field("pending", &state.pending.len())
            .field("on_empty_listeners", &state.on_empty_listeners.len())
            .field("stats", &state.stats)
            .finish()
    }
}

//! Deferred Operation Handles
//!
//! A single-threaded deferred in the style of jQuery's `$.Deferred`: a handle
//! that is settled once, resolved with a value or rejected with a reason,
//! and runs its reactions synchronously at the moment it settles. Every
//! request fired by the view models is represented by one of these, and it
//! is the concrete operation handle accepted by the pending-operation queue.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::error::{Error, Result};
use crate::event_loop::LoopLiveness;
use crate::notifier::{Continuation, OperationId, Settle};

/// Settlement state of a deferred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredState {
    /// Not settled yet
    Pending,
    /// Settled with a value
    Resolved,
    /// Settled with a rejection reason
    Rejected,
}

/// How a deferred settled
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement<T, E> {
    Resolved(T),
    Rejected(E),
}

impl<T, E> Settlement<T, E> {
    fn state(&self) -> DeferredState {
        match self {
            Settlement::Resolved(_) => DeferredState::Resolved,
            Settlement::Rejected(_) => DeferredState::Rejected,
        }
    }
}

type Reaction<T, E> = Box<dyn FnOnce(&Settlement<T, E>)>;

struct DeferredCell<T, E> {
    id: OperationId,
    settlement: Option<Rc<Settlement<T, E>>>,
    reactions: Vec<Reaction<T, E>>,
    liveness: Option<LoopLiveness>,
}

/// Shared handle to a once-settled asynchronous result.
///
/// Clones refer to the same underlying operation and share its
/// [`OperationId`].
pub struct Deferred<T, E> {
    inner: Rc<RefCell<DeferredCell<T, E>>>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static, E: 'static> Default for Deferred<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static, E: 'static> Deferred<T, E> {
    /// Create a pending deferred
    pub fn new() -> Self {
        Self::with_liveness(None)
    }

    pub(crate) fn with_liveness(liveness: Option<LoopLiveness>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(DeferredCell {
                id: OperationId::next(),
                settlement: None,
                reactions: Vec::new(),
                liveness,
            })),
        }
    }

    /// Create an already-resolved deferred
    pub fn resolved(value: T) -> Self {
        let deferred = Self::new();
        deferred.resolve(value);
        deferred
    }

    /// Create an already-rejected deferred
    pub fn rejected(reason: E) -> Self {
        let deferred = Self::new();
        deferred.reject(reason);
        deferred
    }

    /// Identity shared by all clones
    pub fn id(&self) -> OperationId {
        self.inner.borrow().id
    }

    /// Current settlement state
    pub fn state(&self) -> DeferredState {
        self.inner
            .borrow()
            .settlement
            .as_ref()
            .map_or(DeferredState::Pending, |s| s.state())
    }

    /// Whether the deferred has not settled yet
    pub fn is_pending(&self) -> bool {
        self.state() == DeferredState::Pending
    }

    /// Resolve with `value`. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Settlement::Resolved(value))
    }

    /// Reject with `reason`. Returns `false` if already settled.
    pub fn reject(&self, reason: E) -> bool {
        self.settle(Settlement::Rejected(reason))
    }

    /// Run `reaction` with the value once resolved
    pub fn done(&self, reaction: impl FnOnce(&T) + 'static) -> &Self {
        self.on_settlement(move |settlement| {
            if let Settlement::Resolved(value) = settlement {
                reaction(value);
            }
        })
    }

    /// Run `reaction` with the reason once rejected
    pub fn fail(&self, reaction: impl FnOnce(&E) + 'static) -> &Self {
        self.on_settlement(move |settlement| {
            if let Settlement::Rejected(reason) = settlement {
                reaction(reason);
            }
        })
    }

    /// Run `reaction` once settled either way
    pub fn always(&self, reaction: impl FnOnce() + 'static) -> &Self {
        self.on_settlement(move |_| reaction())
    }

    /// Run `reaction` with the settlement once settled.
    ///
    /// Reactions run in registration order. If the deferred already settled,
    /// `reaction` runs before this returns.
    pub fn on_settlement(&self, reaction: impl FnOnce(&Settlement<T, E>) + 'static) -> &Self {
        let settled = {
            let mut cell = self.inner.borrow_mut();
            if cell.settlement.is_none() {
                cell.reactions.push(Box::new(reaction));
                return self;
            }
            cell.settlement.clone()
        };
        if let Some(settlement) = settled {
            reaction(&*settlement);
        }
        self
    }

    /// Map the resolved value into a new deferred; rejections are forwarded
    pub fn then<U: 'static>(&self, map: impl FnOnce(&T) -> U + 'static) -> Deferred<U, E>
    where
        E: Clone,
    {
        let mapped = Deferred::with_liveness(self.inner.borrow().liveness.clone());
        let target = mapped.clone();
        self.on_settlement(move |settlement| match settlement {
            Settlement::Resolved(value) => {
                target.resolve(map(value));
            }
            Settlement::Rejected(reason) => {
                target.reject(reason.clone());
            }
        });
        mapped
    }

    /// Cloned settlement, if any
    pub fn settlement(&self) -> Option<Settlement<T, E>>
    where
        T: Clone,
        E: Clone,
    {
        self.inner.borrow().settlement.as_deref().cloned()
    }

    fn settle(&self, settlement: Settlement<T, E>) -> bool {
        let (settlement, reactions) = {
            let mut cell = self.inner.borrow_mut();
            if cell.settlement.is_some() {
                trace!(id = %cell.id, "ignoring second settlement");
                return false;
            }
            let settlement = Rc::new(settlement);
            cell.settlement = Some(settlement.clone());
            trace!(id = %cell.id, state = ?settlement.state(), reactions = cell.reactions.len(), "deferred settled");
            (settlement, std::mem::take(&mut cell.reactions))
        };
        for reaction in reactions {
            reaction(&*settlement);
        }
        true
    }

    fn scheduler_alive(&self) -> bool {
        self.inner
            .borrow()
            .liveness
            .as_ref()
            .map_or(true, LoopLiveness::is_alive)
    }
}

impl<T: 'static, E: 'static> Settle for Deferred<T, E> {
    fn operation_id(&self) -> OperationId {
        self.id()
    }

    fn on_settled(&self, continuation: Continuation) -> Result<()> {
        if self.is_pending() && !self.scheduler_alive() {
            return Err(Error::invalid_handle(
                self.id(),
                "its event loop has shut down",
            ));
        }
        self.always(continuation);
        Ok(())
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.inner.borrow();
        let state = cell
            .settlement
            .as_ref()
            .map_or(DeferredState::Pending, |s| s.state());
        f.debug_struct("Deferred")
            .field("id", &cell.id)
            .field("state", &state)
            .field("reactions", &cell.reactions.len())
            .finish()
    }
}

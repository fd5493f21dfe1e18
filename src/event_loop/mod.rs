//! Event Loop Implementation
//!
//! A single-threaded macrotask scheduler driven by virtual time. It stands in
//! for the browser's network stack: simulated requests are settled by tasks
//! that fire after a configured latency, which lets tests, the CLI and the
//! benches replay interleavings of in-flight operations deterministically.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::deferred::Deferred;

/// Timer identifier returned by [`EventLoop::schedule`]
pub type TimerId = u64;

type Task = Box<dyn FnOnce()>;

/// A macrotask waiting for its virtual fire time
struct Macrotask {
    id: TimerId,
    fire_at: u64,
    task: Task,
}

/// Event loop configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLoopConfig {
    /// Maximum tasks executed by a single run (starvation protection)
    pub max_tasks_per_run: usize,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_run: 10_000,
        }
    }
}

/// Result of draining the loop via [`EventLoop::run_until_idle`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    /// Macrotasks dequeued and executed
    pub tasks_processed: usize,
    /// Whether the run stopped at `max_tasks_per_run` with work left
    pub budget_exhausted: bool,
    /// Virtual time when the run finished
    pub final_time: u64,
}

/// Runtime statistics for the event loop
#[derive(Clone, Debug, Default, Serialize)]
pub struct EventLoopStats {
    /// Tasks ever scheduled
    pub total_scheduled: u64,
    /// Tasks executed
    pub total_executed: u64,
    /// Tasks cancelled before firing
    pub total_cancelled: u64,
    /// Tasks dropped because the loop had shut down
    pub total_dropped: u64,
    /// Longest single run, wall-clock milliseconds
    pub longest_run_ms: u64,
}

/// Weak view of whether an event loop can still run tasks.
///
/// Deferreds bound to a loop hold one of these so they can refuse new
/// settlement continuations once nothing can settle them.
#[derive(Clone)]
pub struct LoopLiveness(Weak<Cell<bool>>);

impl LoopLiveness {
    /// Whether the loop is still alive and not shut down
    pub fn is_alive(&self) -> bool {
        self.0.upgrade().is_some_and(|alive| alive.get())
    }
}

impl fmt::Debug for LoopLiveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LoopLiveness").field(&self.is_alive()).finish()
    }
}

struct LoopState {
    config: EventLoopConfig,
    macrotask_queue: Vec<Macrotask>,
    virtual_time: u64,
    next_timer_id: TimerId,
    stats: EventLoopStats,
}

/// The event loop manages the macrotask queue and virtual time.
///
/// Cloning yields another handle to the same loop, so tasks can capture a
/// handle and schedule follow-up work.
#[derive(Clone)]
pub struct EventLoop {
    state: Rc<RefCell<LoopState>>,
    alive: Rc<Cell<bool>>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    /// Create a new event loop
    pub fn new() -> Self {
        Self::with_config(EventLoopConfig::default())
    }

    /// Create an event loop with a custom configuration
    pub fn with_config(config: EventLoopConfig) -> Self {
        Self {
            state: Rc::new(RefCell::new(LoopState {
                config,
                macrotask_queue: Vec::new(),
                virtual_time: 0,
                next_timer_id: 1,
                stats: EventLoopStats::default(),
            })),
            alive: Rc::new(Cell::new(true)),
        }
    }

    /// Get current virtual time
    pub fn current_time(&self) -> u64 {
        self.state.borrow().virtual_time
    }

    /// Whether the loop still accepts tasks
    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }

    /// Liveness token for handles bound to this loop
    pub fn liveness(&self) -> LoopLiveness {
        LoopLiveness(Rc::downgrade(&self.alive))
    }

    /// Schedule `task` to run `delay` virtual milliseconds from now.
    ///
    /// After [`shutdown`](Self::shutdown) the task is dropped unrun.
    pub fn schedule(&self, delay: u64, task: impl FnOnce() + 'static) -> TimerId {
        let mut state = self.state.borrow_mut();
        let id = state.next_timer_id;
        state.next_timer_id += 1;

        if !self.alive.get() {
            state.stats.total_dropped += 1;
            warn!(timer = id, "event loop shut down, dropping task");
            return id;
        }

        let fire_at = state.virtual_time.saturating_add(delay);
        state.macrotask_queue.push(Macrotask {
            id,
            fire_at,
            task: Box::new(task),
        });
        state.stats.total_scheduled += 1;
        trace!(timer = id, fire_at, "task scheduled");
        id
    }

    /// Cancel a timer by ID. Returns `false` if it already fired or never existed.
    pub fn cancel(&self, id: TimerId) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.macrotask_queue.len();
        state.macrotask_queue.retain(|t| t.id != id);
        let cancelled = state.macrotask_queue.len() < before;
        if cancelled {
            state.stats.total_cancelled += 1;
        }
        cancelled
    }

    /// Check if any task is still scheduled
    pub fn has_pending_work(&self) -> bool {
        !self.state.borrow().macrotask_queue.is_empty()
    }

    /// Number of scheduled tasks
    pub fn pending_tasks(&self) -> usize {
        self.state.borrow().macrotask_queue.len()
    }

    /// Get the time of the next scheduled task
    pub fn next_task_time(&self) -> Option<u64> {
        self.state
            .borrow()
            .macrotask_queue
            .iter()
            .map(|t| t.fire_at)
            .min()
    }

    /// Run every task due within the next `ms` virtual milliseconds, then
    /// move the clock to exactly `now + ms`.
    pub fn advance_time(&self, ms: u64) -> RunResult {
        let deadline = self.current_time().saturating_add(ms);
        let mut result = self.run_while(|fire_at| fire_at <= deadline);
        let mut state = self.state.borrow_mut();
        state.virtual_time = state.virtual_time.max(deadline);
        result.final_time = state.virtual_time;
        result
    }

    /// Run tasks until none remain, jumping virtual time to each fire time
    pub fn run_until_idle(&self) -> RunResult {
        self.run_while(|_| true)
    }

    /// Drop every scheduled task and refuse new ones
    pub fn shutdown(&self) {
        self.alive.set(false);
        let dropped = {
            let mut state = self.state.borrow_mut();
            let dropped = std::mem::take(&mut state.macrotask_queue);
            state.stats.total_dropped += dropped.len() as u64;
            dropped
        };
        debug!(dropped = dropped.len(), "event loop shut down");
        // Dropped outside the borrow: tasks may own handles to this loop.
        drop(dropped);
    }

    /// Snapshot of runtime statistics
    pub fn stats(&self) -> EventLoopStats {
        self.state.borrow().stats.clone()
    }

    /// Create a pending deferred bound to this loop
    pub fn deferred<T: 'static, E: 'static>(&self) -> Deferred<T, E> {
        Deferred::with_liveness(Some(self.liveness()))
    }

    /// Resolve `deferred` with `value` after `delay` virtual milliseconds
    pub fn resolve_after<T: 'static, E: 'static>(
        &self,
        deferred: &Deferred<T, E>,
        delay: u64,
        value: T,
    ) -> TimerId {
        let deferred = deferred.clone();
        self.schedule(delay, move || {
            deferred.resolve(value);
        })
    }

    /// Reject `deferred` with `reason` after `delay` virtual milliseconds
    pub fn reject_after<T: 'static, E: 'static>(
        &self,
        deferred: &Deferred<T, E>,
        delay: u64,
        reason: E,
    ) -> TimerId {
        let deferred = deferred.clone();
        self.schedule(delay, move || {
            deferred.reject(reason);
        })
    }

    fn run_while(&self, due: impl Fn(u64) -> bool) -> RunResult {
        let started = Instant::now();
        let budget = self.state.borrow().config.max_tasks_per_run;
        let mut result = RunResult::default();

        loop {
            if result.tasks_processed >= budget {
                result.budget_exhausted = self.has_due(&due);
                if result.budget_exhausted {
                    warn!(budget, "event loop run budget exhausted");
                }
                break;
            }
            let Some(task) = self.pop_next(&due) else {
                break;
            };
            trace!(timer = task.id, fire_at = task.fire_at, "running task");
            (task.task)();
            result.tasks_processed += 1;
            self.state.borrow_mut().stats.total_executed += 1;
        }

        let mut state = self.state.borrow_mut();
        let elapsed = started.elapsed().as_millis() as u64;
        if elapsed > state.stats.longest_run_ms {
            state.stats.longest_run_ms = elapsed;
        }
        result.final_time = state.virtual_time;
        result
    }

    fn has_due(&self, due: &impl Fn(u64) -> bool) -> bool {
        self.state
            .borrow()
            .macrotask_queue
            .iter()
            .any(|t| due(t.fire_at))
    }

    /// Remove the earliest due task (ties broken by scheduling order) and
    /// move the clock to its fire time.
    fn pop_next(&self, due: &impl Fn(u64) -> bool) -> Option<Macrotask> {
        let mut state = self.state.borrow_mut();
        let idx = state
            .macrotask_queue
            .iter()
            .enumerate()
            .filter(|(_, t)| due(t.fire_at))
            .min_by_key(|(_, t)| (t.fire_at, t.id))
            .map(|(i, _)| i)?;
        let task = state.macrotask_queue.swap_remove(idx);
        state.virtual_time = state.virtual_time.max(task.fire_at);
        Some(task)
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("EventLoop")
            .field("virtual_time", &state.virtual_time)
            .field("pending_tasks", &state.macrotask_queue.len())
            .field("alive", &self.alive.get())
            .finish()
    }
}

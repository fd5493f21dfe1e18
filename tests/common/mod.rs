//! Shared test helpers for integration tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use compliance_ui::notifier::{Callback, NotifierConfig, PendingOperationQueue};

/// Ordered record of callback invocations
#[derive(Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0.borrow_mut().push(event.into());
    }

    /// Callback appending `event` each time it runs
    pub fn callback(&self, event: &str) -> Callback {
        let (log, event) = (self.clone(), event.to_string());
        Rc::new(move || log.push(event.clone()))
    }

    pub fn events(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.borrow().iter().filter(|e| *e == event).count()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

/// Queue logging `non_empty` and `empty` transitions into `log`
pub fn logged_queue(log: &EventLog) -> PendingOperationQueue {
    let (a, b) = (log.clone(), log.clone());
    PendingOperationQueue::new(
        NotifierConfig::new()
            .on_non_empty(move || a.push("non_empty"))
            .on_empty(move || b.push("empty")),
    )
}

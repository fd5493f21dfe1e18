//! compliance-ui: view-model core for compliance modal dialogs
//!
//! The pages of a governance/compliance application fire several requests
//! from a single modal (saving related objects, validating ticket ids,
//! loading mappings) and need one signal telling them when all of that work
//! has settled. This crate provides that signal, the deferred handles it
//! tracks, and the view models of the modals built on top of it.
//!
//! # Quick Start
//!
//! ```
//! use std::rc::Rc;
//! use std::cell::Cell;
//! use compliance_ui::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let event_loop = EventLoop::new();
//!     let closed = Rc::new(Cell::new(false));
//!     let queue = PendingOperationQueue::new(NotifierConfig::new());
//!
//!     let save: Deferred<(), RequestFailure> = event_loop.deferred();
//!     event_loop.resolve_after(&save, 40, ());
//!     queue.enqueue(&save)?;
//!
//!     let c = closed.clone();
//!     queue.notify_when_empty(Rc::new(move || c.set(true)));
//!     event_loop.run_until_idle();
//!     assert!(closed.get());
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Core** | [`notifier`], [`deferred`], [`event_loop`], [`error`](Error) |
//! | **Backend seams** | [`request`] |
//! | **View models** | [`issue_tracker`], [`comments`], [`assessment`] |

pub mod assessment;
pub mod comments;
pub mod deferred;
pub mod event_loop;
pub mod issue_tracker;
pub mod notifier;
pub mod prelude;
pub mod request;

mod error;

pub use error::{Error, Result};
pub use notifier::{NotifierConfig, OperationId, PendingOperationQueue, Settle};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

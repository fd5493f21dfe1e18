//! Prelude module for convenient imports
//!
//! ```
//! use compliance_ui::prelude::*;
//!
//! let queue = PendingOperationQueue::default();
//! assert!(queue.is_empty());
//! ```

// Pending-operation queue
pub use crate::notifier::{
    Callback, Continuation, NotifierConfig, OperationId, PendingOperationQueue, QueueStats, Settle,
};

// Operation handles and scheduling
pub use crate::deferred::{Deferred, DeferredState, Settlement};
pub use crate::event_loop::{EventLoop, EventLoopConfig, RunResult, TimerId};
pub use crate::request::{Request, RequestFailure};

// Error handling
pub use crate::error::{Error, Result};

// View models
pub use crate::assessment::AssessmentModal;
pub use crate::comments::CommentsSection;
pub use crate::issue_tracker::{IssueTrackerConfig, IssueTrackerFields, TicketLinkState};

// Version constant
pub use crate::VERSION;

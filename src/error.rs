//! Error types for the compliance view-model core

use thiserror::Error;

use crate::notifier::OperationId;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// A value passed to `enqueue` cannot report its settlement
    #[error("InvalidOperationHandle: attempted to queue {id} but {reason}")]
    InvalidOperationHandle {
        id: OperationId,
        reason: String,
    },

    /// A simulated AJAX request failed
    #[error("RequestError: {status}: {message}")]
    Request { status: u16, message: String },

    /// Configuration could not be loaded or is inconsistent
    #[error("ConfigError: {0}")]
    Config(String),

    /// IO error
    #[error("IOError: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON (de)serialization error
    #[error("JsonError: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl Error {
    /// Create an invalid-handle error
    pub fn invalid_handle(id: OperationId, reason: impl Into<String>) -> Self {
        Error::InvalidOperationHandle {
            id,
            reason: reason.into(),
        }
    }

    /// Create a request error
    pub fn request(status: u16, message: impl Into<String>) -> Self {
        Error::Request {
            status,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Whether this error rejects an operation handle
    pub fn is_invalid_handle(&self) -> bool {
        matches!(self, Error::InvalidOperationHandle { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

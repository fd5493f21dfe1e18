//! Simulated AJAX requests
//!
//! The view models never talk HTTP themselves; every backend call goes
//! through a trait seam that hands back a [`Request`], a deferred settled
//! with either the decoded payload or a [`RequestFailure`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::deferred::Deferred;
use crate::error::Error;

/// An in-flight backend call
pub type Request<T> = Deferred<T, RequestFailure>;

/// Why a backend call failed, as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFailure {
    /// HTTP status code, `0` when the request never reached the server
    pub status: u16,
    /// Human-readable details extracted from the response
    pub details: String,
}

impl RequestFailure {
    pub fn new(status: u16, details: impl Into<String>) -> Self {
        Self {
            status,
            details: details.into(),
        }
    }

    /// Failure for a request that never got a response
    pub fn network(details: impl Into<String>) -> Self {
        Self::new(0, details)
    }

    /// Extract user-facing details from a JSON error body.
    ///
    /// Looks for `message`, then `details`, and falls back to the raw body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let details = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|json| {
                ["message", "details"]
                    .iter()
                    .find_map(|key| json.get(*key).and_then(|v| v.as_str()).map(str::to_string))
            })
            .unwrap_or_else(|| body.trim().to_string());
        Self::new(status, details)
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.details, self.status)
    }
}

impl From<RequestFailure> for Error {
    fn from(failure: RequestFailure) -> Self {
        Error::request(failure.status, failure.details)
    }
}

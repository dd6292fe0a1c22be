//! Error types for the Drip API client.
//!
//! # Design
//! Three ways a call can fail: the request body could not be encoded, no
//! response came back (DNS, refused connection, timeout), or Drip answered
//! with a status the operation does not accept. The last carries the raw
//! status and body so callers can see exactly what Drip rejected.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by `DripClient` operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No response was obtained from the server.
    #[error("network error")]
    Network(#[source] BoxError),

    /// Drip responded with a status the operation does not accept.
    #[error("Drip API error (status {status}): {body}")]
    Api { status: u16, body: String },

    /// The client was constructed with unusable settings.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ApiError {
    pub(crate) fn network(err: impl Into<BoxError>) -> Self {
        ApiError::Network(err.into())
    }

    /// HTTP status of an API rejection, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

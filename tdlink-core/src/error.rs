//! Error types of the dispatch core.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a transport while sending.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The engine side of the channel is gone.
    #[error("transport closed")]
    Closed,

    /// Writing to the underlying stream failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced to callers of [`Client::send`](crate::Client::send).
///
/// Per-message failures inside the dispatcher never show up here; they are
/// logged and the message is dropped.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No response arrived within the catch timeout.
    #[error("response catching timeout: no response to {request_type} within {timeout:?}")]
    ResponseTimeout {
        request_type: String,
        timeout: Duration,
    },

    /// The request could not be handed to the engine.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The request could not be serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Another in-flight request already uses this correlation id.
    #[error("correlation id already in flight: {0}")]
    DuplicateCorrelation(String),

    /// The dispatcher stopped before a response arrived.
    #[error("client closed")]
    Closed,
}

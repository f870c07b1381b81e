//! Structured error types for the batch client.
//!
//! These are designed to let a caller tell retryable faults apart from fatal
//! ones, and protocol violations apart from soft data defects.

use std::time::Duration;
use thiserror::Error;

/// Fault raised by the remote file-exchange transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("remote path not found: {0}")]
    PathNotFound(String),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the operation that produced this fault is worth repeating.
    ///
    /// Connection drops and plain I/O hiccups are transient; a rejected login
    /// or a missing remote directory will not fix itself.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::ConnectionLost(_) | TransportError::Io(_) => true,
            TransportError::AuthFailed(_) | TransportError::PathNotFound(_) => false,
        }
    }
}

/// Errors surfaced by reply parsing and batch polling.
#[derive(Debug, Error)]
pub enum DlError {
    /// A data line named a different security than the enclosing block.
    /// The reply is malformed beyond local repair, so the whole parse aborts.
    #[error("protocol violation: data line for '{found}' inside block for '{expected}'")]
    ProtocolViolation { expected: String, found: String },

    #[error("reply decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("deadline of {deadline:?} exceeded with {pending} request(s) unresolved")]
    DeadlineExceeded { deadline: Duration, pending: usize },

    #[error("polling cancelled with {pending} request(s) unresolved")]
    Cancelled { pending: usize },

    #[error("config error: {0}")]
    Config(String),
}

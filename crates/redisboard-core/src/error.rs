//! Error types for the Redis introspection engine.

use serde::{Deserialize, Serialize};

/// Categories of errors that can occur while talking to a Redis server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BoardErrorKind {
    /// The server could not be reached or the connection dropped.
    ConnectionFailed,
    /// The server rejected a command (wrong type, unknown command, bad index...).
    CommandError,
    /// A reply had a shape we could not convert.
    TypeError,
    /// The transport gave up waiting.
    Timeout,
    /// Server registration or settings are unusable.
    InvalidConfig,
}

/// Structured error for engine operations.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct BoardError {
    pub kind: BoardErrorKind,
    pub message: String,
    pub details: Option<String>,
}

impl BoardError {
    pub fn new(kind: BoardErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::new(BoardErrorKind::ConnectionFailed, msg)
    }

    pub fn command(msg: impl Into<String>) -> Self {
        Self::new(BoardErrorKind::CommandError, msg)
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(BoardErrorKind::InvalidConfig, msg)
    }

    /// True when the failure means the server itself is unusable, as opposed
    /// to a single command being rejected.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self.kind,
            BoardErrorKind::ConnectionFailed | BoardErrorKind::Timeout
        )
    }
}

impl From<redis::RedisError> for BoardError {
    fn from(e: redis::RedisError) -> Self {
        let kind = if e.is_timeout() {
            BoardErrorKind::Timeout
        } else if e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() {
            BoardErrorKind::ConnectionFailed
        } else if e.kind() == redis::ErrorKind::TypeError {
            BoardErrorKind::TypeError
        } else {
            BoardErrorKind::CommandError
        };
        let mut err = Self::new(kind, e.to_string());
        if let Some(code) = e.code() {
            err = err.with_details(code.to_string());
        }
        err
    }
}

/// Convenience alias.
pub type BoardResult<T> = Result<T, BoardError>;

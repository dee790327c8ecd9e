//! Error handling for signed requests, typed responses and event streams.

use std::{fmt, time::Duration};

use http::StatusCode;
use thiserror::Error;

/// The main result type used throughout the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Why a stream or request was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller's cancellation token fired.
    Cancelled,
    /// The per-stream deadline elapsed.
    DeadlineExceeded(Duration),
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled by caller"),
            Self::DeadlineExceeded(after) => write!(f, "deadline exceeded after {after:?}"),
        }
    }
}

/// Every failure a request or stream can record.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request could not be sent or its response could not be received.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with a status >= 300.
    #[error("invalid response from API (status={status}): {body}")]
    Status { status: StatusCode, body: String },

    /// The body could not be decoded into the expected payload.
    #[error("cannot parse response body: {0}")]
    Decode(#[source] serde_json::Error),

    /// The request body could not be serialized.
    #[error("failed to serialize request body: {0}")]
    Serialization(#[source] serde_json::Error),

    /// The event stream failed mid-flight.
    #[error("stream read error: {message}")]
    StreamRead { message: String },

    /// The caller cancelled, or the deadline fired.
    #[error("operation cancelled: {reason}")]
    Cancelled { reason: CancelReason },

    /// The client configuration is invalid.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl ClientError {
    /// Create a status error.
    pub fn status(status: StatusCode, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Create a stream read error.
    pub fn stream_read(message: impl Into<String>) -> Self {
        Self::StreamRead {
            message: message.into(),
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(reason: CancelReason) -> Self {
        Self::Cancelled { reason }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The HTTP status carried by a status error.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status(),
            _ => None,
        }
    }

    /// Check if this error is a cancellation or an elapsed deadline.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Check if this is a 404 status error.
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(StatusCode::NOT_FOUND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ClientError::config("Invalid URL");
        assert!(matches!(err, ClientError::Config { .. }));

        let err = ClientError::cancelled(CancelReason::Cancelled);
        assert!(err.is_cancelled());

        let err = ClientError::stream_read("connection reset");
        assert!(matches!(err, ClientError::StreamRead { .. }));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_status_error_exposes_code_and_body() {
        let err = ClientError::status(StatusCode::NOT_FOUND, "{\"message\":\"missing\"}");
        assert_eq!(err.status_code(), Some(StatusCode::NOT_FOUND));
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "invalid response from API (status=404 Not Found): {\"message\":\"missing\"}"
        );
    }

    #[test]
    fn test_cancel_reason_display() {
        let err = ClientError::cancelled(CancelReason::DeadlineExceeded(Duration::from_secs(3)));
        assert_eq!(
            err.to_string(),
            "operation cancelled: deadline exceeded after 3s"
        );
    }
}

//! Error types for control-plane calls.

use thiserror::Error;

/// A result type using `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by a single control-plane round trip.
///
/// The client never retries; callers decide what a failure means.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection, DNS or timeout failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The control plane answered with a status other than 200 or 201.
    #[error("control plane returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// The response body was not the JSON we expected.
    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl ClientError {
    /// Returns true if this error might be resolved by retrying later.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Parse(_) => false,
        }
    }

    /// Returns the status code if the control plane answered at all.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_errors() {
        assert!(ClientError::Transport("refused".into()).is_retriable());
        assert!(ClientError::Status { status: 503, body: String::new() }.is_retriable());
        assert!(ClientError::Status { status: 429, body: String::new() }.is_retriable());
        assert!(!ClientError::Status { status: 404, body: String::new() }.is_retriable());
        assert!(!ClientError::Parse("eof".into()).is_retriable());
    }

    #[test]
    fn status_accessor() {
        let err = ClientError::Status {
            status: 404,
            body: "Session '9' not found.".into(),
        };
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("404"));
        assert_eq!(ClientError::Parse("x".into()).status(), None);
    }
}

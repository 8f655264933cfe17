//! Error types for pool operations.
//!
//! Control-plane failures are wrapped from [`ClientError`]; the remaining
//! variants describe what the pool itself observed (a session or statement
//! reaching a failed state, a bound elapsing, or shutdown).

use std::time::Duration;

use livy_pool_client::ClientError;
use livy_pool_core::{SessionId, SessionState, StatementId, StatementState};
use thiserror::Error;

/// A result type using `PoolError`.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors that can occur in pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A control-plane round trip failed.
    #[error("control plane error: {0}")]
    Client(#[from] ClientError),

    /// A session reached a state it cannot serve work from.
    #[error("session {session_id} is {state}")]
    SessionFailed {
        /// The session.
        session_id: SessionId,
        /// The state it was observed in.
        state: SessionState,
    },

    /// A newly opened session did not leave start-up in time.
    #[error("session {session_id} did not finish starting within {after:?}")]
    SessionStartTimeout {
        /// The session, which still exists remotely.
        session_id: SessionId,
        /// The bound that elapsed.
        after: Duration,
    },

    /// A session was created but polling its start-up failed.
    #[error("session {session_id} was created but polling it failed: {source}")]
    SessionPollFailed {
        /// The session, which still exists remotely.
        session_id: SessionId,
        /// The failed poll.
        #[source]
        source: ClientError,
    },

    /// A statement ended without producing output.
    #[error("statement {statement_id} in session {session_id} ended {state}{}", reason_suffix(.reason))]
    StatementFailed {
        /// The session the statement ran in.
        session_id: SessionId,
        /// The statement.
        statement_id: StatementId,
        /// The final state.
        state: StatementState,
        /// Interpreter error, when one was reported.
        reason: Option<String>,
    },

    /// A statement did not finish in time.
    #[error("statement {statement_id} in session {session_id} did not finish within {after:?}")]
    StatementTimeout {
        /// The session the statement ran in.
        session_id: SessionId,
        /// The statement, which may still be running remotely.
        statement_id: StatementId,
        /// The bound that elapsed.
        after: Duration,
    },

    /// No idle session is available right now.
    #[error("no idle session available")]
    NoIdleSession,

    /// The pool is shutting down.
    #[error("pool is shutting down")]
    Cancelled,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default()
}

impl PoolError {
    /// The session a failed open left behind on the control plane, if any.
    #[must_use]
    pub const fn orphaned_session(&self) -> Option<SessionId> {
        match self {
            Self::SessionStartTimeout { session_id, .. }
            | Self::SessionPollFailed { session_id, .. } => Some(*session_id),
            _ => None,
        }
    }

    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::Client(_) | Self::SessionFailed { .. } | Self::SessionPollFailed { .. } => 502,
            Self::SessionStartTimeout { .. } | Self::StatementTimeout { .. } => 504,
            Self::StatementFailed { .. } => 422,
            Self::NoIdleSession | Self::Cancelled => 503,
            Self::Config(_) => 400,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Client(e) | Self::SessionPollFailed { source: e, .. } => e.is_retriable(),
            Self::SessionStartTimeout { .. } | Self::StatementTimeout { .. } | Self::NoIdleSession => {
                true
            }
            Self::SessionFailed { .. }
            | Self::StatementFailed { .. }
            | Self::Cancelled
            | Self::Config(_) => false,
        }
    }
}

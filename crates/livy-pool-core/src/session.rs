//! Remote session snapshots.
//!
//! A [`Session`] is the pool's view of one interactive session as last
//! reported by the control plane. Its `state` is owned by the remote side and
//! only ever observed by polling.
//!
//! # State Machine
//!
//! ```text
//!   not_started ──▶ starting ──▶ idle ◀──▶ busy
//!                      │           │         │
//!                      ▼           ▼         ▼
//!            shutting_down | error | dead | success
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;
use crate::ids::SessionId;

/// Execution-engine variant a session is created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Scala interpreter.
    #[default]
    Spark,
    /// Python interpreter.
    PySpark,
    /// Python 3 interpreter.
    PySpark3,
    /// R interpreter.
    SparkR,
}

impl SessionKind {
    /// All supported kinds, in configuration order.
    pub const ALL: [Self; 4] = [Self::Spark, Self::PySpark, Self::PySpark3, Self::SparkR];

    /// The wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spark => "spark",
            Self::PySpark => "pyspark",
            Self::PySpark3 => "pyspark3",
            Self::SparkR => "sparkr",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CoreError::InvalidKind(s.to_string()))
    }
}

/// Remote lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SessionState {
    /// Accepted but not yet starting.
    NotStarted,
    /// Interpreter is being launched.
    Starting,
    /// Ready to accept a statement.
    Idle,
    /// Running a statement.
    Busy,
    /// Being torn down.
    ShuttingDown,
    /// Failed to start or crashed.
    Error,
    /// Gone.
    Dead,
    /// Stopped cleanly.
    Success,
    /// Any state string this crate does not recognise.
    Unknown,
}

impl SessionState {
    /// The wire name of this state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Starting => "starting",
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::ShuttingDown => "shutting_down",
            Self::Error => "error",
            Self::Dead => "dead",
            Self::Success => "success",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a wire state, case-insensitively. Unrecognised strings map to `Unknown`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "not_started" => Self::NotStarted,
            "starting" => Self::Starting,
            "idle" => Self::Idle,
            "busy" => Self::Busy,
            "shutting_down" => Self::ShuttingDown,
            "error" => Self::Error,
            "dead" => Self::Dead,
            "success" => Self::Success,
            _ => Self::Unknown,
        }
    }

    /// Returns true for the states a pool keeps tracking: idle, busy and starting.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Idle | Self::Busy | Self::Starting)
    }

    /// Returns true while the session has not finished starting up.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::NotStarted | Self::Starting)
    }

    /// Returns true once the session can never become idle again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::ShuttingDown | Self::Error | Self::Dead | Self::Success | Self::Unknown
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for SessionState {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<SessionState> for String {
    fn from(state: SessionState) -> Self {
        state.as_str().to_string()
    }
}

/// Point-in-time snapshot of a remote session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Identifier assigned by the control plane.
    pub id: SessionId,
    /// Kind the session was created with. `None` when the control plane
    /// omits it or reports a kind outside the supported set.
    #[serde(default, deserialize_with = "deserialize_kind")]
    pub kind: Option<SessionKind>,
    /// Last observed remote state.
    pub state: SessionState,
    /// Cluster application id, once one has been assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
}

impl Session {
    /// Create a snapshot with no application id.
    #[must_use]
    pub const fn new(id: SessionId, kind: Option<SessionKind>, state: SessionState) -> Self {
        Self {
            id,
            kind,
            state,
            app_id: None,
        }
    }

    /// Returns true if this session was created for `kind`.
    #[must_use]
    pub fn is_kind(&self, kind: SessionKind) -> bool {
        self.kind == Some(kind)
    }

    /// Returns true if the session is idle and of the given kind.
    #[must_use]
    pub fn is_idle_for(&self, kind: SessionKind) -> bool {
        self.is_kind(kind) && self.state == SessionState::Idle
    }
}

fn deserialize_kind<'de, D>(deserializer: D) -> Result<Option<SessionKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

//! Statement (unit of work) snapshots.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::StatementId;

/// Remote state of a submitted statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatementState {
    /// Queued behind another statement.
    Waiting,
    /// Executing.
    Running,
    /// Finished; `output` is populated.
    Available,
    /// Failed.
    Error,
    /// Cancellation requested.
    Cancelling,
    /// Cancelled.
    Cancelled,
    /// Any state string this crate does not recognise.
    Unknown,
}

impl StatementState {
    /// The wire name of this state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Available => "available",
            Self::Error => "error",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a wire state, case-insensitively. Unrecognised strings map to `Unknown`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "waiting" => Self::Waiting,
            "running" => Self::Running,
            "available" => Self::Available,
            "error" => Self::Error,
            "cancelling" => Self::Cancelling,
            "cancelled" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }

    /// Returns true while the statement still has to be polled.
    #[must_use]
    pub const fn is_in_progress(self) -> bool {
        matches!(self, Self::Waiting | Self::Running)
    }
}

impl fmt::Display for StatementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for StatementState {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<StatementState> for String {
    fn from(state: StatementState) -> Self {
        state.as_str().to_string()
    }
}

/// Result payload of a finished statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StatementOutput {
    /// `ok` or `error`, as reported by the interpreter.
    #[serde(default)]
    pub status: Option<String>,
    /// MIME-keyed result data, present on success.
    #[serde(default)]
    pub data: Option<Value>,
    /// Exception name, present on interpreter errors.
    #[serde(default)]
    pub ename: Option<String>,
    /// Exception message, present on interpreter errors.
    #[serde(default)]
    pub evalue: Option<String>,
}

/// Point-in-time snapshot of a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Identifier assigned on submission.
    pub id: StatementId,
    /// Last observed remote state.
    pub state: StatementState,
    /// Result payload, only meaningful once `state` is `available`.
    #[serde(default)]
    pub output: Option<StatementOutput>,
}

impl Statement {
    /// The `output.data` payload, if the statement produced one.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.output.as_ref().and_then(|o| o.data.as_ref())
    }

    /// A human-readable reason for an interpreter-level failure, if any.
    #[must_use]
    pub fn failure_reason(&self) -> Option<String> {
        let output = self.output.as_ref()?;
        match (&output.ename, &output.evalue) {
            (Some(name), Some(value)) => Some(format!("{name}: {value}")),
            (Some(name), None) => Some(name.clone()),
            (None, Some(value)) => Some(value.clone()),
            (None, None) => None,
        }
    }
}

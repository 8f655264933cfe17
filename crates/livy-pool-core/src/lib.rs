//! Core types for the Livy session pool.
//!
//! This crate provides the foundational types shared by the client and the
//! pool manager:
//!
//! - **Identifiers**: [`SessionId`] and [`StatementId`], assigned by the control plane
//! - **Sessions**: the [`Session`] snapshot with its [`SessionKind`] and [`SessionState`]
//! - **Statements**: the [`Statement`] snapshot with its [`StatementState`] and output
//! - **Error types**: [`CoreError`] for malformed identifiers and enum strings
//!
//! # Example
//!
//! ```
//! use livy_pool_core::{Session, SessionId, SessionKind, SessionState};
//!
//! let session: Session = serde_json::from_str(
//!     r#"{"id": 7, "kind": "pyspark", "state": "idle", "appId": null}"#,
//! ).unwrap();
//!
//! assert_eq!(session.id, SessionId::new(7));
//! assert_eq!(session.kind, Some(SessionKind::PySpark));
//! assert_eq!(session.state, SessionState::Idle);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod session;
pub mod statement;

pub use error::{CoreError, Result};
pub use ids::{SessionId, StatementId};
pub use session::{Session, SessionKind, SessionState};
pub use statement::{Statement, StatementOutput, StatementState};

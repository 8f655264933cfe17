//! HTTP/JSON client for the Livy session control plane.
//!
//! This crate provides the [`ControlPlane`] trait and its REST implementation,
//! [`HttpControlPlane`]. It handles:
//!
//! - JSON GET/POST round trips with the headers the control plane requires
//! - Distinguishing transport, status and parse failures ([`ClientError`])
//! - Fetching the remote session snapshot used by each reconciliation cycle
//! - Opening sessions and submitting or polling statements
//!
//! # Example
//!
//! ```no_run
//! use livy_pool_client::{ControlPlane, CreateSessionRequest, HttpControlPlane, HttpSettings};
//! use livy_pool_core::SessionKind;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpControlPlane::new("http://localhost:8998", &HttpSettings::default())?;
//!
//! let session = client
//!     .create_session(&CreateSessionRequest::new(SessionKind::PySpark))
//!     .await?;
//! println!("Opened session {} in state {}", session.id, session.state);
//!
//! for (id, session) in client.list_sessions().await? {
//!     println!("{id}: {}", session.state);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! Enable the `test-utils` feature to use the in-memory mock:
//!
//! ```ignore
//! use livy_pool_client::{ControlPlane, CreateSessionRequest, MockControlPlane};
//! use livy_pool_core::SessionKind;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let control = MockControlPlane::new();
//! control.create_session(&CreateSessionRequest::new(SessionKind::Spark)).await?;
//! assert_eq!(control.session_count(), 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod control_plane;
pub mod error;
pub mod http;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use control_plane::{ControlPlane, CreateSessionRequest, HttpControlPlane, RemoteSnapshot};
pub use error::{ClientError, Result};
pub use http::{HttpSettings, JsonHttpClient};

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockControlPlane;

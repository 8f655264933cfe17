//! Session pool management for a Livy control plane.
//!
//! This crate provides [`SessionPool`], which keeps a target number of
//! sessions of one kind alive and hands out idle ones to callers. It handles:
//!
//! - Tracking pool membership in a lock-protected [`SessionRegistry`]
//! - Opening sessions and waiting for them to start
//! - Periodic reconciliation against the control plane's session list
//! - Running statements to completion on a chosen session
//! - Cooperative shutdown of the background reconciler
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Callers                                │
//! └─────────────────────────────────────────────────────────────────┘
//!            │ acquire()                         │ submit()
//!            ▼                                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         SessionPool                              │
//! │  ┌──────────────────┐  ┌─────────────────┐  ┌────────────────┐  │
//! │  │ SessionRegistry  │◄─│   Reconciler    │  │ run_statement  │  │
//! │  │ (RwLock<BTreeMap>)│  │ (spawned task)  │  │ (poll loop)    │  │
//! │  └──────────────────┘  └─────────────────┘  └────────────────┘  │
//! │                               │ open_session        │           │
//! └───────────────────────────────┼─────────────────────┼───────────┘
//!                                 ▼                     ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                ControlPlane (HTTP/JSON, livy-pool-client)        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use livy_pool_manager::{PoolConfig, SessionPool};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = SessionPool::connect(PoolConfig::from_env())?;
//!
//! if let Some(idle) = pool.acquire() {
//!     let output = pool.submit(idle.session_id, "spark.range(10).count()").await?;
//!     println!("{output}");
//! }
//!
//! pool.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pool;
pub mod reconciler;
pub mod registry;
pub mod shutdown;
pub mod statement;

pub use config::{parse_resource_list, PollPolicy, PoolConfig};
pub use error::{PoolError, Result};
pub use lifecycle::{open_session, require_live};
pub use pool::{IdleSession, SessionPool};
pub use reconciler::{plan_opens, CycleReport, Reconciler};
pub use registry::SessionRegistry;
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use statement::run_statement;

//! The session pool facade.

use std::sync::Arc;

use livy_pool_client::{ControlPlane, HttpControlPlane};
use livy_pool_core::SessionId;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::reconciler::Reconciler;
use crate::registry::SessionRegistry;
use crate::shutdown::{self, ShutdownTrigger};
use crate::statement::run_statement;

/// An idle session handed out by [`SessionPool::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleSession {
    /// The session to submit work to.
    pub session_id: SessionId,
    /// Base URL of the control plane that owns it.
    pub base_url: String,
}

/// A pool of sessions kept at a target size by a background reconciler.
///
/// Acquisition is optimistic: an acquired session is not reserved, so two
/// callers may be handed the same idle session until the next cycle sees it
/// busy.
///
/// Dropping the pool stops the reconciler without waiting for it; call
/// [`SessionPool::shutdown`] to wait.
pub struct SessionPool<C: ?Sized> {
    client: Arc<C>,
    registry: Arc<SessionRegistry>,
    config: Arc<PoolConfig>,
    trigger: ShutdownTrigger,
    reconciler: Mutex<Option<JoinHandle<()>>>,
}

impl SessionPool<HttpControlPlane> {
    /// Start a pool against the control plane named in `config`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn connect(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let client = HttpControlPlane::new(config.base_url(), &config.http_settings())?;
        Self::start(config, Arc::new(client))
    }
}

impl<C> SessionPool<C>
where
    C: ControlPlane + ?Sized + 'static,
{
    /// Start a pool over `client` and spawn its reconciler.
    ///
    /// The reconciler's first cycle fills the pool. Must be called from
    /// within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Config` if the configuration is invalid.
    pub fn start(config: PoolConfig, client: Arc<C>) -> Result<Self> {
        config.validate()?;

        let config = Arc::new(config);
        let registry = Arc::new(SessionRegistry::new(config.kind));
        let (trigger, shutdown) = shutdown::channel();

        let reconciler = Reconciler::new(
            Arc::clone(&client),
            Arc::clone(&registry),
            Arc::clone(&config),
        );
        let handle = tokio::spawn(async move {
            reconciler.run(shutdown).await;
        });

        info!(
            base_url = %client.base_url(),
            kind = %config.kind,
            pool_size = config.pool_size,
            "Started session pool"
        );

        Ok(Self {
            client,
            registry,
            config,
            trigger,
            reconciler: Mutex::new(Some(handle)),
        })
    }

    /// Get an idle session of the pool's kind, if one is recorded.
    ///
    /// Repeated calls return the same session until a reconciliation cycle
    /// changes the registry.
    #[must_use]
    pub fn acquire(&self) -> Option<IdleSession> {
        self.registry.first_idle().map(|session| IdleSession {
            session_id: session.id,
            base_url: self.client.base_url().to_string(),
        })
    }

    /// Run `code` on a session and wait for its output.
    ///
    /// # Errors
    ///
    /// See [`run_statement`]. Returns `PoolError::Cancelled` if the pool is
    /// shut down while the statement is being polled.
    pub async fn submit(&self, session_id: SessionId, code: &str) -> Result<Value> {
        let mut shutdown = self.trigger.subscribe();
        run_statement(
            self.client.as_ref(),
            session_id,
            code,
            &self.config.statement_policy(),
            &mut shutdown,
        )
        .await
    }

    /// Run `code` on whichever session [`acquire`](Self::acquire) returns.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::NoIdleSession` if no session is idle, otherwise
    /// as [`submit`](Self::submit).
    pub async fn submit_any(&self, code: &str) -> Result<(SessionId, Value)> {
        let idle = self.acquire().ok_or(PoolError::NoIdleSession)?;
        let output = self.submit(idle.session_id, code).await?;
        Ok((idle.session_id, output))
    }

    /// The pool's registry.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// The pool's configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Returns true until the reconciler has stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.reconciler
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the reconciler and wait for it to exit.
    ///
    /// In-flight [`submit`](Self::submit) calls fail with `Cancelled`.
    /// Calling this more than once is harmless.
    pub async fn shutdown(&self) {
        self.trigger.trigger();
        let handle = self.reconciler.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Reconciler task ended abnormally");
            }
            info!("Session pool stopped");
        }
    }
}

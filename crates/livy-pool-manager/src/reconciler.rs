//! Pool reconciliation loop.
//!
//! Each cycle lists the remote sessions, merges them into the registry,
//! prunes what can no longer serve work, and opens new sessions until the
//! pool is back at its target size:
//!
//! ```text
//!   list_sessions ──► for each tracked id:
//!                        missing remotely         → remove
//!                        other kind / not live    → remove
//!                        live and matching kind   → refresh (count idle)
//!                     untracked remote sessions   → ignored
//!                     open plan_opens(live, idle, target) sessions
//! ```
//!
//! A failed cycle is logged and skipped; the loop only exits when the
//! shutdown signal is raised.

use std::sync::Arc;

use livy_pool_client::ControlPlane;
use livy_pool_core::{Session, SessionState};
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::lifecycle::{open_session, require_live};
use crate::registry::SessionRegistry;
use crate::shutdown::Shutdown;

/// What one reconciliation cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Tracked sessions refreshed from the remote snapshot.
    pub refreshed: usize,
    /// Tracked sessions removed.
    pub pruned: usize,
    /// Refreshed sessions that were idle.
    pub idle: usize,
    /// Opens the cycle decided on.
    pub planned_opens: usize,
    /// Opens that produced a live session.
    pub opened: usize,
    /// Opens that failed or did not finish starting.
    pub failed_opens: usize,
    /// Tracked sessions once the cycle finished.
    pub live: usize,
}

impl CycleReport {
    /// Returns true if the cycle changed pool membership.
    #[must_use]
    pub const fn changed_membership(&self) -> bool {
        self.pruned > 0 || self.opened > 0 || self.failed_opens > 0
    }
}

/// Number of sessions to open after pruning.
///
/// An empty pool is filled to `target`. Otherwise one session is opened when
/// none is idle, plus enough to bring `live` up to `target`.
#[must_use]
pub const fn plan_opens(live: usize, idle: usize, target: usize) -> usize {
    if live == 0 {
        return target;
    }
    let mut opens = 0;
    if idle == 0 {
        opens += 1;
    }
    if live < target {
        opens += target - live;
    }
    opens
}

/// Keeps a registry in line with the control plane.
pub struct Reconciler<C: ?Sized> {
    client: Arc<C>,
    registry: Arc<SessionRegistry>,
    config: Arc<PoolConfig>,
}

impl<C> Reconciler<C>
where
    C: ControlPlane + ?Sized,
{
    /// Create a reconciler over a shared client, registry and configuration.
    #[must_use]
    pub fn new(client: Arc<C>, registry: Arc<SessionRegistry>, config: Arc<PoolConfig>) -> Self {
        Self {
            client,
            registry,
            config,
        }
    }

    /// The registry this reconciler maintains.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Run cycles until `shutdown` is raised.
    pub async fn run(&self, mut shutdown: Shutdown) {
        info!(
            base_url = %self.client.base_url(),
            kind = %self.registry.kind(),
            pool_size = self.config.pool_size,
            interval_ms = self.config.reconcile_interval_ms,
            "Starting session pool reconciliation loop"
        );

        while !shutdown.is_triggered() {
            match self.run_cycle(&mut shutdown).await {
                Ok(report) if report.changed_membership() => {
                    info!(
                        pruned = report.pruned,
                        opened = report.opened,
                        failed_opens = report.failed_opens,
                        idle = report.idle,
                        live = report.live,
                        "Reconciled session pool"
                    );
                }
                Ok(report) => {
                    debug!(idle = report.idle, live = report.live, "Session pool unchanged");
                }
                Err(PoolError::Cancelled) => break,
                Err(e) => {
                    warn!(error = %e, "Reconciliation cycle failed, skipping");
                }
            }

            if shutdown.sleep(self.config.reconcile_interval()).await.is_err() {
                break;
            }
        }

        info!("Session pool reconciliation loop stopped");
    }

    /// Run one reconciliation cycle.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving the registry untouched, if the remote
    /// snapshot cannot be fetched. Returns `PoolError::Cancelled` if
    /// `shutdown` is raised while a new session is starting. Failed opens
    /// are reported in the [`CycleReport`], not as errors.
    pub async fn run_cycle(&self, shutdown: &mut Shutdown) -> Result<CycleReport> {
        let mut remote = self.client.list_sessions().await?;
        let kind = self.registry.kind();
        let mut report = CycleReport::default();

        for id in self.registry.ids() {
            match remote.remove(&id) {
                None => {
                    self.registry.remove(id);
                    report.pruned += 1;
                    info!(session_id = %id, "Session no longer exists remotely, removing");
                }
                Some(session) if session.is_kind(kind) && session.state.is_live() => {
                    if session.state == SessionState::Idle {
                        report.idle += 1;
                    }
                    self.registry.upsert(session);
                    report.refreshed += 1;
                }
                Some(session) => {
                    self.registry.remove(id);
                    report.pruned += 1;
                    if session.state.is_terminal() {
                        info!(session_id = %id, state = %session.state, "Session ended, removing");
                    } else {
                        info!(
                            session_id = %id,
                            state = %session.state,
                            kind = session.kind.map_or("none", |k| k.as_str()),
                            "Session cannot serve work, removing"
                        );
                    }
                }
            }
        }

        if !remote.is_empty() {
            debug!(untracked = remote.len(), "Ignoring sessions this pool did not open");
        }

        report.planned_opens = plan_opens(self.registry.len(), report.idle, self.config.pool_size);

        for _ in 0..report.planned_opens {
            match self.open_one(shutdown).await {
                Ok(()) => report.opened += 1,
                Err(PoolError::Cancelled) => return Err(PoolError::Cancelled),
                Err(e @ (PoolError::SessionFailed { .. } | PoolError::SessionStartTimeout { .. })) => {
                    report.failed_opens += 1;
                    warn!(error = %e, "Opened session is not usable");
                }
                Err(e) => {
                    report.failed_opens += 1;
                    warn!(error = %e, "Failed to open session, deferring to next cycle");
                    break;
                }
            }
        }

        report.live = self.registry.len();
        Ok(report)
    }

    async fn open_one(&self, shutdown: &mut Shutdown) -> Result<()> {
        let request = self.config.create_request();
        let policy = self.config.startup_policy();

        let session = match open_session(self.client.as_ref(), &request, &policy, shutdown).await {
            Ok(session) => require_live(session)?,
            Err(e) => {
                // Created but not confirmed; track it so the next cycle refreshes or prunes it.
                if let Some(session_id) = e.orphaned_session() {
                    self.registry
                        .upsert(Session::new(session_id, Some(request.kind), SessionState::Starting));
                }
                return Err(e);
            }
        };

        let session_id = session.id;
        if self.registry.upsert(session) {
            Ok(())
        } else {
            Err(PoolError::SessionFailed {
                session_id,
                state: SessionState::Unknown,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use livy_pool_client::MockControlPlane;
    use livy_pool_core::{SessionId, SessionKind};

    use super::*;
    use crate::shutdown;

    fn config(pool_size: usize) -> PoolConfig {
        PoolConfig {
            pool_size,
            reconcile_interval_ms: 2000,
            poll_interval_ms: 1000,
            ..PoolConfig::default()
        }
    }

    fn setup(pool_size: usize) -> (Arc<MockControlPlane>, Reconciler<MockControlPlane>) {
        let control = Arc::new(MockControlPlane::new());
        let registry = Arc::new(SessionRegistry::new(SessionKind::Spark));
        let reconciler = Reconciler::new(
            Arc::clone(&control),
            registry,
            Arc::new(config(pool_size)),
        );
        (control, reconciler)
    }

    fn spark(id: u64, state: SessionState) -> Session {
        Session::new(SessionId::new(id), Some(SessionKind::Spark), state)
    }

    /// Track a session both remotely and locally.
    fn track(control: &MockControlPlane, reconciler: &Reconciler<MockControlPlane>, session: Session) {
        control.insert_session(session.clone());
        assert!(reconciler.registry().upsert(session));
    }

    #[test]
    fn open_planning() {
        assert_eq!(plan_opens(0, 0, 2), 2);
        assert_eq!(plan_opens(0, 0, 5), 5);
        assert_eq!(plan_opens(1, 1, 2), 1);
        assert_eq!(plan_opens(2, 1, 2), 0);
        assert_eq!(plan_opens(2, 0, 2), 1);
        assert_eq!(plan_opens(1, 0, 3), 3);
        assert_eq!(plan_opens(4, 2, 2), 0);
    }

    #[tokio::test]
    async fn empty_pool_is_filled_to_target() {
        let (control, reconciler) = setup(2);

        let report = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();

        assert_eq!(control.created_count(), 2);
        assert_eq!(report.planned_opens, 2);
        assert_eq!(report.opened, 2);
        assert_eq!(reconciler.registry().len(), 2);
        assert_eq!(reconciler.registry().idle_sessions().len(), 2);
    }

    #[tokio::test]
    async fn one_idle_session_opens_one_more() {
        let (control, reconciler) = setup(2);
        track(&control, &reconciler, spark(0, SessionState::Idle));

        let report = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();

        assert_eq!(report.idle, 1);
        assert_eq!(report.planned_opens, 1);
        assert_eq!(control.created_count(), 1);
        assert_eq!(reconciler.registry().len(), 2);
    }

    #[tokio::test]
    async fn full_pool_without_idle_opens_one() {
        let (control, reconciler) = setup(2);
        track(&control, &reconciler, spark(0, SessionState::Busy));
        track(&control, &reconciler, spark(1, SessionState::Starting));

        let report = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();

        assert_eq!(report.planned_opens, 1);
        assert_eq!(control.created_count(), 1);
        assert_eq!(reconciler.registry().len(), 3);
    }

    #[tokio::test]
    async fn full_pool_with_idle_opens_nothing() {
        let (control, reconciler) = setup(2);
        track(&control, &reconciler, spark(0, SessionState::Idle));
        track(&control, &reconciler, spark(1, SessionState::Busy));

        let report = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();

        assert_eq!(report.planned_opens, 0);
        assert_eq!(report.refreshed, 2);
        assert!(!report.changed_membership());
        assert_eq!(control.created_count(), 0);
    }

    #[tokio::test]
    async fn dead_session_is_replaced() {
        let (control, reconciler) = setup(2);
        track(&control, &reconciler, spark(0, SessionState::Idle));
        track(&control, &reconciler, spark(1, SessionState::Idle));
        assert_eq!(reconciler.run_cycle(&mut Shutdown::never()).await.unwrap().opened, 0);

        control.set_state(SessionId::new(1), SessionState::Dead);
        let report = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();

        assert_eq!(report.pruned, 1);
        assert_eq!(report.opened, 1);
        assert!(!reconciler.registry().contains(SessionId::new(1)));
        assert_eq!(reconciler.registry().len(), 2);
    }

    #[tokio::test]
    async fn non_live_states_are_pruned() {
        for state in [
            SessionState::NotStarted,
            SessionState::ShuttingDown,
            SessionState::Error,
            SessionState::Dead,
            SessionState::Success,
            SessionState::Unknown,
        ] {
            let (control, reconciler) = setup(1);
            track(&control, &reconciler, spark(0, SessionState::Idle));
            track(&control, &reconciler, spark(1, SessionState::Idle));
            control.set_state(SessionId::new(1), state);

            let report = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();

            assert!(
                !reconciler.registry().contains(SessionId::new(1)),
                "{state} session should have been pruned"
            );
            assert_eq!(report.pruned, 1);
        }
    }

    #[tokio::test]
    async fn session_missing_remotely_is_pruned() {
        let (control, reconciler) = setup(1);
        track(&control, &reconciler, spark(0, SessionState::Idle));
        track(&control, &reconciler, spark(1, SessionState::Idle));
        control.remove_session(SessionId::new(0));

        let report = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();

        assert_eq!(report.pruned, 1);
        assert_eq!(reconciler.registry().ids(), vec![SessionId::new(1)]);
    }

    #[tokio::test]
    async fn kind_mismatch_is_pruned() {
        let (control, reconciler) = setup(1);
        track(&control, &reconciler, spark(0, SessionState::Idle));
        track(&control, &reconciler, spark(1, SessionState::Idle));
        control.insert_session(Session::new(
            SessionId::new(1),
            Some(SessionKind::PySpark),
            SessionState::Idle,
        ));
        control.insert_session(Session::new(SessionId::new(0), None, SessionState::Idle));

        reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();

        for session in reconciler.registry().snapshot() {
            assert_eq!(session.kind, Some(SessionKind::Spark));
            assert!(session.id.get() >= 2, "stale session {} kept", session.id);
        }
    }

    #[tokio::test]
    async fn untracked_remote_sessions_are_not_adopted() {
        let (control, reconciler) = setup(1);
        control.insert_session(spark(7, SessionState::Idle));

        reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();

        assert!(!reconciler.registry().contains(SessionId::new(7)));
        assert_eq!(reconciler.registry().ids(), vec![SessionId::new(8)]);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_registry_unchanged() {
        let (control, reconciler) = setup(2);
        track(&control, &reconciler, spark(0, SessionState::Idle));
        control.set_state(SessionId::new(0), SessionState::Dead);
        control.fail_next_lists(1);

        let err = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap_err();

        assert!(matches!(err, PoolError::Client(_)));
        assert_eq!(control.created_count(), 0);
        assert_eq!(
            reconciler.registry().get(SessionId::new(0)).map(|s| s.state),
            Some(SessionState::Idle)
        );
    }

    #[tokio::test]
    async fn create_failure_stops_opens_for_the_cycle() {
        let (control, reconciler) = setup(3);
        control.fail_next_creates(1);

        let report = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();
        assert_eq!(report.planned_opens, 3);
        assert_eq!(report.failed_opens, 1);
        assert_eq!(report.opened, 0);
        assert!(reconciler.registry().is_empty());

        let report = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();
        assert_eq!(report.opened, 3);
        assert_eq!(reconciler.registry().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_start_is_not_tracked() {
        let (control, reconciler) = setup(2);
        control.set_startup(vec![SessionState::Starting, SessionState::Error]);

        let report = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();

        assert_eq!(report.failed_opens, 2);
        assert_eq!(control.created_count(), 2);
        assert!(reconciler.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn start_timeout_keeps_session_tracked() {
        let control = Arc::new(MockControlPlane::new());
        control.set_startup(vec![SessionState::Starting; 1000]);
        let config = PoolConfig {
            pool_size: 1,
            session_start_timeout_seconds: 10,
            ..PoolConfig::default()
        };
        let reconciler = Reconciler::new(
            Arc::clone(&control),
            Arc::new(SessionRegistry::new(SessionKind::Spark)),
            Arc::new(config),
        );

        let report = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();

        assert_eq!(report.failed_opens, 1);
        assert_eq!(
            reconciler.registry().get(SessionId::new(0)).map(|s| s.state),
            Some(SessionState::Starting)
        );

        // Still starting remotely: tracked, not idle, so one more open is planned.
        let report = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();
        assert_eq!(report.refreshed, 1);
        assert_eq!(report.planned_opens, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_failure_keeps_created_session_tracked() {
        let (control, reconciler) = setup(1);
        control.set_startup(vec![SessionState::Starting, SessionState::Idle]);
        control.fail_next_session_polls(1);

        let report = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();
        assert_eq!(report.failed_opens, 1);
        assert_eq!(control.created_count(), 1);
        assert!(reconciler.registry().contains(SessionId::new(0)));

        // The next cycle picks up the session's real state instead of opening a replacement.
        control.set_state(SessionId::new(0), SessionState::Idle);
        let report = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();
        assert_eq!(report.refreshed, 1);
        assert_eq!(report.idle, 1);
        assert_eq!(report.planned_opens, 0);
        assert_eq!(control.created_count(), 1);
        assert_eq!(
            reconciler.registry().first_idle().map(|s| s.id),
            Some(SessionId::new(0))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_during_open() {
        let (control, reconciler) = setup(2);
        control.set_startup(vec![SessionState::Starting; 1000]);
        let (trigger, mut shutdown) = shutdown::channel();
        trigger.trigger();

        let err = reconciler.run_cycle(&mut shutdown).await.unwrap_err();

        assert!(matches!(err, PoolError::Cancelled));
        assert_eq!(control.created_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_survives_failures_and_stops_on_shutdown() {
        let (control, reconciler) = setup(2);
        control.fail_next_lists(2);
        let (trigger, shutdown) = shutdown::channel();

        let handle = tokio::spawn(async move {
            reconciler.run(shutdown).await;
            reconciler
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(control.list_calls() >= 3);
        assert_eq!(control.created_count(), 2);

        trigger.trigger();
        let reconciler = handle.await.unwrap();
        assert_eq!(reconciler.registry().len(), 2);

        let calls = control.list_calls();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(control.list_calls(), calls, "no cycles after shutdown");
    }
}

//! Running one statement to completion.

use livy_pool_client::ControlPlane;
use livy_pool_core::{SessionId, Statement, StatementState};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::config::PollPolicy;
use crate::error::{PoolError, Result};
use crate::shutdown::Shutdown;

/// Submit `code` to a session and wait for its output.
///
/// The statement is polled immediately after submission and then every
/// `policy.interval` while it is waiting or running. An `available`
/// statement yields its `output.data`; every other final state is a
/// `StatementFailed` error.
///
/// # Errors
///
/// Returns an error if a control-plane call fails, if the statement ends in
/// any state other than `available` with data (`StatementFailed`), if
/// `policy.timeout` elapses (`StatementTimeout`), or if `shutdown` is raised
/// (`Cancelled`).
pub async fn run_statement<C>(
    client: &C,
    session_id: SessionId,
    code: &str,
    policy: &PollPolicy,
    shutdown: &mut Shutdown,
) -> Result<Value>
where
    C: ControlPlane + ?Sized,
{
    let submitted = client.submit_statement(session_id, code).await?;
    let statement_id = submitted.id;
    debug!(
        session_id = %session_id,
        statement_id = %statement_id,
        "Submitted statement"
    );

    let deadline = policy.timeout.map(|t| Instant::now() + t);

    loop {
        let statement = client.get_statement(session_id, statement_id).await?;
        if !statement.state.is_in_progress() {
            return finish(session_id, statement);
        }
        debug!(
            session_id = %session_id,
            statement_id = %statement_id,
            state = %statement.state,
            "Statement in progress"
        );

        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    error!(
                        session_id = %session_id,
                        statement_id = %statement_id,
                        "Statement timed out"
                    );
                    return Err(PoolError::StatementTimeout {
                        session_id,
                        statement_id,
                        after: policy.timeout.unwrap_or_default(),
                    });
                }
                policy.interval.min(deadline - now)
            }
            None => policy.interval,
        };
        shutdown.sleep(pause).await?;
    }
}

fn finish(session_id: SessionId, statement: Statement) -> Result<Value> {
    let interpreter_error = statement
        .output
        .as_ref()
        .and_then(|o| o.status.as_deref())
        .is_some_and(|status| status.eq_ignore_ascii_case("error"));

    if statement.state == StatementState::Available && !interpreter_error {
        if let Some(data) = statement.data() {
            info!(
                session_id = %session_id,
                statement_id = %statement.id,
                "Statement completed"
            );
            return Ok(data.clone());
        }
    }

    let reason = statement.failure_reason();
    error!(
        session_id = %session_id,
        statement_id = %statement.id,
        state = %statement.state,
        reason = reason.as_deref().unwrap_or("-"),
        "Statement failed"
    );
    Err(PoolError::StatementFailed {
        session_id,
        statement_id: statement.id,
        state: statement.state,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use livy_pool_client::MockControlPlane;
    use livy_pool_core::{Session, SessionKind, SessionState, StatementOutput};
    use serde_json::json;

    use super::*;
    use crate::shutdown;

    fn control_with_session() -> MockControlPlane {
        let control = MockControlPlane::new();
        control.insert_session(Session::new(
            SessionId::new(0),
            Some(SessionKind::Spark),
            SessionState::Idle,
        ));
        control
    }

    fn ok_output(data: Value) -> Option<StatementOutput> {
        Some(StatementOutput {
            status: Some("ok".to_string()),
            data: Some(data),
            ..StatementOutput::default()
        })
    }

    fn every_second() -> PollPolicy {
        PollPolicy::unbounded(Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_running_available() {
        let control = control_with_session();
        control.script_statement(
            vec![
                StatementState::Waiting,
                StatementState::Waiting,
                StatementState::Running,
                StatementState::Available,
            ],
            ok_output(json!({"text/plain": "res0: Long = 10"})),
        );
        let start = Instant::now();

        let output = run_statement(
            &control,
            SessionId::new(0),
            "spark.range(10).count()",
            &every_second(),
            &mut Shutdown::never(),
        )
        .await
        .unwrap();

        assert_eq!(output, json!({"text/plain": "res0: Long = 10"}));
        assert_eq!(control.statement_polls(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(
            control.submitted(),
            vec![(SessionId::new(0), "spark.range(10).count()".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_states_are_failures() {
        for state in [
            StatementState::Error,
            StatementState::Cancelled,
            StatementState::Cancelling,
            StatementState::Unknown,
        ] {
            let control = control_with_session();
            control.script_statement(vec![StatementState::Running, state], None);

            let err = run_statement(
                &control,
                SessionId::new(0),
                "1 / 0",
                &every_second(),
                &mut Shutdown::never(),
            )
            .await
            .unwrap_err();

            match err {
                PoolError::StatementFailed {
                    state: observed, ..
                } => assert_eq!(observed, state),
                other => panic!("expected StatementFailed for {state}, got {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn interpreter_error_is_failure_with_reason() {
        let control = control_with_session();
        control.script_statement(
            vec![StatementState::Running, StatementState::Available],
            Some(StatementOutput {
                status: Some("error".to_string()),
                data: None,
                ename: Some("NameError".to_string()),
                evalue: Some("name 'x' is not defined".to_string()),
            }),
        );

        let err = run_statement(
            &control,
            SessionId::new(0),
            "x",
            &every_second(),
            &mut Shutdown::never(),
        )
        .await
        .unwrap_err();

        match err {
            PoolError::StatementFailed { state, reason, .. } => {
                assert_eq!(state, StatementState::Available);
                assert_eq!(reason.as_deref(), Some("NameError: name 'x' is not defined"));
            }
            other => panic!("expected StatementFailed, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn statement_timeout() {
        let control = control_with_session();
        control.script_statement(vec![StatementState::Running; 100], None);
        let start = Instant::now();

        let err = run_statement(
            &control,
            SessionId::new(0),
            "while True: pass",
            &PollPolicy::bounded(Duration::from_secs(1), Duration::from_secs(5)),
            &mut Shutdown::never(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PoolError::StatementTimeout { .. }), "got {err:?}");
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_statement_poll() {
        let control = control_with_session();
        control.script_statement(vec![StatementState::Running; 100], None);
        let (trigger, mut shutdown) = shutdown::channel();

        let task = tokio::spawn(async move {
            run_statement(
                &control,
                SessionId::new(0),
                "spin()",
                &every_second(),
                &mut shutdown,
            )
            .await
        });
        tokio::time::sleep(Duration::from_millis(3500)).await;
        trigger.trigger();

        assert!(matches!(task.await.unwrap(), Err(PoolError::Cancelled)));
    }

    #[tokio::test]
    async fn unknown_session_propagates_client_error() {
        let control = MockControlPlane::new();

        let err = run_statement(
            &control,
            SessionId::new(42),
            "1",
            &every_second(),
            &mut Shutdown::never(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PoolError::Client(ref e) if e.status() == Some(404)));
    }
}

//! Opening new sessions.
//!
//! A session is created with one POST and then polled until it leaves
//! start-up. The final snapshot is returned whatever state it ended in;
//! callers decide what to do with a session that failed to start.

use livy_pool_client::{ControlPlane, CreateSessionRequest};
use livy_pool_core::Session;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::PollPolicy;
use crate::error::{PoolError, Result};
use crate::shutdown::Shutdown;

/// Create a session and wait for it to finish starting.
///
/// Polls `get_session` every `policy.interval` while the session reports
/// `not_started` or `starting`.
///
/// # Errors
///
/// Returns `Client` if the session cannot be created. Once it exists, a
/// failed poll is `SessionPollFailed` and an elapsed `policy.timeout` is
/// `SessionStartTimeout`; both name the session, which still exists
/// remotely. Returns `Cancelled` if `shutdown` is raised.
pub async fn open_session<C>(
    client: &C,
    request: &CreateSessionRequest,
    policy: &PollPolicy,
    shutdown: &mut Shutdown,
) -> Result<Session>
where
    C: ControlPlane + ?Sized,
{
    let mut session = client.create_session(request).await?;
    let session_id = session.id;
    info!(
        session_id = %session_id,
        kind = %request.kind,
        state = %session.state,
        "Created session"
    );

    let deadline = policy.timeout.map(|t| Instant::now() + t);

    while session.state.is_pending() {
        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(PoolError::SessionStartTimeout {
                        session_id,
                        after: policy.timeout.unwrap_or_default(),
                    });
                }
                policy.interval.min(deadline - now)
            }
            None => policy.interval,
        };

        shutdown.sleep(pause).await?;
        session = client
            .get_session(session_id)
            .await
            .map_err(|source| PoolError::SessionPollFailed { session_id, source })?;
        debug!(session_id = %session_id, state = %session.state, "Polled starting session");
    }

    info!(
        session_id = %session_id,
        state = %session.state,
        app_id = session.app_id.as_deref().unwrap_or("-"),
        "Session finished starting"
    );
    Ok(session)
}

/// Accept a freshly opened session only if it can serve work.
///
/// # Errors
///
/// Returns `PoolError::SessionFailed` if the session is not idle, busy or
/// starting.
pub fn require_live(session: Session) -> Result<Session> {
    if session.state.is_live() {
        Ok(session)
    } else {
        Err(PoolError::SessionFailed {
            session_id: session.id,
            state: session.state,
        })
    }
}

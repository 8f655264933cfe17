//! Livy Pool - Session pool service
//!
//! Keeps a pool of Livy sessions warm and runs statements on them.
//!
//! # HTTP Endpoints
//!
//! ## Health
//! - `GET /health` - Health check
//!
//! ## Sessions
//! - `GET /v1/sessions/idle` - An idle session, or 404 when none is idle
//!
//! ## Statements
//! - `POST /v1/statements` - Run code on the given or an idle session

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use livy_pool_client::HttpControlPlane;
use livy_pool_core::SessionId;
use livy_pool_manager::{PoolConfig, PoolError, SessionPool};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    pool: Arc<SessionPool<HttpControlPlane>>,
}

// ============================================================================
// Health Endpoints
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "livy-pool",
    })
}

// ============================================================================
// Session Endpoints
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdleSessionResponse {
    session_id: String,
    base_url: String,
}

/// Error response format.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }
}

fn error_response(e: &PoolError) -> axum::response::Response {
    let code = e.http_status_code();
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(ErrorResponse::new(e.to_string(), code)),
    )
        .into_response()
}

/// Get an idle session.
///
/// GET /v1/sessions/idle
async fn idle_session_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.pool.acquire() {
        Some(idle) => Json(IdleSessionResponse {
            session_id: idle.session_id.to_string(),
            base_url: idle.base_url,
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("No idle session", 404)),
        )
            .into_response(),
    }
}

// ============================================================================
// Statement Endpoints
// ============================================================================

/// Request body for running a statement.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementRequest {
    /// Code to run.
    code: String,
    /// Session to run it on; an idle session is acquired when absent.
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    session_id: String,
    output: serde_json::Value,
}

/// Run a statement and wait for its output.
///
/// POST /v1/statements
async fn statement_handler(
    State(state): State<AppState>,
    Json(req): Json<StatementRequest>,
) -> impl IntoResponse {
    let result = match req.session_id.as_deref() {
        Some(raw) => {
            let session_id: SessionId = match raw.parse() {
                Ok(id) => id,
                Err(e) => {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(ErrorResponse::new(format!("Invalid session ID: {e}"), 400)),
                    )
                        .into_response();
                }
            };
            state
                .pool
                .submit(session_id, &req.code)
                .await
                .map(|output| (session_id, output))
        }
        None => state.pool.submit_any(&req.code).await,
    };

    match result {
        Ok((session_id, output)) => {
            tracing::info!(session_id = %session_id, "Ran statement via HTTP API");
            Json(StatementResponse {
                session_id: session_id.to_string(),
                output,
            })
            .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to run statement");
            error_response(&e)
        }
    }
}

// ============================================================================
// Router
// ============================================================================

fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(health_handler))
        // Sessions
        .route("/v1/sessions/idle", get(idle_session_handler))
        // Statements
        .route("/v1/statements", post(statement_handler))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,livy_pool=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Livy Pool");

    // Load configuration from environment
    let listen_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let config = PoolConfig::from_env();

    tracing::info!(
        base_url = %config.base_url(),
        kind = %config.kind,
        pool_size = config.pool_size,
        "Loaded pool configuration"
    );

    // Start the pool; its reconciler runs as a background task
    let pool = Arc::new(SessionPool::connect(config)?);

    let state = AppState {
        pool: Arc::clone(&pool),
    };
    let app = create_router(state);

    // Start server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.shutdown().await;
    tracing::info!("Livy Pool stopped");

    Ok(())
}

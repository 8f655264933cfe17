//! Typed access to the session control plane.
//!
//! This module provides the [`ControlPlane`] trait, the surface the pool
//! manager is written against, and [`HttpControlPlane`], which maps each
//! operation onto the control plane's REST API:
//!
//! | Operation          | Request                                   |
//! |--------------------|-------------------------------------------|
//! | `list_sessions`    | `GET  {base}/sessions`                    |
//! | `create_session`   | `POST {base}/sessions`                    |
//! | `get_session`      | `GET  {base}/sessions/{id}`               |
//! | `submit_statement` | `POST {base}/sessions/{id}/statements`    |
//! | `get_statement`    | `GET  {base}/sessions/{id}/statements/{n}`|

use std::collections::HashMap;

use async_trait::async_trait;
use livy_pool_core::{Session, SessionId, SessionKind, Statement, StatementId};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::http::{decode, HttpSettings, JsonHttpClient};

/// Sessions reported by one `list_sessions` call, keyed by id.
///
/// Treated as authoritative for a single reconciliation cycle only.
pub type RemoteSnapshot = HashMap<SessionId, Session>;

/// Request body for opening a new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    /// Interpreter kind.
    pub kind: SessionKind,
    /// Jar references to put on the session classpath.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jars: Vec<String>,
    /// File references to distribute to the session.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl CreateSessionRequest {
    /// A request for `kind` with no extra resources.
    #[must_use]
    pub const fn new(kind: SessionKind) -> Self {
        Self {
            kind,
            jars: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Attach jar references.
    #[must_use]
    pub fn with_jars(mut self, jars: Vec<String>) -> Self {
        self.jars = jars;
        self
    }

    /// Attach file references.
    #[must_use]
    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }
}

/// Request body for submitting a statement.
#[derive(Debug, Serialize)]
struct SubmitStatementRequest<'a> {
    code: &'a str,
}

/// Response of `GET /sessions`.
#[derive(Debug, Deserialize)]
struct SessionList {
    sessions: Vec<Session>,
}

/// Operations the pool needs from the control plane.
///
/// Implementations perform one round trip per call and never retry.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Base URL handed to callers alongside acquired sessions.
    fn base_url(&self) -> &str;

    /// Fetch every session the control plane knows about.
    ///
    /// Duplicate ids in the response overwrite earlier entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    async fn list_sessions(&self) -> Result<RemoteSnapshot>;

    /// Open a new session.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    async fn create_session(&self, request: &CreateSessionRequest) -> Result<Session>;

    /// Fetch one session.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the session does not exist.
    async fn get_session(&self, session_id: SessionId) -> Result<Session>;

    /// Submit code to run in a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    async fn submit_statement(&self, session_id: SessionId, code: &str) -> Result<Statement>;

    /// Fetch one statement.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the statement does not exist.
    async fn get_statement(
        &self,
        session_id: SessionId,
        statement_id: StatementId,
    ) -> Result<Statement>;
}

/// [`ControlPlane`] over the REST API.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    http: JsonHttpClient,
    base_url: String,
}

impl HttpControlPlane {
    /// Create a client for the control plane at `base_url` (e.g. `http://livy:8998`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: impl Into<String>, settings: &HttpSettings) -> Result<Self> {
        Ok(Self::with_client(JsonHttpClient::new(settings)?, base_url))
    }

    /// Create a client around a pre-configured transport.
    #[must_use]
    pub fn with_client(http: JsonHttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn sessions_url(&self) -> String {
        format!("{}/sessions", self.base_url)
    }

    fn session_url(&self, session_id: SessionId) -> String {
        format!("{}/sessions/{session_id}", self.base_url)
    }

    fn statements_url(&self, session_id: SessionId) -> String {
        format!("{}/sessions/{session_id}/statements", self.base_url)
    }

    fn statement_url(&self, session_id: SessionId, statement_id: StatementId) -> String {
        format!(
            "{}/sessions/{session_id}/statements/{statement_id}",
            self.base_url
        )
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn list_sessions(&self) -> Result<RemoteSnapshot> {
        let value = self.http.get(&self.sessions_url()).await?;
        let list: SessionList = decode(value, "session list")?;

        let snapshot: RemoteSnapshot = list
            .sessions
            .into_iter()
            .map(|session| (session.id, session))
            .collect();

        tracing::debug!(count = snapshot.len(), "Fetched remote sessions");
        Ok(snapshot)
    }

    async fn create_session(&self, request: &CreateSessionRequest) -> Result<Session> {
        let value = self.http.post(&self.sessions_url(), request).await?;
        let session: Session = decode(value, "session")?;
        tracing::debug!(
            session_id = %session.id,
            kind = %request.kind,
            state = %session.state,
            "Created session"
        );
        Ok(session)
    }

    async fn get_session(&self, session_id: SessionId) -> Result<Session> {
        let value = self.http.get(&self.session_url(session_id)).await?;
        decode(value, "session")
    }

    async fn submit_statement(&self, session_id: SessionId, code: &str) -> Result<Statement> {
        let value = self
            .http
            .post(
                &self.statements_url(session_id),
                &SubmitStatementRequest { code },
            )
            .await?;
        let statement: Statement = decode(value, "statement")?;
        tracing::debug!(
            session_id = %session_id,
            statement_id = %statement.id,
            "Submitted statement"
        );
        Ok(statement)
    }

    async fn get_statement(
        &self,
        session_id: SessionId,
        statement_id: StatementId,
    ) -> Result<Statement> {
        let value = self
            .http
            .get(&self.statement_url(session_id, statement_id))
            .await?;
        decode(value, "statement")
    }
}

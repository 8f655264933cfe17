//! In-memory control plane for tests.
//!
//! Sessions and statements live in a map guarded by a mutex. Start-up and
//! statement progress are scripted: each poll advances the object to the
//! next scripted state, so tests can drive exact state sequences without a
//! real server.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use livy_pool_core::{
    Session, SessionId, SessionState, Statement, StatementId, StatementOutput, StatementState,
};
use parking_lot::Mutex;

use crate::control_plane::{ControlPlane, CreateSessionRequest, RemoteSnapshot};
use crate::error::{ClientError, Result};

/// A control plane that stores everything in memory.
pub struct MockControlPlane {
    base_url: String,
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    next_session_id: u64,
    sessions: BTreeMap<SessionId, MockSession>,
    startup: Vec<SessionState>,
    created: Vec<CreateSessionRequest>,
    list_calls: usize,
    get_session_calls: usize,
    failing_lists: usize,
    failing_creates: usize,
    failing_session_polls: usize,
    next_statement_id: u64,
    scripts: VecDeque<StatementScript>,
    statements: HashMap<(SessionId, StatementId), MockStatement>,
    submitted: Vec<(SessionId, String)>,
    statement_polls: usize,
}

struct MockSession {
    session: Session,
    pending: VecDeque<SessionState>,
}

struct StatementScript {
    states: VecDeque<StatementState>,
    output: Option<StatementOutput>,
}

struct MockStatement {
    statement: Statement,
    pending: VecDeque<StatementState>,
    output: Option<StatementOutput>,
}

impl MockStatement {
    fn snapshot(&self) -> Statement {
        let mut statement = self.statement.clone();
        if statement.state == StatementState::Available {
            statement.output.clone_from(&self.output);
        }
        statement
    }
}

impl Default for MockControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl MockControlPlane {
    /// Create an empty mock control plane.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url("http://mock-livy:8998")
    }

    /// Create an empty mock reporting the given base URL.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            state: Mutex::new(MockState::default()),
        }
    }

    /// States every new session goes through: the first is returned by
    /// `create_session`, each later one by a `get_session` poll. Empty means
    /// sessions are created idle.
    pub fn set_startup(&self, states: Vec<SessionState>) {
        self.state.lock().startup = states;
    }

    /// Add or replace a session directly.
    pub fn insert_session(&self, session: Session) {
        let mut state = self.state.lock();
        state.next_session_id = state.next_session_id.max(session.id.get() + 1);
        state.sessions.insert(
            session.id,
            MockSession {
                session,
                pending: VecDeque::new(),
            },
        );
    }

    /// Change the state of an existing session.
    pub fn set_state(&self, session_id: SessionId, new_state: SessionState) {
        if let Some(entry) = self.state.lock().sessions.get_mut(&session_id) {
            entry.session.state = new_state;
            entry.pending.clear();
        }
    }

    /// Forget a session entirely.
    pub fn remove_session(&self, session_id: SessionId) {
        self.state.lock().sessions.remove(&session_id);
    }

    /// Make the next `count` calls to `list_sessions` fail.
    pub fn fail_next_lists(&self, count: usize) {
        self.state.lock().failing_lists = count;
    }

    /// Make the next `count` calls to `create_session` fail.
    pub fn fail_next_creates(&self, count: usize) {
        self.state.lock().failing_creates = count;
    }

    /// Make the next `count` calls to `get_session` fail.
    pub fn fail_next_session_polls(&self, count: usize) {
        self.state.lock().failing_session_polls = count;
    }

    /// Script the next submitted statement: it reports `states` in order and
    /// carries `output` once available.
    pub fn script_statement(&self, states: Vec<StatementState>, output: Option<StatementOutput>) {
        self.state.lock().scripts.push_back(StatementScript {
            states: states.into(),
            output,
        });
    }

    /// Snapshot of one session.
    #[must_use]
    pub fn session(&self, session_id: SessionId) -> Option<Session> {
        self.state
            .lock()
            .sessions
            .get(&session_id)
            .map(|entry| entry.session.clone())
    }

    /// Number of sessions currently known.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Number of successful `create_session` calls.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.state.lock().created.len()
    }

    /// Bodies of every successful `create_session` call.
    #[must_use]
    pub fn created_requests(&self) -> Vec<CreateSessionRequest> {
        self.state.lock().created.clone()
    }

    /// Number of `list_sessions` calls, failed ones included.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    /// Number of `get_session` calls.
    #[must_use]
    pub fn get_session_calls(&self) -> usize {
        self.state.lock().get_session_calls
    }

    /// Every `(session, code)` pair submitted.
    #[must_use]
    pub fn submitted(&self) -> Vec<(SessionId, String)> {
        self.state.lock().submitted.clone()
    }

    /// Number of `get_statement` calls.
    #[must_use]
    pub fn statement_polls(&self) -> usize {
        self.state.lock().statement_polls
    }
}

fn not_found(what: &str) -> ClientError {
    ClientError::Status {
        status: 404,
        body: format!("{what} not found"),
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn list_sessions(&self) -> Result<RemoteSnapshot> {
        let mut state = self.state.lock();
        state.list_calls += 1;
        if state.failing_lists > 0 {
            state.failing_lists -= 1;
            return Err(ClientError::Transport("mock: connection refused".to_string()));
        }
        Ok(state
            .sessions
            .iter()
            .map(|(id, entry)| (*id, entry.session.clone()))
            .collect())
    }

    async fn create_session(&self, request: &CreateSessionRequest) -> Result<Session> {
        let mut state = self.state.lock();
        if state.failing_creates > 0 {
            state.failing_creates -= 1;
            return Err(ClientError::Status {
                status: 500,
                body: "mock: session creation failed".to_string(),
            });
        }

        let id = SessionId::new(state.next_session_id);
        state.next_session_id += 1;

        let mut pending: VecDeque<SessionState> = state.startup.iter().copied().collect();
        let initial = pending.pop_front().unwrap_or(SessionState::Idle);
        let session = Session::new(id, Some(request.kind), initial);

        state.created.push(request.clone());
        state.sessions.insert(
            id,
            MockSession {
                session: session.clone(),
                pending,
            },
        );
        Ok(session)
    }

    async fn get_session(&self, session_id: SessionId) -> Result<Session> {
        let mut state = self.state.lock();
        state.get_session_calls += 1;
        if state.failing_session_polls > 0 {
            state.failing_session_polls -= 1;
            return Err(ClientError::Transport("mock: connection reset".to_string()));
        }
        let entry = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| not_found("session"))?;
        if let Some(next) = entry.pending.pop_front() {
            entry.session.state = next;
        }
        Ok(entry.session.clone())
    }

    async fn submit_statement(&self, session_id: SessionId, code: &str) -> Result<Statement> {
        let mut state = self.state.lock();
        if !state.sessions.contains_key(&session_id) {
            return Err(not_found("session"));
        }

        let id = StatementId::new(state.next_statement_id);
        state.next_statement_id += 1;

        let script = state.scripts.pop_front().unwrap_or_else(|| StatementScript {
            states: VecDeque::from([StatementState::Available]),
            output: Some(StatementOutput {
                status: Some("ok".to_string()),
                data: Some(serde_json::json!({"text/plain": "ok"})),
                ename: None,
                evalue: None,
            }),
        });
        let mut pending = script.states;
        let initial = pending.pop_front().unwrap_or(StatementState::Waiting);

        let mock = MockStatement {
            statement: Statement {
                id,
                state: initial,
                output: None,
            },
            pending,
            output: script.output,
        };
        let snapshot = mock.snapshot();

        state.submitted.push((session_id, code.to_string()));
        state.statements.insert((session_id, id), mock);
        Ok(snapshot)
    }

    async fn get_statement(
        &self,
        session_id: SessionId,
        statement_id: StatementId,
    ) -> Result<Statement> {
        let mut state = self.state.lock();
        state.statement_polls += 1;
        let entry = state
            .statements
            .get_mut(&(session_id, statement_id))
            .ok_or_else(|| not_found("statement"))?;
        if let Some(next) = entry.pending.pop_front() {
            entry.statement.state = next;
        }
        Ok(entry.snapshot())
    }
}

//! Pool configuration.
//!
//! Configuration is supplied once when the pool starts and is read-only
//! afterwards, so it is shared as a plain `Arc<PoolConfig>` with no locking.

use std::time::Duration;

use livy_pool_client::{CreateSessionRequest, HttpSettings};
use livy_pool_core::SessionKind;
use serde::Deserialize;

use crate::error::{PoolError, Result};

/// Configuration for a session pool.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Control-plane host.
    #[serde(default = "PoolConfig::default_host")]
    pub host: String,

    /// Control-plane port.
    #[serde(default = "PoolConfig::default_port")]
    pub port: u16,

    /// Number of live sessions to keep open.
    #[serde(default = "PoolConfig::default_pool_size")]
    pub pool_size: usize,

    /// Kind of session the pool serves.
    #[serde(default)]
    pub kind: SessionKind,

    /// Jar references attached to new sessions.
    #[serde(default)]
    pub jars: Vec<String>,

    /// File references attached to new sessions.
    #[serde(default)]
    pub files: Vec<String>,

    /// Value of the `X-Requested-By` header.
    #[serde(default = "PoolConfig::default_requested_by")]
    pub requested_by: String,

    /// Pause between the end of one reconciliation cycle and the start of the next.
    #[serde(default = "PoolConfig::default_reconcile_interval")]
    pub reconcile_interval_ms: u64,

    /// Pause between polls of a starting session or a running statement.
    #[serde(default = "PoolConfig::default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Upper bound on waiting for a new session to start. 0 disables the bound.
    #[serde(default = "PoolConfig::default_session_start_timeout")]
    pub session_start_timeout_seconds: u64,

    /// Upper bound on waiting for a statement to finish. 0 disables the bound.
    #[serde(default)]
    pub statement_timeout_seconds: u64,

    /// Timeout for a single HTTP request.
    #[serde(default = "PoolConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Timeout for establishing an HTTP connection.
    #[serde(default = "PoolConfig::default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

/// How often to poll and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Pause between polls.
    pub interval: Duration,
    /// Give up after this long; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl PollPolicy {
    /// Poll every `interval` with no upper bound.
    #[must_use]
    pub const fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
        }
    }

    /// Poll every `interval` for at most `timeout`.
    #[must_use]
    pub const fn bounded(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout: Some(timeout),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::unbounded(Duration::from_secs(1))
    }
}

impl PoolConfig {
    fn default_host() -> String {
        "localhost".to_string()
    }

    const fn default_port() -> u16 {
        8998
    }

    const fn default_pool_size() -> usize {
        2
    }

    fn default_requested_by() -> String {
        "user".to_string()
    }

    const fn default_reconcile_interval() -> u64 {
        2000
    }

    const fn default_poll_interval() -> u64 {
        1000
    }

    const fn default_session_start_timeout() -> u64 {
        300
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    const fn default_connect_timeout() -> u64 {
        5
    }

    /// Create a config for `host:port` with defaults for everything else.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `LIVY_HOST`: control-plane host
    /// - `LIVY_PORT`: control-plane port
    /// - `LIVY_SESSION_POOL_SIZE`: number of sessions to keep open
    /// - `LIVY_SESSION_KIND`: `spark`, `pyspark`, `pyspark3` or `sparkr`
    /// - `LIVY_JARS`: comma-separated jar references
    /// - `LIVY_FILES`: comma-separated file references
    /// - `LIVY_REQUESTED_BY`: value of the `X-Requested-By` header
    /// - `LIVY_RECONCILE_INTERVAL_MS`: pause between reconciliation cycles
    /// - `LIVY_POLL_INTERVAL_MS`: pause between polls
    /// - `LIVY_SESSION_START_TIMEOUT_SECONDS`: bound on session start-up (0 = none)
    /// - `LIVY_STATEMENT_TIMEOUT_SECONDS`: bound on statement execution (0 = none)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Values that fail to parse are logged and leave the default in place.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(key: &str, val: &str) -> Option<T> {
            let parsed = val.trim().parse().ok();
            if parsed.is_none() {
                tracing::warn!(key = key, value = val, "Ignoring unparseable configuration value");
            }
            parsed
        }

        let mut config = Self::default();

        if let Some(val) = lookup("LIVY_HOST") {
            config.host = val.trim().to_string();
        }
        if let Some(n) = lookup("LIVY_PORT").and_then(|v| parsed("LIVY_PORT", &v)) {
            config.port = n;
        }
        if let Some(n) = lookup("LIVY_SESSION_POOL_SIZE")
            .and_then(|v| parsed("LIVY_SESSION_POOL_SIZE", &v))
        {
            config.pool_size = n;
        }
        if let Some(kind) = lookup("LIVY_SESSION_KIND").and_then(|v| parsed("LIVY_SESSION_KIND", &v))
        {
            config.kind = kind;
        }
        if let Some(val) = lookup("LIVY_JARS") {
            config.jars = parse_resource_list(&val);
        }
        if let Some(val) = lookup("LIVY_FILES") {
            config.files = parse_resource_list(&val);
        }
        if let Some(val) = lookup("LIVY_REQUESTED_BY") {
            config.requested_by = val;
        }
        if let Some(n) = lookup("LIVY_RECONCILE_INTERVAL_MS")
            .and_then(|v| parsed("LIVY_RECONCILE_INTERVAL_MS", &v))
        {
            config.reconcile_interval_ms = n;
        }
        if let Some(n) = lookup("LIVY_POLL_INTERVAL_MS")
            .and_then(|v| parsed("LIVY_POLL_INTERVAL_MS", &v))
        {
            config.poll_interval_ms = n;
        }
        if let Some(n) = lookup("LIVY_SESSION_START_TIMEOUT_SECONDS")
            .and_then(|v| parsed("LIVY_SESSION_START_TIMEOUT_SECONDS", &v))
        {
            config.session_start_timeout_seconds = n;
        }
        if let Some(n) = lookup("LIVY_STATEMENT_TIMEOUT_SECONDS")
            .and_then(|v| parsed("LIVY_STATEMENT_TIMEOUT_SECONDS", &v))
        {
            config.statement_timeout_seconds = n;
        }

        config
    }

    /// Check the configuration before the pool starts.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Config` if the host is empty, or if the port, pool
    /// size or either interval is 0.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(PoolError::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(PoolError::Config("port must be non-zero".to_string()));
        }
        if self.pool_size == 0 {
            return Err(PoolError::Config(
                "pool_size must be a positive integer".to_string(),
            ));
        }
        if self.reconcile_interval_ms == 0 {
            return Err(PoolError::Config(
                "reconcile_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(PoolError::Config(
                "poll_interval_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL of the control plane.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host.trim(), self.port)
    }

    /// Body sent when opening a new session.
    #[must_use]
    pub fn create_request(&self) -> CreateSessionRequest {
        CreateSessionRequest::new(self.kind)
            .with_jars(self.jars.clone())
            .with_files(self.files.clone())
    }

    /// Transport settings for the HTTP client.
    #[must_use]
    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            requested_by: self.requested_by.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            connect_timeout: Duration::from_secs(self.connect_timeout_seconds),
        }
    }

    /// Get the reconciliation interval as a `Duration`.
    #[must_use]
    pub const fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    /// Polling behaviour while a new session starts.
    #[must_use]
    pub const fn startup_policy(&self) -> PollPolicy {
        policy(self.poll_interval_ms, self.session_start_timeout_seconds)
    }

    /// Polling behaviour while a statement runs.
    #[must_use]
    pub const fn statement_policy(&self) -> PollPolicy {
        policy(self.poll_interval_ms, self.statement_timeout_seconds)
    }
}

const fn policy(interval_ms: u64, timeout_seconds: u64) -> PollPolicy {
    let interval = Duration::from_millis(interval_ms);
    if timeout_seconds == 0 {
        PollPolicy::unbounded(interval)
    } else {
        PollPolicy::bounded(interval, Duration::from_secs(timeout_seconds))
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            pool_size: Self::default_pool_size(),
            kind: SessionKind::default(),
            jars: Vec::new(),
            files: Vec::new(),
            requested_by: Self::default_requested_by(),
            reconcile_interval_ms: Self::default_reconcile_interval(),
            poll_interval_ms: Self::default_poll_interval(),
            session_start_timeout_seconds: Self::default_session_start_timeout(),
            statement_timeout_seconds: 0,
            request_timeout_seconds: Self::default_request_timeout(),
            connect_timeout_seconds: Self::default_connect_timeout(),
        }
    }
}

/// Split a comma-separated resource list, dropping blank entries.
#[must_use]
pub fn parse_resource_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.base_url(), "http://localhost:8998");
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.kind, SessionKind::Spark);
        assert_eq!(config.reconcile_interval(), Duration::from_secs(2));
        assert_eq!(
            config.startup_policy(),
            PollPolicy::bounded(Duration::from_secs(1), Duration::from_secs(300))
        );
        assert_eq!(
            config.statement_policy(),
            PollPolicy::unbounded(Duration::from_secs(1))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn resource_lists() {
        assert_eq!(
            parse_resource_list(" a.jar, ,b.jar,, c.jar "),
            vec!["a.jar", "b.jar", "c.jar"]
        );
        assert!(parse_resource_list("").is_empty());
        assert!(parse_resource_list(" , ").is_empty());
    }

    #[test]
    fn from_lookup_reads_every_key() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("LIVY_HOST", "livy.internal"),
            ("LIVY_PORT", "8999"),
            ("LIVY_SESSION_POOL_SIZE", "4"),
            ("LIVY_SESSION_KIND", "PySpark"),
            ("LIVY_JARS", "hdfs:///a.jar,hdfs:///b.jar"),
            ("LIVY_FILES", "hdfs:///conf.json"),
            ("LIVY_REQUESTED_BY", "nightly-etl"),
            ("LIVY_RECONCILE_INTERVAL_MS", "500"),
            ("LIVY_POLL_INTERVAL_MS", "250"),
            ("LIVY_SESSION_START_TIMEOUT_SECONDS", "0"),
            ("LIVY_STATEMENT_TIMEOUT_SECONDS", "60"),
        ]);

        let config = PoolConfig::from_lookup(|k| vars.get(k).map(ToString::to_string));

        assert_eq!(config.base_url(), "http://livy.internal:8999");
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.kind, SessionKind::PySpark);
        assert_eq!(config.jars, vec!["hdfs:///a.jar", "hdfs:///b.jar"]);
        assert_eq!(config.files, vec!["hdfs:///conf.json"]);
        assert_eq!(config.requested_by, "nightly-etl");
        assert_eq!(config.reconcile_interval(), Duration::from_millis(500));
        assert_eq!(
            config.startup_policy(),
            PollPolicy::unbounded(Duration::from_millis(250))
        );
        assert_eq!(
            config.statement_policy(),
            PollPolicy::bounded(Duration::from_millis(250), Duration::from_secs(60))
        );
    }

    #[test]
    fn unparseable_values_keep_defaults() {
        let config = PoolConfig::from_lookup(|k| match k {
            "LIVY_PORT" => Some("not-a-port".to_string()),
            "LIVY_SESSION_KIND" => Some("sql".to_string()),
            _ => None,
        });
        assert_eq!(config.port, 8998);
        assert_eq!(config.kind, SessionKind::Spark);
    }

    #[test]
    fn validation() {
        let mut config = PoolConfig::new("livy", 8998);
        assert!(config.validate().is_ok());

        config.pool_size = 0;
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));

        let config = PoolConfig::new("  ", 8998);
        assert!(config.validate().is_err());

        let config = PoolConfig::new("livy", 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let config = PoolConfig {
            reconcile_interval_ms: 0,
            ..PoolConfig::default()
        };
        assert!(matches!(config.validate(), Err(PoolError::Config(m)) if m.contains("reconcile")));

        let config = PoolConfig {
            poll_interval_ms: 0,
            ..PoolConfig::default()
        };
        assert!(matches!(config.validate(), Err(PoolError::Config(m)) if m.contains("poll")));
    }

    #[test]
    fn create_request_carries_resources() {
        let config = PoolConfig {
            kind: SessionKind::SparkR,
            jars: vec!["a.jar".to_string()],
            ..PoolConfig::default()
        };
        let request = config.create_request();
        assert_eq!(request.kind, SessionKind::SparkR);
        assert_eq!(request.jars, vec!["a.jar"]);
        assert!(request.files.is_empty());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: PoolConfig =
            serde_json::from_str(r#"{"host": "livy", "kind": "pyspark3", "pool_size": 3}"#)
                .unwrap();
        assert_eq!(config.port, 8998);
        assert_eq!(config.kind, SessionKind::PySpark3);
        assert_eq!(config.pool_size, 3);
        assert_eq!(config.requested_by, "user");
    }
}

//! Service configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::logging::LogFormat;
use crate::query_cache::CacheSettings;
use crate::retention::{CleanupSettings, RetentionPolicy};
use crate::retry::{Delay, RetryPolicy};
use crate::sync::SyncSettings;
use crate::ServiceError;

/// Configuration for the sync, retention and cache services.
///
/// Can be loaded from a TOML file via [`ServicesConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Base URL of the upstream node-data provider.
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,

    /// Bearer token sent to the upstream provider, if it requires one.
    #[serde(default)]
    pub upstream_api_key: Option<String>,

    /// Per-request timeout for upstream calls.
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    /// Data directory for the LMDB environment.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size in MiB.
    #[serde(default = "default_map_size_mb")]
    pub map_size_mb: usize,

    /// Seconds between sync cycles.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Run one sync cycle as soon as periodic sync starts.
    #[serde(default = "default_true")]
    pub sync_on_start: bool,

    /// Seconds between retention cycles.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Run one retention cycle as soon as periodic cleanup starts.
    #[serde(default)]
    pub cleanup_on_start: bool,

    #[serde(default = "default_node_retention_days")]
    pub node_retention_days: u64,

    #[serde(default = "default_peer_retention_days")]
    pub peer_retention_days: u64,

    #[serde(default = "default_history_retention_days")]
    pub history_retention_days: u64,

    /// Freshness window for cached reads.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Freshness window for cached "node not found" answers. 0 disables them.
    #[serde(default = "default_cache_negative_ttl_secs")]
    pub cache_negative_ttl_secs: u64,

    /// Maximum peers-of-peers rows returned per node.
    #[serde(default = "default_peers_of_peers_limit")]
    pub peers_of_peers_limit: usize,

    /// Attempts per sync phase, including the first.
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Fixed delay between attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Abandon a single attempt after this many seconds.
    #[serde(default)]
    pub retry_attempt_timeout_secs: Option<u64>,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to periodically log the Prometheus metrics snapshot.
    #[serde(default)]
    pub enable_metrics: bool,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_upstream_url() -> String {
    "http://127.0.0.1:8080/api".to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    30
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./nodegraph_data")
}

fn default_map_size_mb() -> usize {
    1024
}

fn default_sync_interval_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_cleanup_interval_secs() -> u64 {
    86_400
}

fn default_node_retention_days() -> u64 {
    30
}

fn default_peer_retention_days() -> u64 {
    7
}

fn default_history_retention_days() -> u64 {
    90
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_negative_ttl_secs() -> u64 {
    30
}

fn default_peers_of_peers_limit() -> usize {
    50
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl ServicesConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, ServiceError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ServiceError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ServiceError> {
        toml::from_str(s).map_err(|e| ServiceError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ServiceError> {
        toml::to_string_pretty(self).map_err(|e| ServiceError::Config(e.to_string()))
    }

    /// Reject values that would stall or disable a service.
    pub fn validate(&self) -> Result<(), ServiceError> {
        let positive = [
            ("sync_interval_secs", self.sync_interval_secs),
            ("cleanup_interval_secs", self.cleanup_interval_secs),
            ("node_retention_days", self.node_retention_days),
            ("peer_retention_days", self.peer_retention_days),
            ("history_retention_days", self.history_retention_days),
            ("cache_ttl_secs", self.cache_ttl_secs),
            ("retry_max_attempts", u64::from(self.retry_max_attempts)),
            ("peers_of_peers_limit", self.peers_of_peers_limit as u64),
            ("upstream_timeout_secs", self.upstream_timeout_secs),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(ServiceError::Config(format!("{name} must be greater than zero")));
        }
        if self.retry_attempt_timeout_secs == Some(0) {
            return Err(ServiceError::Config(
                "retry_attempt_timeout_secs must be greater than zero when set".into(),
            ));
        }
        self.log_format()?;
        Ok(())
    }

    pub fn log_format(&self) -> Result<LogFormat, ServiceError> {
        self.log_format.parse()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            delay: Delay::Fixed(Duration::from_millis(self.retry_delay_ms)),
            attempt_timeout: self.retry_attempt_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            interval: Duration::from_secs(self.sync_interval_secs),
            run_on_start: self.sync_on_start,
            retry: self.retry_policy(),
        }
    }

    pub fn cleanup_settings(&self) -> CleanupSettings {
        CleanupSettings {
            interval: Duration::from_secs(self.cleanup_interval_secs),
            run_on_start: self.cleanup_on_start,
            policy: RetentionPolicy {
                node_days: self.node_retention_days,
                peer_days: self.peer_retention_days,
                history_days: self.history_retention_days,
            },
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(self.cache_ttl_secs),
            negative_ttl: Duration::from_secs(self.cache_negative_ttl_secs),
            peers_of_peers_limit: self.peers_of_peers_limit,
        }
    }

    /// LMDB map size in bytes.
    pub fn map_size_bytes(&self) -> usize {
        self.map_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            upstream_url: default_upstream_url(),
            upstream_api_key: None,
            upstream_timeout_secs: default_upstream_timeout_secs(),
            data_dir: default_data_dir(),
            map_size_mb: default_map_size_mb(),
            sync_interval_secs: default_sync_interval_secs(),
            sync_on_start: default_true(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            cleanup_on_start: false,
            node_retention_days: default_node_retention_days(),
            peer_retention_days: default_peer_retention_days(),
            history_retention_days: default_history_retention_days(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_negative_ttl_secs: default_cache_negative_ttl_secs(),
            peers_of_peers_limit: default_peers_of_peers_limit(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_attempt_timeout_secs: None,
            log_format: default_log_format(),
            log_level: default_log_level(),
            enable_metrics: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = ServicesConfig::default();
        let toml_str = config.to_toml_string().expect("should serialize");
        let parsed = ServicesConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.sync_interval_secs, config.sync_interval_secs);
        assert_eq!(parsed.peers_of_peers_limit, config.peers_of_peers_limit);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = ServicesConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.sync_interval_secs, 300);
        assert_eq!(config.cleanup_interval_secs, 86_400);
        assert_eq!(config.node_retention_days, 30);
        assert_eq!(config.peer_retention_days, 7);
        assert_eq!(config.history_retention_days, 90);
        assert_eq!(config.cache_ttl_secs, 300);
        assert_eq!(config.retry_max_attempts, 3);
        assert_eq!(config.retry_delay_ms, 1000);
        assert!(config.sync_on_start);
        assert!(!config.cleanup_on_start);
        assert_eq!(config.log_format, "human");
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            upstream_url = "https://nodes.example.com"
            peer_retention_days = 14
            retry_attempt_timeout_secs = 20
        "#;
        let config = ServicesConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.upstream_url, "https://nodes.example.com");
        assert_eq!(config.peer_retention_days, 14);
        assert_eq!(
            config.retry_policy().attempt_timeout,
            Some(Duration::from_secs(20))
        );
        assert_eq!(config.node_retention_days, 30); // default
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = ServicesConfig {
            sync_interval_secs: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sync_interval_secs"));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let config = ServicesConfig {
            log_format: "xml".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ServiceError::Config(_))));
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = ServicesConfig::from_toml_file("/nonexistent/nodegraph.toml");
        assert!(matches!(result, Err(ServiceError::Config(_))));
    }

    #[test]
    fn loads_from_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodegraph.toml");
        std::fs::write(&path, "cache_ttl_secs = 60\n").unwrap();
        let config = ServicesConfig::from_toml_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.cache_settings().ttl, Duration::from_secs(60));
    }
}

//! Configuration management
//!
//! This module handles loading and parsing configuration for the Agora backend.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Moderation pipeline configuration
    #[serde(default)]
    pub moderation: ModerationConfig,
    /// Toxicity analyzer configuration
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    /// Notification delivery configuration
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path or `sqlite:` URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum pool connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "data/agora.db".to_string()
}

fn default_max_connections() -> u32 {
    20
}

/// Thresholds and time windows of the moderation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Toxicity score at or above which content is rejected outright
    #[serde(default = "default_reject_threshold")]
    pub reject_threshold: f64,
    /// Toxicity score at or above which content goes to human review
    #[serde(default = "default_flag_threshold")]
    pub flag_threshold: f64,
    /// Number of reports that pulls a comment into review
    #[serde(default = "default_report_hide_threshold")]
    pub report_hide_threshold: i64,
    /// Reputation at which an author counts as trusted
    #[serde(default = "default_trusted_reputation")]
    pub trusted_reputation: i64,
    /// Hours a pending comment waits before the sweep auto-approves it
    #[serde(default = "default_pending_expiry_hours")]
    pub pending_expiry_hours: i64,
    /// Minutes before an unanalyzed pending comment is re-analyzed by the sweep
    #[serde(default = "default_reanalyze_after_minutes")]
    pub reanalyze_after_minutes: i64,
    /// Days a pending report is kept before it is archived
    #[serde(default = "default_report_archive_days")]
    pub report_archive_days: i64,
    /// Days a pending appeal is kept before it expires
    #[serde(default = "default_appeal_expiry_days")]
    pub appeal_expiry_days: i64,
    /// Maximum number of comments in one bulk request
    #[serde(default = "default_max_bulk_items")]
    pub max_bulk_items: usize,
    /// Capacity of the background analysis queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Seconds between cleanup sweeps (0 disables the loop)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Shared secret accepted in `x-cron-secret` for triggering the sweep
    #[serde(default)]
    pub cron_secret: Option<String>,
    /// Comments a user may post per minute
    #[serde(default = "default_comments_per_minute")]
    pub comments_per_minute: usize,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            reject_threshold: default_reject_threshold(),
            flag_threshold: default_flag_threshold(),
            report_hide_threshold: default_report_hide_threshold(),
            trusted_reputation: default_trusted_reputation(),
            pending_expiry_hours: default_pending_expiry_hours(),
            reanalyze_after_minutes: default_reanalyze_after_minutes(),
            report_archive_days: default_report_archive_days(),
            appeal_expiry_days: default_appeal_expiry_days(),
            max_bulk_items: default_max_bulk_items(),
            queue_capacity: default_queue_capacity(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            cron_secret: None,
            comments_per_minute: default_comments_per_minute(),
        }
    }
}

fn default_reject_threshold() -> f64 {
    0.85
}

fn default_flag_threshold() -> f64 {
    0.6
}

fn default_report_hide_threshold() -> i64 {
    3
}

fn default_trusted_reputation() -> i64 {
    50
}

fn default_pending_expiry_hours() -> i64 {
    72
}

fn default_reanalyze_after_minutes() -> i64 {
    5
}

fn default_report_archive_days() -> i64 {
    30
}

fn default_appeal_expiry_days() -> i64 {
    14
}

fn default_max_bulk_items() -> usize {
    100
}

fn default_queue_capacity() -> usize {
    256
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

fn default_comments_per_minute() -> usize {
    10
}

/// Which toxicity analyzer backs the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerProvider {
    /// Local regex heuristics (default)
    #[default]
    Heuristic,
    /// Remote classification service, heuristics as fallback
    Http,
}

/// Toxicity analyzer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub provider: AnalyzerProvider,
    /// Endpoint of the remote analyzer
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bearer key for the remote analyzer
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_analyzer_timeout")]
    pub timeout_secs: u64,
    /// Maximum cached analyses
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
    /// Cached analysis lifetime in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            provider: AnalyzerProvider::default(),
            endpoint: None,
            api_key: None,
            timeout_secs: default_analyzer_timeout(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_seconds: default_cache_ttl(),
        }
    }
}

fn default_analyzer_timeout() -> u64 {
    10
}

fn default_cache_capacity() -> u64 {
    10_000
}

fn default_cache_ttl() -> u64 {
    3600
}

/// Notification delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Deliver high/urgent notifications by email as well
    #[serde(default)]
    pub email_enabled: bool,
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    /// Sender address
    #[serde(default = "default_smtp_from")]
    pub from: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            email_enabled: false,
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            from: default_smtp_from(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_from() -> String {
    "Agora <noreply@agora.local>".to_string()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern `AGORA_<SECTION>_<KEY>`:
    /// - AGORA_SERVER_HOST, AGORA_SERVER_PORT, AGORA_SERVER_CORS_ORIGIN
    /// - AGORA_DATABASE_URL
    /// - AGORA_MODERATION_REJECT_THRESHOLD, AGORA_MODERATION_FLAG_THRESHOLD
    /// - AGORA_MODERATION_CRON_SECRET
    /// - AGORA_ANALYZER_PROVIDER, AGORA_ANALYZER_ENDPOINT, AGORA_ANALYZER_API_KEY
    /// - AGORA_NOTIFICATIONS_EMAIL_ENABLED, AGORA_NOTIFICATIONS_SMTP_HOST
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.moderation;
        if !(0.0..=1.0).contains(&m.reject_threshold) || !(0.0..=1.0).contains(&m.flag_threshold) {
            return Err(ConfigError::ValidationError(
                "moderation thresholds must be between 0 and 1".to_string(),
            ));
        }
        if m.flag_threshold >= m.reject_threshold {
            return Err(ConfigError::ValidationError(format!(
                "flag_threshold ({}) must be below reject_threshold ({})",
                m.flag_threshold, m.reject_threshold
            )));
        }
        if m.report_hide_threshold < 1 {
            return Err(ConfigError::ValidationError(
                "report_hide_threshold must be at least 1".to_string(),
            ));
        }
        if m.max_bulk_items == 0 || m.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "max_bulk_items and queue_capacity must be positive".to_string(),
            ));
        }
        if self.analyzer.provider == AnalyzerProvider::Http && self.analyzer.endpoint.is_none() {
            return Err(ConfigError::ValidationError(
                "analyzer.endpoint is required for the http provider".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("AGORA_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("AGORA_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("AGORA_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        // Database configuration
        if let Ok(url) = std::env::var("AGORA_DATABASE_URL") {
            self.database.url = url;
        }

        // Moderation configuration
        if let Ok(v) = std::env::var("AGORA_MODERATION_REJECT_THRESHOLD") {
            if let Ok(v) = v.parse::<f64>() {
                self.moderation.reject_threshold = v;
            }
        }
        if let Ok(v) = std::env::var("AGORA_MODERATION_FLAG_THRESHOLD") {
            if let Ok(v) = v.parse::<f64>() {
                self.moderation.flag_threshold = v;
            }
        }
        if let Ok(v) = std::env::var("AGORA_MODERATION_REPORT_HIDE_THRESHOLD") {
            if let Ok(v) = v.parse::<i64>() {
                self.moderation.report_hide_threshold = v;
            }
        }
        if let Ok(secret) = std::env::var("AGORA_MODERATION_CRON_SECRET") {
            self.moderation.cron_secret = Some(secret);
        }

        // Analyzer configuration
        if let Ok(provider) = std::env::var("AGORA_ANALYZER_PROVIDER") {
            match provider.to_lowercase().as_str() {
                "heuristic" => self.analyzer.provider = AnalyzerProvider::Heuristic,
                "http" => self.analyzer.provider = AnalyzerProvider::Http,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(endpoint) = std::env::var("AGORA_ANALYZER_ENDPOINT") {
            self.analyzer.endpoint = Some(endpoint);
        }
        if let Ok(key) = std::env::var("AGORA_ANALYZER_API_KEY") {
            self.analyzer.api_key = Some(key);
        }

        // Notification configuration
        if let Ok(v) = std::env::var("AGORA_NOTIFICATIONS_EMAIL_ENABLED") {
            if let Ok(v) = v.parse::<bool>() {
                self.notifications.email_enabled = v;
            }
        }
        if let Ok(host) = std::env::var("AGORA_NOTIFICATIONS_SMTP_HOST") {
            self.notifications.smtp_host = Some(host);
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = std::path::Path::new("nonexistent_agora_config.yml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.url, "data/agora.db");
        assert_eq!(config.moderation.report_hide_threshold, 3);
        assert_eq!(config.moderation.max_bulk_items, 100);
        assert_eq!(config.analyzer.provider, AnalyzerProvider::Heuristic);
        assert!(!config.notifications.email_enabled);
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "moderation:\n  report_hide_threshold: 5\n").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.moderation.report_hide_threshold, 5);
        assert_eq!(config.moderation.reject_threshold, 0.85);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"
server:
  host: "127.0.0.1"
  port: 9000
database:
  url: "sqlite:test.db"
moderation:
  reject_threshold: 0.9
  flag_threshold: 0.5
  cron_secret: "s3cret"
analyzer:
  provider: http
  endpoint: "http://classifier.local/v1/score"
  timeout_secs: 3
notifications:
  email_enabled: true
  smtp_host: "smtp.local"
"#).unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.url, "sqlite:test.db");
        assert_eq!(config.moderation.reject_threshold, 0.9);
        assert_eq!(config.moderation.flag_threshold, 0.5);
        assert_eq!(config.moderation.cron_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.analyzer.provider, AnalyzerProvider::Http);
        assert_eq!(config.analyzer.timeout_secs, 3);
        assert!(config.notifications.email_enabled);
        assert_eq!(config.notifications.smtp_port, 587);
    }

    #[test]
    fn test_load_invalid_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: not_a_number\n").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "moderation:\n  reject_threshold: 0.4\n  flag_threshold: 0.7\n").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("flag_threshold"));
    }

    #[test]
    fn test_http_provider_requires_endpoint() {
        let mut config = Config::default();
        config.analyzer.provider = AnalyzerProvider::Http;
        assert!(config.validate().is_err());

        config.analyzer.endpoint = Some("http://localhost:9999".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let _guard = lock_env();

        std::env::set_var("AGORA_SERVER_PORT", "7070");
        std::env::set_var("AGORA_MODERATION_CRON_SECRET", "from-env");
        std::env::set_var("AGORA_ANALYZER_PROVIDER", "bogus");

        let config = Config::load_with_env(std::path::Path::new("nonexistent_agora_config.yml")).unwrap();

        assert_eq!(config.server.port, 7070);
        assert_eq!(config.moderation.cron_secret.as_deref(), Some("from-env"));
        // Invalid provider value is ignored
        assert_eq!(config.analyzer.provider, AnalyzerProvider::Heuristic);

        std::env::remove_var("AGORA_SERVER_PORT");
        std::env::remove_var("AGORA_MODERATION_CRON_SECRET");
        std::env::remove_var("AGORA_ANALYZER_PROVIDER");
    }

    #[test]
    fn test_env_override_invalid_port_ignored() {
        let _guard = lock_env();

        std::env::set_var("AGORA_SERVER_PORT", "not-a-port");
        let config = Config::load_with_env(std::path::Path::new("nonexistent_agora_config.yml")).unwrap();
        assert_eq!(config.server.port, 8080);
        std::env::remove_var("AGORA_SERVER_PORT");
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        /// Serializing a valid config to YAML and loading it back yields the same values.
        #[test]
        fn config_yaml_roundtrip(
            port in 1u16..=65535,
            flag in 0.0f64..0.5,
            reject in 0.5f64..=1.0,
            hide in 1i64..20,
        ) {
            let mut config = Config::default();
            config.server.port = port;
            config.moderation.flag_threshold = flag;
            config.moderation.reject_threshold = reject;
            config.moderation.report_hide_threshold = hide;

            let yaml = serde_yaml::to_string(&config).unwrap();
            let parsed: Config = serde_yaml::from_str(&yaml).unwrap();

            prop_assert_eq!(parsed.server.port, port);
            prop_assert_eq!(parsed.moderation.flag_threshold, flag);
            prop_assert_eq!(parsed.moderation.reject_threshold, reject);
            prop_assert_eq!(parsed.moderation.report_hide_threshold, hide);
            prop_assert!(parsed.validate().is_ok());
        }
    }
}

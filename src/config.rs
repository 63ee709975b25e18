//! Configuration file parser for ~/.config/gleaner/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde, but logged as a warning since they are
//! usually typos.
use crate::feed::{HttpConfig, DEFAULT_USER_AGENT};
use crate::ingest::{IngestConfig, RefreshStrategy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Defaults to `gleaner.db` next to the config file.
    pub database_path: Option<PathBuf>,

    /// User-Agent sent with every request.
    pub user_agent: String,

    /// Per-request timeout in seconds (connect, headers and body).
    pub request_timeout_secs: u64,

    /// Sites fetched concurrently during batch ingestion and refresh.
    pub max_concurrent_fetches: usize,

    /// Largest page or feed body accepted, in bytes.
    pub max_feed_bytes: usize,

    /// `rebuild` (default) or `merge`.
    pub refresh_strategy: RefreshStrategy,

    /// Allow fetching loopback and private-network hosts.
    pub allow_private_hosts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 10,
            max_concurrent_fetches: 4,
            max_feed_bytes: 10 * 1024 * 1024,
            refresh_strategy: RefreshStrategy::Rebuild,
            allow_private_hosts: false,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 7] = [
        "database_path",
        "user_agent",
        "request_timeout_secs",
        "max_concurrent_fetches",
        "max_feed_bytes",
        "refresh_strategy",
        "allow_private_hosts",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check size before reading so a huge or corrupted file is never loaded
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            refresh_strategy = ?config.refresh_strategy,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Settings for the HTTP client.
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            max_body_bytes: self.max_feed_bytes,
            allow_private_hosts: self.allow_private_hosts,
        }
    }

    /// Settings for the ingestion coordinator.
    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            max_concurrent_fetches: self.max_concurrent_fetches.max(1),
            refresh_strategy: self.refresh_strategy,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, content: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("gleaner_config_test_{}", name));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database_path, None);
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.max_concurrent_fetches, 4);
        assert_eq!(config.max_feed_bytes, 10 * 1024 * 1024);
        assert_eq!(config.refresh_strategy, RefreshStrategy::Rebuild);
        assert!(!config.allow_private_hosts);
        assert!(config.user_agent.starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/gleaner_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (dir, path) = write_config("whitespace", "   \n  \n  ");

        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (dir, path) = write_config("partial", "refresh_strategy = \"merge\"\n");

        let config = Config::load(&path).unwrap();
        assert_eq!(config.refresh_strategy, RefreshStrategy::Merge);
        assert_eq!(config.request_timeout_secs, 10); // default

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let content = r#"
database_path = "/var/lib/gleaner/posts.db"
user_agent = "gleaner-test/1.0"
request_timeout_secs = 3
max_concurrent_fetches = 8
max_feed_bytes = 2048
refresh_strategy = "merge"
allow_private_hosts = true
"#;
        let (dir, path) = write_config("full", content);

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.database_path.as_deref(),
            Some(Path::new("/var/lib/gleaner/posts.db"))
        );

        let http = config.http_config();
        assert_eq!(http.user_agent, "gleaner-test/1.0");
        assert_eq!(http.timeout, Duration::from_secs(3));
        assert_eq!(http.max_body_bytes, 2048);
        assert!(http.allow_private_hosts);

        let ingest = config.ingest_config();
        assert_eq!(ingest.max_concurrent_fetches, 8);
        assert_eq!(ingest.refresh_strategy, RefreshStrategy::Merge);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_zero_limits_are_clamped() {
        let (dir, path) = write_config("zero", "request_timeout_secs = 0\nmax_concurrent_fetches = 0\n");

        let config = Config::load(&path).unwrap();
        assert_eq!(config.http_config().timeout, Duration::from_secs(1));
        assert_eq!(config.ingest_config().max_concurrent_fetches, 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, path) = write_config("invalid", "this is not [valid toml");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_strategy_returns_error() {
        let (dir, path) = write_config("strategy", "refresh_strategy = \"sometimes\"\n");

        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let content = r#"
max_concurrent_fetches = 2
totally_fake_key = "should not fail"
"#;
        let (dir, path) = write_config("unknown", content);

        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_concurrent_fetches, 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_config("too_large", &"a".repeat(1_048_577));

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }
}

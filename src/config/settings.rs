//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Where the inference / training service lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// API root, e.g. `http://localhost:8000/api`.  Endpoint paths such as
    /// `evaluate/infer` are appended to it.
    pub base_url: String,
    /// Per-request timeout.  `None` leaves timing out to the service, which
    /// matters for first inferences that load a model.
    pub request_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".into(),
            request_timeout_secs: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ChannelConfig
// ---------------------------------------------------------------------------

/// Exponential backoff for re-opening the push stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Reconnect attempts after the first loss before staying on polling.
    pub max_attempts: usize,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 5,
        }
    }
}

/// Settings for the realtime status channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Polling cadence once the push stream is gone.  The service pushes
    /// every 2 s, so polling at the same rate keeps the view equally fresh.
    pub poll_interval_secs: u64,
    /// `None` keeps the baseline behaviour: after a push failure the channel
    /// polls and never re-opens the stream.
    pub reconnect: Option<ReconnectPolicy>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            reconnect: None,
        }
    }
}

impl ChannelConfig {
    /// Poll interval, never shorter than 100 ms.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs).max(Duration::from_millis(100))
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use whisper_lab::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Service connection settings.
    pub server: ServerConfig,
    /// Push / poll settings for pipeline status.
    pub channel: ChannelConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig {
            server: ServerConfig {
                base_url: "http://gpu-box:8000/api".into(),
                request_timeout_secs: Some(120),
            },
            channel: ChannelConfig {
                poll_interval_secs: 5,
                reconnect: Some(ReconnectPolicy::default()),
            },
        };
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");
        assert_eq!(original, loaded);
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.server.base_url, "http://localhost:8000/api");
        assert_eq!(config.server.request_timeout_secs, None);
        assert_eq!(config.channel.poll_interval_secs, 2);
        assert!(config.channel.reconnect.is_none());
    }

    #[test]
    fn partial_file_fills_missing_sections() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[server]\nbase_url = \"http://x:1/api\"\n").unwrap();

        let config = AppConfig::load_from(&path).expect("load");
        assert_eq!(config.server.base_url, "http://x:1/api");
        assert_eq!(config.channel, ChannelConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[server\nbase_url = ").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("deeper").join("settings.toml");
        AppConfig::default().save_to(&path).expect("save");
        assert!(path.exists());
    }

    #[test]
    fn poll_interval_has_a_floor() {
        let cfg = ChannelConfig {
            poll_interval_secs: 0,
            reconnect: None,
        };
        assert_eq!(cfg.poll_interval(), Duration::from_millis(100));
    }
}

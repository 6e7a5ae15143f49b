//! Configuration for weave clients.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $WEAVE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/weave/config.toml
//!   3. ~/.config/weave/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaveConfig {
    pub gateway: GatewayConfig,
    pub upload: UploadSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL; `/tx` and `/chunk` are appended.
    pub url: String,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// Window after a failed request before the next attempt.
    pub error_delay_ms: u64,
    /// Fraction of the window removed at random, 0.0..=1.0.
    pub max_jitter: f64,
    /// Consecutive failures before the sequential uploader gives up.
    pub max_consecutive_errors: u32,
    /// Payloads of at most this many chunks are posted inline with the tx.
    pub max_chunks_in_body: usize,
    /// Workers used by the concurrent driver.
    pub concurrency: usize,
    /// Concurrent driver: pause before retrying a failed chunk.
    pub retry_delay_ms: u64,
    /// Concurrent driver: pause after HTTP 429.
    pub rate_limited_delay_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: "https://arweave.net".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            error_delay_ms: 40_000,
            max_jitter: 0.3,
            // ~an hour of 40s windows
            max_consecutive_errors: 100,
            max_chunks_in_body: 1,
            concurrency: 50,
            retry_delay_ms: 200,
            rate_limited_delay_ms: 1_000,
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl UploadSettings {
    pub fn error_delay(&self) -> Duration {
        Duration::from_millis(self.error_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn rate_limited_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limited_delay_ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("weave")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid {0}: {1}")]
    Invalid(&'static str, String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl WeaveConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            WeaveConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the uploader cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let jitter = self.upload.max_jitter;
        if !jitter.is_finite() || !(0.0..=1.0).contains(&jitter) {
            return Err(ConfigError::Invalid(
                "upload.max_jitter",
                format!("{jitter} is not within 0.0..=1.0"),
            ));
        }
        Ok(())
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("WEAVE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&WeaveConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply WEAVE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("WEAVE_GATEWAY__URL") {
            self.gateway.url = v;
        }
        if let Some(p) =
            lookup("WEAVE_GATEWAY__REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok())
        {
            self.gateway.request_timeout_secs = p;
        }
        if let Some(p) = lookup("WEAVE_UPLOAD__CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.upload.concurrency = p;
        }
        if let Some(p) = lookup("WEAVE_UPLOAD__MAX_CHUNKS_IN_BODY").and_then(|v| v.parse().ok()) {
            self.upload.max_chunks_in_body = p;
        }
        if let Some(p) = lookup("WEAVE_UPLOAD__ERROR_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.upload.error_delay_ms = p;
        }
        if let Some(p) = lookup("WEAVE_UPLOAD__MAX_JITTER").and_then(|v| v.parse().ok()) {
            self.upload.max_jitter = p;
        }
    }
}

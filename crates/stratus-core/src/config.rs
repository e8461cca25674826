//! stratus.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Advisory lock lifetime recorded in lock info when none is configured.
pub const DEFAULT_LOCK_EXPIRY: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("invalid duration: {0}")]
    InvalidDuration(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratusConfig {
    pub state: StateConfig,
    pub lock: Option<LockConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    pub path: PathBuf,
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    pub enabled: Option<bool>,
    pub expires_after: Option<String>,
}

impl StratusConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: StratusConfig = toml::from_str(content)?;
        // Surface a bad duration at load time rather than at first lock.
        config.lock_expiry()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Minimal config pointing at `path`.
    pub fn scaffold(path: impl Into<PathBuf>) -> Self {
        StratusConfig {
            state: StateConfig {
                path: path.into(),
                output: None,
            },
            lock: Some(LockConfig {
                enabled: Some(true),
                expires_after: Some("1h".to_string()),
            }),
        }
    }

    pub fn lock_enabled(&self) -> bool {
        self.lock
            .as_ref()
            .and_then(|l| l.enabled)
            .unwrap_or(true)
    }

    pub fn lock_expiry(&self) -> Result<Duration, ConfigError> {
        match self.lock.as_ref().and_then(|l| l.expires_after.as_deref()) {
            Some(s) => parse_duration(s).ok_or_else(|| ConfigError::InvalidDuration(s.to_string())),
            None => Ok(DEFAULT_LOCK_EXPIRY),
        }
    }
}

/// Parse a duration string like "500ms", "30s", "10m", "1h". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok()?.checked_mul(60).map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok()?.checked_mul(3600).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

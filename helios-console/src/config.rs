//! Console configuration
//!
//! Loaded from a YAML file (`HELIOS_CONSOLE_CONFIG`, default `console.yaml`),
//! then patched from the environment:
//! - `HELIOS_API_URL` overrides `api.base_url`

use crate::error::ConsoleError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::warn;

pub const CONFIG_PATH_ENV: &str = "HELIOS_CONSOLE_CONFIG";
pub const API_URL_ENV: &str = "HELIOS_API_URL";
pub const DEFAULT_CONFIG_PATH: &str = "console.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConsoleConfig {
    pub api: ApiConf,
    pub lifecycle: LifecycleConf,
    pub reconcile: ReconcileConf,
    pub logging: LoggingConf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConf {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConf {
    /// Assumed worker boot time before the inventory is re-read
    pub start_settle_ms: u64,
    /// Assumed worker shutdown time before the inventory is re-read
    pub stop_settle_ms: u64,
    pub exclusion: ExclusionMode,
}

/// How concurrent operations on the same inverter interact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionMode {
    /// No serialisation: every invocation reconciles and clears busy on its own
    #[default]
    None,
    /// Per-inverter generation counter: only the newest operation clears busy
    Generation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConf {
    pub mode: ReconcileMode,
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Wait the settle delay, re-read once
    #[default]
    FixedDelay,
    /// Re-read at `poll_interval_ms` until the expected status or `poll_timeout_ms`
    PollUntilSettled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConf {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for ApiConf {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for LifecycleConf {
    fn default() -> Self {
        Self {
            start_settle_ms: 3_000,
            stop_settle_ms: 2_000,
            exclusion: ExclusionMode::None,
        }
    }
}

impl Default for ReconcileConf {
    fn default() -> Self {
        Self {
            mode: ReconcileMode::FixedDelay,
            poll_interval_ms: 500,
            poll_timeout_ms: 15_000,
        }
    }
}

impl Default for LoggingConf {
    fn default() -> Self {
        Self { filter: "helios_console=info".into() }
    }
}

impl ApiConf {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl LifecycleConf {
    pub fn start_settle(&self) -> Duration {
        Duration::from_millis(self.start_settle_ms)
    }

    pub fn stop_settle(&self) -> Duration {
        Duration::from_millis(self.stop_settle_ms)
    }
}

impl ReconcileConf {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl ConsoleConfig {
    /// Parses YAML text. Blank input yields the defaults.
    pub fn from_yaml(txt: &str) -> Result<Self, ConsoleError> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: ConsoleConfig = serde_yaml::from_str(txt)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads the file at `path`; a missing file falls back to the defaults
    pub async fn load_from(path: impl AsRef<Path>) -> Result<Self, ConsoleError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "no console config file, using defaults");
            return Ok(Self::default());
        }
        let txt = fs::read_to_string(path).await?;
        Self::from_yaml(&txt)
    }

    /// Resolves the file path (explicit > env > default), loads it, then
    /// applies environment overrides
    pub async fn load(explicit_path: Option<&Path>) -> Result<Self, ConsoleError> {
        let path = match explicit_path {
            Some(p) => p.to_path_buf(),
            None => std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into())
                .into(),
        };

        let mut cfg = Self::load_from(&path).await?;
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    /// Environment lookup is injected so overrides can be tested without
    /// touching the process environment
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.api.base_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConsoleError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConsoleError::Config("api.base_url cannot be empty".into()));
        }
        if self.api.request_timeout_ms == 0 {
            return Err(ConsoleError::Config("api.request_timeout_ms must be positive".into()));
        }
        if self.lifecycle.start_settle_ms == 0 || self.lifecycle.stop_settle_ms == 0 {
            return Err(ConsoleError::Config("lifecycle settle delays must be positive".into()));
        }
        if self.reconcile.poll_interval_ms == 0 {
            return Err(ConsoleError::Config("reconcile.poll_interval_ms must be positive".into()));
        }
        if self.reconcile.poll_timeout_ms < self.reconcile.poll_interval_ms {
            return Err(ConsoleError::Config(
                "reconcile.poll_timeout_ms must not be shorter than poll_interval_ms".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ConsoleConfig::default();
        assert_eq!(cfg.api.base_url, "http://localhost:8000");
        assert_eq!(cfg.lifecycle.start_settle(), Duration::from_secs(3));
        assert_eq!(cfg.lifecycle.stop_settle(), Duration::from_secs(2));
        assert_eq!(cfg.lifecycle.exclusion, ExclusionMode::None);
        assert_eq!(cfg.reconcile.mode, ReconcileMode::FixedDelay);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg = ConsoleConfig::from_yaml(
            "api:\n  base_url: http://fleet.lan:8000\nreconcile:\n  mode: poll_until_settled\n",
        )
        .unwrap();

        assert_eq!(cfg.api.base_url, "http://fleet.lan:8000");
        assert_eq!(cfg.api.request_timeout_ms, 10_000);
        assert_eq!(cfg.reconcile.mode, ReconcileMode::PollUntilSettled);
        assert_eq!(cfg.reconcile.poll_interval_ms, 500);
    }

    #[test]
    fn test_blank_yaml_is_default() {
        assert_eq!(ConsoleConfig::from_yaml("  \n").unwrap(), ConsoleConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ConsoleConfig::from_yaml("lifecycle:\n  start_settle_ms: 0\n").is_err());
        assert!(ConsoleConfig::from_yaml(
            "reconcile:\n  poll_interval_ms: 1000\n  poll_timeout_ms: 10\n"
        )
        .is_err());
        assert!(ConsoleConfig::from_yaml("lifecycle: nonsense").is_err());
    }

    #[test]
    fn test_env_override() {
        let mut cfg = ConsoleConfig::default();
        cfg.apply_env_overrides(|key| {
            (key == API_URL_ENV).then(|| "http://10.0.0.5:8000".to_string())
        });
        assert_eq!(cfg.api.base_url, "http://10.0.0.5:8000");

        cfg.apply_env_overrides(|_| Some("   ".to_string()));
        assert_eq!(cfg.api.base_url, "http://10.0.0.5:8000");
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.yaml");
        tokio::fs::write(&path, "lifecycle:\n  exclusion: generation\n").await.unwrap();

        let cfg = ConsoleConfig::load_from(&path).await.unwrap();
        assert_eq!(cfg.lifecycle.exclusion, ExclusionMode::Generation);

        let missing = ConsoleConfig::load_from(dir.path().join("absent.yaml")).await.unwrap();
        assert_eq!(missing, ConsoleConfig::default());
    }
}

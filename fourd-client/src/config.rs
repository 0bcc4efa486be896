//! Client configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ClientError, Result};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyConfig {
    /// Environment used when a caller does not name one
    #[serde(default = "default_environment")]
    pub default_environment: String,

    /// Environment name -> connection settings
    #[serde(default)]
    pub environments: HashMap<String, EnvironmentConfig>,

    /// Sub-path of the REST surface under each base URL
    #[serde(default = "default_rest_path")]
    pub rest_path: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base; the n-th retry waits `factor * 2^n` seconds
    #[serde(default = "default_backoff_factor")]
    pub retry_backoff_factor_secs: f64,

    /// Treat 404 like 401/403 (stale session, re-authenticate and retry)
    #[serde(default = "default_true")]
    pub reauth_on_not_found: bool,

    /// Directory holding one persisted session file per environment
    #[serde(default = "default_session_dir")]
    pub session_dir: PathBuf,

    #[serde(default)]
    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Server root, e.g. `http://erp.local:8080`
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Follow `__COUNT` across pages
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `$top` used when the caller does not pass one
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            page_size: default_page_size(),
        }
    }
}

// Defaults
fn default_environment() -> String { "live".to_string() }
fn default_rest_path() -> String { "/rest".to_string() }
fn default_timeout() -> u64 { 30 }
fn default_max_retries() -> u32 { 3 }
fn default_backoff_factor() -> f64 { 0.5 }
fn default_true() -> bool { true }
fn default_session_dir() -> PathBuf { PathBuf::from(".fourd-sessions") }
fn default_page_size() -> u32 { 1000 }

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            default_environment: default_environment(),
            environments: HashMap::new(),
            rest_path: default_rest_path(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_factor_secs: default_backoff_factor(),
            reauth_on_not_found: true,
            session_dir: default_session_dir(),
            pagination: PaginationConfig::default(),
        }
    }
}

impl LegacyConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Register an environment, builder style.
    pub fn with_environment(mut self, name: impl Into<String>, base_url: impl Into<String>) -> Self {
        self.environments.insert(
            name.into(),
            EnvironmentConfig {
                base_url: base_url.into(),
            },
        );
        self
    }

    /// REST endpoint root for an environment, e.g. `http://host:8080/rest`.
    pub fn endpoint_for(&self, environment: &str) -> Result<String> {
        let env = self.environments.get(environment).ok_or_else(|| {
            ClientError::Config(format!("Unknown environment: {}", environment))
        })?;

        let base = env.base_url.trim_end_matches('/');
        let path = self.rest_path.trim_matches('/');
        if path.is_empty() {
            Ok(base.to_string())
        } else {
            Ok(format!("{}/{}", base, path))
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reject values that parse but cannot be used.
    pub fn validate(&self) -> Result<()> {
        self.retry_policy().map(|_| ())
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        let backoff_factor = Duration::try_from_secs_f64(self.retry_backoff_factor_secs).map_err(|e| {
            ClientError::Config(format!(
                "retry_backoff_factor_secs = {}: {}",
                self.retry_backoff_factor_secs, e
            ))
        })?;

        Ok(RetryPolicy {
            max_retries: self.max_retries,
            backoff_factor,
        })
    }
}

use crate::timeouts::ADMIN_REQUEST_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BIND: &str = "127.0.0.1:8088";
const DEFAULT_STATE_DIR: &str = "state";
const DEFAULT_MAX_CONNECTIONS: usize = 64;
pub const DEFAULT_AUDIT_CAPACITY: usize = 512;

/// If `path` is relative, joins it to `base`; otherwise returns it unchanged.
pub fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Process configuration, loaded from YAML and overridable from the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleGateConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Actor ids admitted to the admin surface; empty admits everyone.
    #[serde(default)]
    pub admin_actor_ids: Vec<i64>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: Option<usize>,
    #[serde(default = "default_audit_capacity")]
    pub audit_capacity: usize,
    /// Requesters routed to the newest gray version by `/admin/rules/resolve`.
    #[serde(default)]
    pub gray_allow_list: Vec<String>,
}

impl Default for RuleGateConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            state_dir: default_state_dir(),
            admin_actor_ids: Vec::new(),
            request_timeout_ms: default_request_timeout_ms(),
            max_connections: default_max_connections(),
            audit_capacity: default_audit_capacity(),
            gray_allow_list: Vec::new(),
        }
    }
}

impl RuleGateConfig {
    /// Loads a YAML config file; a relative `state_dir` is resolved against
    /// the directory holding the file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: RuleGateConfig = serde_yaml::from_str(&raw)?;
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.state_dir = resolve_relative(&base, &config.state_dir);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.max_connections == Some(0) {
            return Err(ConfigError::Invalid(
                "max_connections must be greater than zero when set".into(),
            ));
        }
        if let Some(bad) = self.admin_actor_ids.iter().find(|id| **id <= 0) {
            return Err(ConfigError::Invalid(format!(
                "admin_actor_ids must be positive (found {bad})"
            )));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|_| ConfigError::InvalidBind(self.bind.clone()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.into()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_DIR)
}

fn default_request_timeout_ms() -> u64 {
    ADMIN_REQUEST_TIMEOUT.as_millis() as u64
}

fn default_max_connections() -> Option<usize> {
    Some(DEFAULT_MAX_CONNECTIONS)
}

fn default_audit_capacity() -> usize {
    DEFAULT_AUDIT_CAPACITY
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid bind address `{0}`")]
    InvalidBind(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{
    error::Error,
    types::{duration_secs, ResourceLimits},
};

/// Executor-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Parent of the executor's managed temp directory; the system temp
    /// directory when unset
    pub temp_root: Option<PathBuf>,

    /// Limits for contexts that carry none
    pub default_limits: ResourceLimits,

    /// Delay between SIGTERM and SIGKILL when ending a process
    #[serde(with = "duration_secs")]
    pub kill_grace_period: Duration,

    /// Ceiling on a dependency install step
    #[serde(with = "duration_secs")]
    pub install_timeout: Duration,

    /// Bytes kept per captured stream
    pub max_output_bytes: usize,

    /// Processes allowed to run at once on one executor
    pub max_concurrent_executions: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            temp_root: None,
            default_limits: ResourceLimits::default(),
            kill_grace_period: Duration::from_millis(500),
            install_timeout: Duration::from_secs(300),
            max_output_bytes: 1024 * 1024,
            max_concurrent_executions: 16,
        }
    }
}

impl ExecutorConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, Error> {
        let config: ExecutorConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    pub fn with_default_limits(mut self, limits: ResourceLimits) -> Self {
        self.default_limits = limits;
        self
    }

    pub fn with_kill_grace_period(mut self, grace: Duration) -> Self {
        self.kill_grace_period = grace;
        self
    }

    pub fn with_max_concurrent_executions(mut self, max: usize) -> Self {
        self.max_concurrent_executions = max;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_concurrent_executions == 0 {
            return Err(Error::Config(
                "max_concurrent_executions must be at least 1".to_string(),
            ));
        }
        if self.max_output_bytes == 0 {
            return Err(Error::Config(
                "max_output_bytes must be at least 1".to_string(),
            ));
        }
        if self.install_timeout.is_zero() {
            return Err(Error::Config(
                "install_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Language not supported: {0}")]
    UnsupportedLanguage(String),

    #[error("Invalid resource limits: {0}")]
    InvalidResourceLimits(String),

    #[error("Invalid execution context: {0}")]
    InvalidContext(String),

    #[error("Invalid dependency specification: {0}")]
    InvalidDependency(String),

    #[error("Dependency installation failed: {0}")]
    DependencyInstall(String),

    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    #[error("Execution timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Execution was cancelled")]
    Cancelled,

    #[error("Executor has been cleaned up")]
    ExecutorClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether the error is raised to the caller before any process attempt.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedLanguage(_)
                | Error::InvalidResourceLimits(_)
                | Error::InvalidContext(_)
                | Error::InvalidDependency(_)
                | Error::ExecutorClosed
        )
    }
}

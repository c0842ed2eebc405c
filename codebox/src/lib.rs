//! # Codebox
//!
//! A sandboxed code execution engine. Source code in one of several languages
//! is written to a scratch file, run in its own process group under resource
//! limits, and reported back as a structured result. Running executions can
//! be cancelled by id, and every execution is bounded by a wall-clock
//! watchdog.

pub mod api;
mod config;
mod error;
mod executor;
pub mod languages;
pub mod registry;
mod supervisor;
mod types;

#[cfg(test)]
mod tests;

pub use config::ExecutorConfig;
pub use error::Error;
pub use executor::CodeExecutor;
pub use registry::{InstallStrategy, Interpreter, RuntimeRecipe, RuntimeRegistry};
pub use supervisor::{
    CommandSpec, ProcessExit, ProcessOutput, ProcessSupervisor, RunningProcess, Termination,
    TrackedProcessInfo,
};
pub use types::{
    validate_dependency, ExecutionContext, ExecutionMode, ExecutionResult, ExecutionStatus,
    Language, ResourceLimits, ResourceLimitsSpec,
};

/// Result type for code execution operations
pub type Result<T> = std::result::Result<T, Error>;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::Error;

/// Supported programming languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Shell,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Python,
        Language::JavaScript,
        Language::TypeScript,
        Language::Shell,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Shell => "shell",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            "typescript" | "ts" => Ok(Language::TypeScript),
            "shell" | "sh" | "bash" => Ok(Language::Shell),
            _ => Err(Error::UnsupportedLanguage(s.to_string())),
        }
    }
}

/// How the submitted source is run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// A complete, self-contained source file
    #[default]
    Script,
}

impl FromStr for ExecutionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "script" => Ok(ExecutionMode::Script),
            other => Err(Error::InvalidContext(format!(
                "unknown execution mode: {}",
                other
            ))),
        }
    }
}

/// Resource ceilings for one execution.
///
/// Fields are private so a constructed value always satisfies
/// `0 < max_time <= MAX_TIME`, `max_memory > 0` and `max_processes > 0`.
///
/// `max_processes` is enforced through `RLIMIT_NPROC` for unprivileged
/// users, so with the default of 1 a shell program cannot fork any external
/// command; raise it for scripts that run pipelines or subprocesses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ResourceLimitsSpec", into = "ResourceLimitsSpec")]
pub struct ResourceLimits {
    max_time: Duration,
    max_memory: u64,
    max_processes: u32,
    network_access: bool,
    file_access: bool,
}

impl ResourceLimits {
    pub const DEFAULT_MAX_TIME: Duration = Duration::from_secs(30);
    pub const DEFAULT_MAX_MEMORY_MB: u64 = 512;
    pub const DEFAULT_MAX_PROCESSES: u32 = 1;
    /// Longest wall-clock ceiling accepted
    pub const MAX_TIME: Duration = Duration::from_secs(24 * 60 * 60);

    /// Create limits with network access disabled and file access enabled.
    pub fn new(max_time: Duration, max_memory_mb: u64, max_processes: u32) -> Result<Self, Error> {
        if max_time.is_zero() {
            return Err(Error::InvalidResourceLimits(
                "max_time must be greater than zero".to_string(),
            ));
        }
        if max_time > Self::MAX_TIME {
            return Err(Error::InvalidResourceLimits(format!(
                "max_time must be at most {}s, got {}s",
                Self::MAX_TIME.as_secs(),
                max_time.as_secs_f64()
            )));
        }
        if max_memory_mb == 0 {
            return Err(Error::InvalidResourceLimits(
                "max_memory must be greater than zero".to_string(),
            ));
        }
        if max_processes == 0 {
            return Err(Error::InvalidResourceLimits(
                "max_processes must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            max_time,
            max_memory: max_memory_mb,
            max_processes,
            network_access: false,
            file_access: true,
        })
    }

    pub fn with_network_access(mut self, allowed: bool) -> Self {
        self.network_access = allowed;
        self
    }

    pub fn with_file_access(mut self, allowed: bool) -> Self {
        self.file_access = allowed;
        self
    }

    /// Wall-clock ceiling
    pub fn max_time(&self) -> Duration {
        self.max_time
    }

    /// Memory ceiling in megabytes
    pub fn max_memory(&self) -> u64 {
        self.max_memory
    }

    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory.saturating_mul(1024 * 1024)
    }

    pub fn max_processes(&self) -> u32 {
        self.max_processes
    }

    pub fn network_access(&self) -> bool {
        self.network_access
    }

    pub fn file_access(&self) -> bool {
        self.file_access
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_time: Self::DEFAULT_MAX_TIME,
            max_memory: Self::DEFAULT_MAX_MEMORY_MB,
            max_processes: Self::DEFAULT_MAX_PROCESSES,
            network_access: false,
            file_access: true,
        }
    }
}

/// Serialization-friendly form of [`ResourceLimits`].
///
/// Numbers are signed and `max_time` is fractional seconds so that
/// out-of-range input reaches validation instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimitsSpec {
    pub max_time: f64,
    pub max_memory: i64,
    pub max_processes: i64,
    pub network_access: bool,
    pub file_access: bool,
}

impl Default for ResourceLimitsSpec {
    fn default() -> Self {
        ResourceLimits::default().into()
    }
}

impl TryFrom<ResourceLimitsSpec> for ResourceLimits {
    type Error = Error;

    fn try_from(spec: ResourceLimitsSpec) -> Result<Self, Self::Error> {
        if !spec.max_time.is_finite() || spec.max_time <= 0.0 {
            return Err(Error::InvalidResourceLimits(format!(
                "max_time must be a positive number of seconds, got {}",
                spec.max_time
            )));
        }
        let max_time = Duration::try_from_secs_f64(spec.max_time)
            .map_err(|e| Error::InvalidResourceLimits(format!("max_time: {}", e)))?;
        let max_memory = u64::try_from(spec.max_memory).map_err(|_| {
            Error::InvalidResourceLimits(format!(
                "max_memory must be positive, got {}",
                spec.max_memory
            ))
        })?;
        let max_processes = u32::try_from(spec.max_processes).map_err(|_| {
            Error::InvalidResourceLimits(format!(
                "max_processes must be positive, got {}",
                spec.max_processes
            ))
        })?;

        Ok(ResourceLimits::new(max_time, max_memory, max_processes)?
            .with_network_access(spec.network_access)
            .with_file_access(spec.file_access))
    }
}

impl From<ResourceLimits> for ResourceLimitsSpec {
    fn from(limits: ResourceLimits) -> Self {
        Self {
            max_time: limits.max_time.as_secs_f64(),
            max_memory: i64::try_from(limits.max_memory).unwrap_or(i64::MAX),
            max_processes: i64::from(limits.max_processes),
            network_access: limits.network_access,
            file_access: limits.file_access,
        }
    }
}

/// Full parameter set for one code run
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub language: Language,
    pub mode: ExecutionMode,
    /// Package names, optionally with a version specifier understood by the
    /// language's installer (`requests==2.31.0`, `lodash@4`)
    pub dependencies: Vec<String>,
    /// Merged over the inherited environment
    pub environment_vars: HashMap<String, String>,
    /// Defaults to the executor's managed temp directory
    pub working_directory: Option<PathBuf>,
    /// Defaults to the executor's configured limits
    pub resource_limits: Option<ResourceLimits>,
}

impl ExecutionContext {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            mode: ExecutionMode::default(),
            dependencies: Vec::new(),
            environment_vars: HashMap::new(),
            working_directory: None,
            resource_limits: None,
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_environment_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.environment_vars = vars;
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_resource_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = Some(limits);
        self
    }

    /// Check everything that can be rejected before a process is attempted.
    pub fn validate(&self) -> Result<(), Error> {
        for dependency in &self.dependencies {
            validate_dependency(dependency)?;
        }

        for (key, value) in &self.environment_vars {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                return Err(Error::InvalidContext(format!(
                    "invalid environment variable name: {:?}",
                    key
                )));
            }
            if value.contains('\0') {
                return Err(Error::InvalidContext(format!(
                    "environment variable {} contains a NUL byte",
                    key
                )));
            }
        }

        if let Some(dir) = &self.working_directory {
            if !dir.is_dir() {
                return Err(Error::InvalidContext(format!(
                    "working directory does not exist: {}",
                    dir.display()
                )));
            }
        }

        Ok(())
    }
}

fn dependency_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9@_][A-Za-z0-9._\-/@=<>!~^*+\[\],]{0,213}$")
            .expect("dependency pattern is a valid regex")
    })
}

/// Reject anything an installer could read as an option or a shell construct.
pub fn validate_dependency(name: &str) -> Result<(), Error> {
    if dependency_pattern().is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidDependency(name.to_string()))
    }
}

/// Outcome classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Error,
    Timeout,
    Cancelled,
    DependencyError,
    SpawnError,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Error => "error",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::DependencyError => "dependency_error",
            ExecutionStatus::SpawnError => "spawn_error",
        };
        f.write_str(s)
    }
}

/// Execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    /// Captured stdout
    pub output: String,
    /// Populated exactly when `success` is false
    pub error: Option<String>,
    #[serde(with = "duration_secs")]
    pub execution_time: Duration,
    pub status: ExecutionStatus,
    /// Id the process was tracked under, if one was spawned
    pub execution_id: Option<String>,
}

impl ExecutionResult {
    pub fn succeeded(output: String, execution_time: Duration) -> Self {
        Self {
            success: true,
            output,
            error: None,
            execution_time,
            status: ExecutionStatus::Success,
            execution_id: None,
        }
    }

    pub fn failed(
        status: ExecutionStatus,
        output: String,
        error: impl Into<String>,
        execution_time: Duration,
    ) -> Self {
        Self {
            success: false,
            output,
            error: Some(error.into()),
            execution_time,
            status,
            execution_id: None,
        }
    }

    /// Fold an engine error into a failed result.
    pub fn from_error(error: &Error, execution_time: Duration) -> Self {
        let status = match error {
            Error::Timeout(_) => ExecutionStatus::Timeout,
            Error::Cancelled => ExecutionStatus::Cancelled,
            Error::DependencyInstall(_) => ExecutionStatus::DependencyError,
            Error::Spawn(_) => ExecutionStatus::SpawnError,
            _ => ExecutionStatus::Error,
        };
        Self::failed(status, String::new(), error.to_string(), execution_time)
    }

    pub fn with_execution_id(mut self, id: impl Into<String>) -> Self {
        self.execution_id = Some(id.into());
        self
    }
}

pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

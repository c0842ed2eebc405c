//! Flattened call contract for callers across a process or API boundary.
//!
//! Everything here is plain serde data: strings for enums, seconds as
//! floating point numbers, optional fields for every defaulted setting.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::{
    error::Error,
    executor::CodeExecutor,
    types::{ExecutionContext, ExecutionMode, ExecutionResult, Language, ResourceLimits, ResourceLimitsSpec},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteCodeRequest {
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub dependencies: Option<Vec<String>>,
    #[serde(default)]
    pub environment_vars: Option<HashMap<String, String>>,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub resource_limits: Option<ResourceLimitsSpec>,
}

impl ExecuteCodeRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
            mode: None,
            dependencies: None,
            environment_vars: None,
            working_directory: None,
            resource_limits: None,
        }
    }

    /// Build the typed context, failing on any malformed field.
    pub fn to_context(&self) -> Result<ExecutionContext, Error> {
        let language: Language = self.language.parse()?;
        let mode = match &self.mode {
            Some(mode) => mode.parse()?,
            None => ExecutionMode::default(),
        };

        let mut context = ExecutionContext::new(language).with_mode(mode);
        if let Some(dependencies) = &self.dependencies {
            context = context.with_dependencies(dependencies.iter().cloned());
        }
        if let Some(vars) = &self.environment_vars {
            context = context.with_environment_vars(vars.clone());
        }
        if let Some(dir) = &self.working_directory {
            context = context.with_working_directory(PathBuf::from(dir));
        }
        if let Some(spec) = &self.resource_limits {
            context = context.with_resource_limits(ResourceLimits::try_from(spec.clone())?);
        }

        context.validate()?;
        Ok(context)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteCodeResponse {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    /// Seconds
    pub execution_time: f64,
}

impl From<ExecutionResult> for ExecuteCodeResponse {
    fn from(result: ExecutionResult) -> Self {
        Self {
            success: result.success,
            output: result.output,
            error: result.error,
            execution_time: result.execution_time.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelExecutionResponse {
    pub success: bool,
}

/// Validation errors are returned as `Err`; everything else is a response.
pub async fn execute_code(
    executor: &CodeExecutor,
    request: &ExecuteCodeRequest,
) -> Result<ExecuteCodeResponse, Error> {
    let context = request.to_context()?;
    let result = executor.execute(&request.code, &context).await?;
    Ok(result.into())
}

pub fn cancel_execution(executor: &CodeExecutor, execution_id: &str) -> CancelExecutionResponse {
    CancelExecutionResponse {
        success: executor.cancel(execution_id),
    }
}

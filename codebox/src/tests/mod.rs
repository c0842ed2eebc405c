use std::time::Duration;
use tokio_test::assert_ok;

use crate::{
    api::{cancel_execution, execute_code, ExecuteCodeRequest},
    error::Error,
    types::{ExecutionContext, ExecutionStatus, Language, ResourceLimitsSpec},
    CodeExecutor, ExecutorConfig,
};

mod fixtures;
mod languages;
mod utils;

use fixtures::{code_samples::*, runtime_errors::*, test_scenarios::*};
use utils::defaults::*;

#[tokio::test]
async fn test_hello_world_scenario() -> Result<(), Error> {
    let executor = test_executor();
    let context = ExecutionContext::new(Language::Python);

    let result = executor.execute(PYTHON_HELLO, &context).await?;
    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert!(result.output.contains("Hello, World!"));
    assert!(result.error.is_none());
    assert_eq!(result.status, ExecutionStatus::Success);
    assert!(result.execution_id.is_some());

    executor.cleanup()
}

#[tokio::test]
async fn test_timeout_scenario() -> Result<(), Error> {
    let executor = test_executor();
    let context = ExecutionContext::new(Language::Python)
        .with_resource_limits(limits_with_time(Duration::from_secs(1)));

    let result = executor.execute(PYTHON_SLEEP, &context).await?;
    assert!(!result.success);
    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert!(result.error.as_deref().unwrap().contains("timed out"));
    assert!(!result.output.contains("finished"));
    assert!(result.execution_time >= Duration::from_millis(900));
    assert!(result.execution_time < Duration::from_secs(3));
    assert!(executor.running_executions().is_empty());

    executor.cleanup()
}

#[tokio::test]
async fn test_undefined_symbol_scenario() -> Result<(), Error> {
    let executor = test_executor();
    let context = ExecutionContext::new(Language::Python);

    let result = executor.execute(PYTHON_NAME_ERROR, &context).await?;
    assert!(!result.success);
    assert_eq!(result.status, ExecutionStatus::Error);
    let error = result.error.unwrap();
    assert!(error.contains("NameError"));
    assert!(error.contains("undefined_symbol"));

    executor.cleanup()
}

#[tokio::test]
async fn test_cancel_scenario() -> Result<(), Error> {
    let executor = test_executor();
    let context = ExecutionContext::new(Language::Python);

    let running = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.execute(PYTHON_SLEEP, &context).await })
    };

    let id = wait_for_running(&executor, Duration::from_secs(5))
        .await
        .expect("execution never became visible in the live table");

    assert!(executor.cancel(&id));
    assert!(!executor.cancel(&id));

    let result = running.await.unwrap()?;
    assert!(!result.success);
    assert_eq!(result.status, ExecutionStatus::Cancelled);
    assert!(result.error.as_deref().unwrap().contains("cancelled"));
    assert_eq!(result.execution_id.as_deref(), Some(id.as_str()));
    assert!(result.execution_time < Duration::from_secs(5));
    assert!(!executor.cancel(&id));

    executor.cleanup()
}

#[tokio::test]
async fn test_cancel_unknown_id() {
    let executor = test_executor();
    assert!(!executor.cancel("not-a-real-execution"));
    assert!(!cancel_execution(&executor, "not-a-real-execution").success);
}

#[tokio::test]
async fn test_cancel_after_completion() -> Result<(), Error> {
    let executor = test_executor();
    let result = executor
        .execute(PYTHON_HELLO, &ExecutionContext::new(Language::Python))
        .await?;
    let id = result.execution_id.unwrap();
    assert!(!executor.cancel(&id));
    executor.cleanup()
}

#[tokio::test]
async fn test_invalid_limits_fail_before_spawn() {
    let executor = test_executor();

    let mut request = ExecuteCodeRequest::new("python", PYTHON_SLEEP);
    request.resource_limits = Some(ResourceLimitsSpec {
        max_time: 0.0,
        ..Default::default()
    });

    let result = execute_code(&executor, &request).await;
    assert!(matches!(result, Err(Error::InvalidResourceLimits(_))));
    assert!(executor.running_executions().is_empty());
}

#[tokio::test]
async fn test_unbounded_time_limit_fails_before_spawn() {
    let executor = test_executor();

    let mut request = ExecuteCodeRequest::new("shell", SHELL_HELLO);
    request.resource_limits = Some(ResourceLimitsSpec {
        max_time: 1e19,
        ..Default::default()
    });

    let result = execute_code(&executor, &request).await;
    assert!(matches!(result, Err(Error::InvalidResourceLimits(_))));
    assert!(executor.running_executions().is_empty());
}

#[tokio::test]
async fn test_unknown_language_fails_before_spawn() {
    let executor = test_executor();
    let request = ExecuteCodeRequest::new("brainfuck", "+[]");
    let result = execute_code(&executor, &request).await;
    assert!(matches!(result, Err(Error::UnsupportedLanguage(_))));
    assert!(executor.running_executions().is_empty());
}

#[tokio::test]
async fn test_execute_code_contract() -> Result<(), Error> {
    let executor = test_executor();
    let request: ExecuteCodeRequest = serde_json::from_str(
        r#"{
            "code": "import os\nprint(os.environ['CODEBOX_GREETING'])",
            "language": "python",
            "environment_vars": {"CODEBOX_GREETING": "hello over the wire"},
            "resource_limits": {"max_time": 5, "max_memory": 256}
        }"#,
    )
    .unwrap();

    let response = execute_code(&executor, &request).await?;
    assert!(response.success);
    assert!(response.output.contains("hello over the wire"));
    assert!(response.error.is_none());
    assert!(response.execution_time > 0.0);

    executor.cleanup()
}

#[tokio::test]
async fn test_cleanup_removes_temp_dir() {
    let executor = test_executor();
    let temp_dir = executor.temp_dir().to_path_buf();
    assert!(temp_dir.is_dir());

    assert_ok!(executor.cleanup());
    assert!(!temp_dir.exists());
    assert_ok!(executor.cleanup());

    let result = executor
        .execute(PYTHON_HELLO, &ExecutionContext::new(Language::Python))
        .await;
    assert!(matches!(result, Err(Error::ExecutorClosed)));
}

#[tokio::test]
async fn test_cleanup_terminates_running_executions() -> Result<(), Error> {
    let executor = test_executor();
    let context = ExecutionContext::new(Language::Python);

    let running = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.execute(PYTHON_SLEEP, &context).await })
    };
    assert!(wait_for_running(&executor, Duration::from_secs(5)).await.is_some());

    executor.cleanup()?;
    assert!(executor.running_executions().is_empty());

    let result = running.await.unwrap()?;
    assert!(!result.success);
    assert_eq!(result.status, ExecutionStatus::Cancelled);
    Ok(())
}

#[tokio::test]
async fn test_executor_rejects_invalid_config() {
    let config = ExecutorConfig::default().with_max_concurrent_executions(0);
    assert!(matches!(
        CodeExecutor::with_config(config),
        Err(Error::Config(_))
    ));
}

use super::utils::defaults::*;
use crate::{languages::skip_if_not_available, Error, ExecutionContext, ExecutionStatus, Language};
use tokio::time::Duration;

pub mod javascript;
pub mod python;
pub mod shell;
pub mod typescript;

/// True when none of `tools` is on `PATH`.
pub(crate) fn skip_unless_any(tools: &[&str]) -> bool {
    if tools.iter().any(|tool| which::which(tool).is_ok()) {
        return false;
    }
    eprintln!("Skipping test: none of {} available", tools.join(", "));
    true
}

// Common test utilities for language tests
pub(crate) async fn test_language_execution(language: Language, code: &str) -> Result<(), Error> {
    let executor = test_executor();
    let context = ExecutionContext::new(language);

    let result = executor.execute(code, &context).await?;
    assert!(result.success, "{} failed: {:?}", language, result.error);
    assert!(result.output.contains("Hello, World!"));
    assert_eq!(result.status, ExecutionStatus::Success);

    executor.cleanup()
}

pub(crate) async fn test_language_error(
    language: Language,
    code: &str,
    expected: &str,
) -> Result<(), Error> {
    let executor = test_executor();
    let context = ExecutionContext::new(language);

    let result = executor.execute(code, &context).await?;
    assert!(!result.success);
    assert_eq!(result.status, ExecutionStatus::Error);
    let error = result.error.unwrap();
    assert!(error.contains(expected), "unexpected error: {}", error);

    executor.cleanup()
}

pub(crate) async fn test_language_timeout(language: Language, code: &str) -> Result<(), Error> {
    let executor = test_executor();
    let context = ExecutionContext::new(language)
        .with_resource_limits(limits_with_time(Duration::from_secs(1)));

    let result = executor.execute(code, &context).await?;
    assert!(!result.success);
    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert!(!result.output.contains("finished"));
    assert!(result.execution_time < Duration::from_secs(4));
    assert!(executor.running_executions().is_empty());

    executor.cleanup()
}

pub(crate) async fn test_language_env(language: Language, code: &str) -> Result<(), Error> {
    let executor = test_executor();
    let context = ExecutionContext::new(language).with_env_var("CODEBOX_GREETING", "hi there");

    let result = executor.execute(code, &context).await?;
    assert!(result.success, "{} failed: {:?}", language, result.error);
    assert!(result.output.starts_with("hi there"));

    executor.cleanup()
}

pub(crate) async fn test_language_with_deps(
    language: Language,
    code: &str,
    dependencies: &[&str],
) -> Result<(), Error> {
    let executor = test_executor();
    let context = ExecutionContext::new(language)
        .with_dependencies(dependencies.iter().copied())
        .with_resource_limits(limits_with_time(Duration::from_secs(30)));

    let result = executor.execute(code, &context).await?;
    assert!(result.success, "{} failed: {:?}", language, result.error);
    assert!(!result.output.is_empty());

    executor.cleanup()
}

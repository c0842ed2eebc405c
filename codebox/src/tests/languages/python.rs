use super::*;
use crate::tests::fixtures::{
    code_samples::PYTHON_HELLO, runtime_errors::PYTHON_NAME_ERROR, test_scenarios::*,
};

#[tokio::test]
async fn test_python_basic() -> Result<(), Error> {
    if skip_if_not_available(&["python3"]) {
        return Ok(());
    }
    test_language_execution(Language::Python, PYTHON_HELLO).await
}

#[tokio::test]
async fn test_python_runtime_error() -> Result<(), Error> {
    if skip_if_not_available(&["python3"]) {
        return Ok(());
    }
    test_language_error(Language::Python, PYTHON_NAME_ERROR, "NameError").await
}

#[tokio::test]
async fn test_python_timeout() -> Result<(), Error> {
    if skip_if_not_available(&["python3"]) {
        return Ok(());
    }
    test_language_timeout(Language::Python, PYTHON_SLEEP).await
}

#[tokio::test]
async fn test_python_env() -> Result<(), Error> {
    if skip_if_not_available(&["python3"]) {
        return Ok(());
    }
    test_language_env(Language::Python, PYTHON_ENV).await
}

#[tokio::test]
#[ignore = "requires network access"]
async fn test_python_with_deps() -> Result<(), Error> {
    if skip_if_not_available(&["python3"]) {
        return Ok(());
    }
    test_language_with_deps(Language::Python, PYTHON_WITH_DEPS, &["six"]).await
}

#[tokio::test]
async fn test_python_unbuffered_output_survives_timeout() -> Result<(), Error> {
    if skip_if_not_available(&["python3"]) {
        return Ok(());
    }
    let executor = test_executor();
    let context = ExecutionContext::new(Language::Python)
        .with_resource_limits(limits_with_time(Duration::from_secs(1)));

    let code = "import time\nprint('before')\ntime.sleep(10)";
    let result = executor.execute(code, &context).await?;
    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert_eq!(result.output.trim(), "before");

    executor.cleanup()
}

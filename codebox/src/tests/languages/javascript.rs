use super::*;
use crate::tests::fixtures::{
    code_samples::JS_HELLO, runtime_errors::JS_REFERENCE_ERROR, test_scenarios::*,
};

#[tokio::test]
async fn test_javascript_basic() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    test_language_execution(Language::JavaScript, JS_HELLO).await
}

#[tokio::test]
async fn test_javascript_runtime_error() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    test_language_error(Language::JavaScript, JS_REFERENCE_ERROR, "ReferenceError").await
}

#[tokio::test]
async fn test_javascript_timeout() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    test_language_timeout(Language::JavaScript, JS_SLEEP).await
}

#[tokio::test]
async fn test_javascript_env() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    test_language_env(Language::JavaScript, JS_ENV).await
}

#[tokio::test]
#[ignore = "requires network access"]
async fn test_javascript_with_deps() -> Result<(), Error> {
    if skip_if_not_available(&["node", "npm"]) {
        return Ok(());
    }
    test_language_with_deps(Language::JavaScript, JS_WITH_DEPS, &["lodash"]).await
}

use super::*;
use crate::tests::fixtures::{
    code_samples::SHELL_HELLO, runtime_errors::SHELL_EXIT_CODE, test_scenarios::*,
};

#[tokio::test]
async fn test_shell_basic() -> Result<(), Error> {
    test_language_execution(Language::Shell, SHELL_HELLO).await
}

#[tokio::test]
async fn test_shell_exit_code() -> Result<(), Error> {
    test_language_error(Language::Shell, SHELL_EXIT_CODE, "something went wrong").await
}

#[tokio::test]
async fn test_shell_timeout() -> Result<(), Error> {
    test_language_timeout(Language::Shell, SHELL_SLEEP).await
}

#[tokio::test]
async fn test_shell_env() -> Result<(), Error> {
    test_language_env(Language::Shell, SHELL_ENV).await
}

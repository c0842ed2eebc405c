use super::*;
use crate::tests::fixtures::{code_samples::TS_HELLO, test_scenarios::*};

// The strip-types fallback depends on the installed Node version, so only
// the dedicated launchers are relied on here.
const TS_LAUNCHERS: &[&str] = &["tsx", "ts-node"];

#[tokio::test]
async fn test_typescript_basic() -> Result<(), Error> {
    if skip_unless_any(TS_LAUNCHERS) {
        return Ok(());
    }
    test_language_execution(Language::TypeScript, TS_HELLO).await
}

#[tokio::test]
async fn test_typescript_timeout() -> Result<(), Error> {
    if skip_unless_any(TS_LAUNCHERS) {
        return Ok(());
    }
    test_language_timeout(Language::TypeScript, JS_SLEEP).await
}

#[tokio::test]
#[ignore = "requires network access"]
async fn test_typescript_with_deps() -> Result<(), Error> {
    if skip_unless_any(TS_LAUNCHERS) || skip_if_not_available(&["npm"]) {
        return Ok(());
    }
    test_language_with_deps(Language::TypeScript, JS_WITH_DEPS, &["lodash"]).await
}

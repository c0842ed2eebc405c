use std::path::Path;
use std::time::Duration;
use tokio::{fs, process::Command};
use tracing::debug;

use crate::{
    error::Error,
    languages::{check_command, run_installer},
    registry::{InstallStrategy, Interpreter, RuntimeRecipe, FILE_PLACEHOLDER},
    types::Language,
};

pub fn recipe() -> RuntimeRecipe {
    RuntimeRecipe {
        language: Language::JavaScript,
        interpreters: vec![Interpreter::new("node", &[FILE_PLACEHOLDER])],
        extension: "js".to_string(),
        install: InstallStrategy::Npm,
        threaded: true,
        env: Vec::new(),
    }
}

/// Scratch manifest the dependencies are installed against
pub(crate) fn scratch_manifest() -> serde_json::Value {
    serde_json::json!({
        "name": "codebox-execution",
        "version": "1.0.0",
        "private": true
    })
}

/// Install into a scratch package; shared by every Node-based runtime.
pub(crate) async fn install_dependencies(
    dependencies: &[String],
    target_dir: &Path,
    timeout: Duration,
) -> Result<Vec<(String, String)>, Error> {
    if !check_command("npm") {
        return Err(Error::DependencyInstall("npm not found on PATH".to_string()));
    }

    fs::create_dir_all(target_dir)
        .await
        .map_err(|e| Error::DependencyInstall(format!("failed to create {}: {}", target_dir.display(), e)))?;

    let manifest = serde_json::to_string_pretty(&scratch_manifest())
        .map_err(|e| Error::DependencyInstall(format!("failed to render package.json: {}", e)))?;
    fs::write(target_dir.join("package.json"), manifest)
        .await
        .map_err(|e| Error::DependencyInstall(format!("failed to create package.json: {}", e)))?;

    let mut command = Command::new("npm");
    command
        .args([
            "install",
            "--no-audit",
            "--no-fund",
            "--no-progress",
            "--loglevel=error",
        ])
        .args(dependencies)
        .current_dir(target_dir);

    run_installer(command, "npm install", timeout).await?;

    debug!("Installed Node dependencies: {:?}", dependencies);
    Ok(vec![(
        "NODE_PATH".to_string(),
        target_dir.join("node_modules").to_string_lossy().into_owned(),
    )])
}

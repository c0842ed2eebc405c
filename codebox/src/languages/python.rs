use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::{
    error::Error,
    languages::run_installer,
    registry::{InstallStrategy, Interpreter, RuntimeRecipe, FILE_PLACEHOLDER},
    types::Language,
};

pub fn recipe() -> RuntimeRecipe {
    RuntimeRecipe {
        language: Language::Python,
        interpreters: vec![
            Interpreter::new("python3", &[FILE_PLACEHOLDER]),
            Interpreter::new("python", &[FILE_PLACEHOLDER]),
        ],
        extension: "py".to_string(),
        install: InstallStrategy::Pip,
        threaded: false,
        env: vec![
            ("PYTHONUNBUFFERED".to_string(), "1".to_string()),
            ("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string()),
        ],
    }
}

pub(crate) async fn install_dependencies(
    interpreter: &Path,
    dependencies: &[String],
    target_dir: &Path,
    timeout: Duration,
) -> Result<Vec<(String, String)>, Error> {
    tokio::fs::create_dir_all(target_dir)
        .await
        .map_err(|e| Error::DependencyInstall(format!("failed to create {}: {}", target_dir.display(), e)))?;

    let mut command = Command::new(interpreter);
    command
        .args([
            "-m",
            "pip",
            "install",
            "--quiet",
            "--no-input",
            "--disable-pip-version-check",
            "--no-warn-script-location",
            "--target",
        ])
        .arg(target_dir)
        .args(dependencies)
        .current_dir(target_dir);

    run_installer(command, "pip install", timeout).await?;

    debug!("Installed Python dependencies: {:?}", dependencies);
    Ok(vec![(
        "PYTHONPATH".to_string(),
        target_dir.to_string_lossy().into_owned(),
    )])
}

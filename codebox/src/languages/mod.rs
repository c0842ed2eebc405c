//! Language-specific recipes and dependency installers

pub mod javascript;
pub mod python;
pub mod shell;
pub mod typescript;

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;
use which::which;

use crate::{error::Error, registry::InstallStrategy};

/// Longest installer stderr tail kept in an error message
const INSTALL_ERROR_TAIL: usize = 2000;

impl InstallStrategy {
    /// Install `dependencies` into `target_dir` and return the variables the
    /// program needs to see them.
    pub(crate) async fn install(
        &self,
        interpreter: &Path,
        dependencies: &[String],
        target_dir: &Path,
        timeout: Duration,
    ) -> Result<Vec<(String, String)>, Error> {
        if dependencies.is_empty() {
            return Ok(Vec::new());
        }

        match self {
            InstallStrategy::Pip => {
                python::install_dependencies(interpreter, dependencies, target_dir, timeout).await
            }
            InstallStrategy::Npm => {
                javascript::install_dependencies(dependencies, target_dir, timeout).await
            }
            InstallStrategy::Unsupported => Err(Error::DependencyInstall(
                "this runtime does not support dependency installation".to_string(),
            )),
        }
    }
}

/// Run an installer to completion, bounded by `timeout`.
pub(crate) async fn run_installer(
    mut command: Command,
    description: &str,
    timeout: Duration,
) -> Result<(), Error> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Running installer: {:?}", command);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(Error::DependencyInstall(format!(
                "failed to start {}: {}",
                description, e
            )))
        }
        Err(_) => {
            return Err(Error::DependencyInstall(format!(
                "{} did not finish within {}s",
                description,
                timeout.as_secs_f64()
            )))
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::DependencyInstall(format!(
            "{} exited with {}: {}",
            description,
            output.status,
            tail(stderr.trim(), INSTALL_ERROR_TAIL)
        )));
    }

    Ok(())
}

fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

pub(crate) fn check_command(cmd: &str) -> bool {
    which(cmd).is_ok()
}

#[cfg(test)]
pub(crate) fn skip_if_not_available(tools: &[&str]) -> bool {
    let missing: Vec<_> = tools
        .iter()
        .filter(|tool| which(**tool).is_err())
        .map(|s| (*s).to_string())
        .collect();

    if !missing.is_empty() {
        eprintln!("Skipping test: {} not available", missing.join(", "));
        return true;
    }
    false
}

use std::collections::HashMap;
use std::io::ErrorKind;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tempfile::TempDir;
use tokio::{fs, sync::Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::ExecutorConfig,
    error::Error,
    registry::{RuntimeRecipe, RuntimeRegistry},
    supervisor::{CommandSpec, ProcessExit, ProcessOutput, ProcessSupervisor, TrackedProcessInfo},
    types::{ExecutionContext, ExecutionMode, ExecutionResult, ExecutionStatus, ResourceLimits},
};

/// Runs code in supervised child processes.
///
/// Each executor owns a temp directory and a live-process table. Clones share
/// both, so an executor can be handed to several tasks and any of them can
/// cancel an execution started by another.
#[derive(Clone)]
pub struct CodeExecutor {
    inner: Arc<ExecutorInner>,
}

struct ExecutorInner {
    registry: RuntimeRegistry,
    supervisor: ProcessSupervisor,
    config: ExecutorConfig,
    temp_path: PathBuf,
    temp_dir: Mutex<Option<TempDir>>,
    permits: Semaphore,
}

/// Validated inputs for one run
struct Prepared {
    recipe: RuntimeRecipe,
    limits: ResourceLimits,
}

impl CodeExecutor {
    /// Create an executor with the default configuration and every built-in runtime
    pub fn new() -> Result<Self, Error> {
        Self::with_config(ExecutorConfig::default())
    }

    pub fn with_config(config: ExecutorConfig) -> Result<Self, Error> {
        Self::with_registry(config, RuntimeRegistry::new())
    }

    pub fn with_registry(config: ExecutorConfig, registry: RuntimeRegistry) -> Result<Self, Error> {
        config.validate()?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("codebox-");
        let temp_dir = match &config.temp_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        let temp_path = temp_dir.path().to_path_buf();

        info!("Created executor temp dir {}", temp_path.display());

        let supervisor = ProcessSupervisor::new(config.kill_grace_period, config.max_output_bytes);
        let permits = Semaphore::new(config.max_concurrent_executions);

        Ok(Self {
            inner: Arc::new(ExecutorInner {
                registry,
                supervisor,
                config,
                temp_path,
                temp_dir: Mutex::new(Some(temp_dir)),
                permits,
            }),
        })
    }

    /// Run `code` under `context`.
    ///
    /// Returns `Err` only for validation failures, before anything is
    /// written or spawned. Every outcome after that, including the program
    /// failing, timing out or being cancelled, is an `Ok` result with
    /// `success == false`.
    pub async fn execute(
        &self,
        code: &str,
        context: &ExecutionContext,
    ) -> Result<ExecutionResult, Error> {
        let started = Instant::now();
        let prepared = self.prepare(context)?;
        Ok(self.run(code, context, prepared, started).await)
    }

    /// Cancel a running execution. Returns `false` for unknown or finished ids.
    pub fn cancel(&self, execution_id: &str) -> bool {
        let cancelled = self.inner.supervisor.terminate(execution_id);
        if cancelled {
            info!("Cancelled execution {}", execution_id);
        } else {
            debug!("Cancel requested for untracked execution {}", execution_id);
        }
        cancelled
    }

    /// Terminate tracked processes and remove the temp directory. Idempotent.
    pub fn cleanup(&self) -> Result<(), Error> {
        let terminated = self.inner.supervisor.terminate_all();
        if terminated > 0 {
            info!("Terminated {} running execution(s) during cleanup", terminated);
        }

        let temp_dir = self.inner.temp_dir().take();
        if let Some(temp_dir) = temp_dir {
            match temp_dir.close() {
                Ok(()) => info!("Removed executor temp dir {}", self.inner.temp_path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(())
    }

    /// Ids of executions whose process is currently running
    pub fn running_executions(&self) -> Vec<String> {
        self.inner.supervisor.running()
    }

    pub fn executions(&self) -> Vec<TrackedProcessInfo> {
        self.inner.supervisor.snapshot()
    }

    pub fn temp_dir(&self) -> &Path {
        &self.inner.temp_path
    }

    pub fn is_closed(&self) -> bool {
        self.inner.temp_dir().is_none()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &RuntimeRegistry {
        &self.inner.registry
    }

    fn prepare(&self, context: &ExecutionContext) -> Result<Prepared, Error> {
        if self.is_closed() {
            return Err(Error::ExecutorClosed);
        }

        context.validate()?;
        match context.mode {
            ExecutionMode::Script => {}
        }

        let recipe = self.inner.registry.resolve(context.language)?.clone();
        let limits = context
            .resource_limits
            .clone()
            .unwrap_or_else(|| self.inner.config.default_limits.clone());

        Ok(Prepared { recipe, limits })
    }

    async fn run(
        &self,
        code: &str,
        context: &ExecutionContext,
        prepared: Prepared,
        started: Instant,
    ) -> ExecutionResult {
        let Prepared { recipe, limits } = prepared;
        let file_id = Uuid::new_v4().simple().to_string();
        let source_file = self
            .inner
            .temp_path
            .join(format!("{}.{}", file_id, recipe.extension));
        let deps_dir = self.inner.temp_path.join(format!("{}-deps", file_id));
        let scratch = Scratch::new(source_file, deps_dir);

        let result = self
            .run_source(
                code,
                context,
                &recipe,
                &limits,
                &scratch.source_file,
                &scratch.deps_dir,
                started,
            )
            .await;

        scratch.remove().await;

        match &result.error {
            None => debug!(
                "Execution of {} succeeded in {:?}",
                context.language, result.execution_time
            ),
            Some(error) => debug!(
                "Execution of {} failed ({}) in {:?}: {}",
                context.language, result.status, result.execution_time, error
            ),
        }

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_source(
        &self,
        code: &str,
        context: &ExecutionContext,
        recipe: &RuntimeRecipe,
        limits: &ResourceLimits,
        source_file: &Path,
        deps_dir: &Path,
        started: Instant,
    ) -> ExecutionResult {
        if let Err(e) = fs::write(source_file, code).await {
            return ExecutionResult::from_error(&Error::Io(e), started.elapsed());
        }

        // Version-gated interpreters shell out to `--version`.
        let resolved = {
            let recipe = recipe.clone();
            let source_file = source_file.to_path_buf();
            tokio::task::spawn_blocking(move || recipe.command_for(&source_file)).await
        };
        let command = match resolved {
            Ok(Ok(command)) => command,
            Ok(Err(e)) => return ExecutionResult::from_error(&e, started.elapsed()),
            Err(e) => {
                return ExecutionResult::from_error(
                    &Error::Spawn(format!("interpreter lookup failed: {}", e)),
                    started.elapsed(),
                )
            }
        };

        let dependency_env = match recipe
            .install
            .install(
                &command.program,
                &context.dependencies,
                deps_dir,
                self.inner.config.install_timeout,
            )
            .await
        {
            Ok(env) => env,
            Err(e) => {
                warn!("Dependency installation for {} failed: {}", context.language, e);
                return ExecutionResult::from_error(&e, started.elapsed());
            }
        };

        let spec = CommandSpec {
            program: command.program,
            args: command.args,
            env: build_env(recipe, limits, dependency_env, &context.environment_vars),
            cwd: context
                .working_directory
                .clone()
                .unwrap_or_else(|| self.inner.temp_path.clone()),
            threaded: recipe.threaded,
        };

        let _permit = match self.inner.permits.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                return ExecutionResult::from_error(
                    &Error::Spawn(format!("execution slots unavailable: {}", e)),
                    started.elapsed(),
                )
            }
        };

        let process = match self.inner.supervisor.spawn(spec, limits).await {
            Ok(process) => process,
            Err(e) => {
                warn!("{}", e);
                return ExecutionResult::from_error(&e, started.elapsed());
            }
        };

        let output = process.wait().await;
        into_result(output, limits)
    }
}

impl ExecutorInner {
    fn temp_dir(&self) -> MutexGuard<'_, Option<TempDir>> {
        self.temp_dir
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ExecutorInner {
    fn drop(&mut self) {
        let terminated = self.supervisor.terminate_all();
        if terminated > 0 {
            debug!("Terminated {} execution(s) on executor drop", terminated);
        }
    }
}

/// Recipe defaults, then installed dependency paths, then the memory flag
/// for heap-limited runtimes, then the caller's variables.
fn build_env(
    recipe: &RuntimeRecipe,
    limits: &ResourceLimits,
    dependency_env: Vec<(String, String)>,
    user_env: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = recipe.env.iter().cloned().collect();
    env.extend(dependency_env);

    if recipe.threaded {
        let heap_flag = format!("--max-old-space-size={}", limits.max_memory());
        let node_options = match std::env::var("NODE_OPTIONS") {
            Ok(existing) if !existing.trim().is_empty() => format!("{} {}", existing, heap_flag),
            _ => heap_flag,
        };
        env.insert("NODE_OPTIONS".to_string(), node_options);
    }

    env.extend(user_env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

fn into_result(output: ProcessOutput, limits: &ResourceLimits) -> ExecutionResult {
    let ProcessOutput {
        execution_id,
        exit,
        stdout,
        stderr,
        elapsed,
    } = output;

    let result = match exit {
        ProcessExit::Exited(status) if status.success() => {
            ExecutionResult::succeeded(stdout, elapsed)
        }
        ProcessExit::Exited(status) => ExecutionResult::failed(
            ExecutionStatus::Error,
            stdout,
            describe_failure(status, &stderr),
            elapsed,
        ),
        ProcessExit::TimedOut => ExecutionResult::failed(
            ExecutionStatus::Timeout,
            stdout,
            Error::Timeout(limits.max_time()).to_string(),
            elapsed,
        ),
        ProcessExit::Cancelled => ExecutionResult::failed(
            ExecutionStatus::Cancelled,
            stdout,
            Error::Cancelled.to_string(),
            elapsed,
        ),
        ProcessExit::Failed(reason) => ExecutionResult::failed(
            ExecutionStatus::Error,
            stdout,
            format!("Failed to wait for process: {}", reason),
            elapsed,
        ),
    };

    result.with_execution_id(execution_id)
}

fn describe_failure(status: ExitStatus, stderr: &str) -> String {
    let stderr = stderr.trim_end();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match (status.code(), status.signal()) {
        (Some(code), _) => format!("Process exited with status {}", code),
        (None, Some(signal)) => format!("Process terminated by signal {}", signal),
        (None, None) => format!("Process exited abnormally: {}", status),
    }
}

/// Per-run source file and dependency directory.
///
/// Removed by [`Scratch::remove`] on the normal path, or from `Drop` when the
/// execution future is dropped before it finishes.
struct Scratch {
    source_file: PathBuf,
    deps_dir: PathBuf,
    armed: bool,
}

impl Scratch {
    fn new(source_file: PathBuf, deps_dir: PathBuf) -> Self {
        Self {
            source_file,
            deps_dir,
            armed: true,
        }
    }

    async fn remove(mut self) {
        self.armed = false;
        if let Err(e) = fs::remove_file(&self.source_file).await {
            log_removal_failure(&self.source_file, e);
        }
        if let Err(e) = fs::remove_dir_all(&self.deps_dir).await {
            log_removal_failure(&self.deps_dir, e);
        }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let source_file = std::mem::take(&mut self.source_file);
        let deps_dir = std::mem::take(&mut self.deps_dir);
        let remove = move || {
            if let Err(e) = std::fs::remove_file(&source_file) {
                log_removal_failure(&source_file, e);
            }
            if let Err(e) = std::fs::remove_dir_all(&deps_dir) {
                log_removal_failure(&deps_dir, e);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Execution dropped early, removing scratch files");
                handle.spawn_blocking(remove);
            }
            Err(_) => remove(),
        }
    }
}

fn log_removal_failure(path: &Path, e: std::io::Error) {
    if e.kind() != ErrorKind::NotFound {
        warn!("Failed to remove {}: {}", path.display(), e);
    }
}

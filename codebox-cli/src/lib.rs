use anyhow::{anyhow, Context, Result};
use clap::Parser;
use codebox::{
    api::{execute_code, ExecuteCodeRequest, ExecuteCodeResponse},
    CodeExecutor, ExecutorConfig, Language, ResourceLimitsSpec,
};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

/// Exit status used when the run was interrupted with Ctrl-C
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a program under codebox resource limits", long_about = None)]
pub struct Args {
    /// Source file to run; reads standard input when absent or `-`
    pub file: Option<PathBuf>,

    /// Run a JSON execution request (`-` for standard input) instead of a source file
    #[arg(long, conflicts_with_all = ["file", "language", "dependencies", "workdir"])]
    pub request: Option<PathBuf>,

    /// Language of the source; inferred from the file extension when omitted
    #[arg(short, long)]
    pub language: Option<String>,

    /// Wall-clock limit in seconds
    #[arg(long)]
    pub max_time: Option<f64>,

    /// Memory limit in megabytes
    #[arg(long)]
    pub max_memory: Option<i64>,

    /// Maximum number of processes
    #[arg(long)]
    pub max_processes: Option<i64>,

    #[arg(long)]
    pub allow_network: bool,

    #[arg(long)]
    pub deny_file_access: bool,

    /// Environment variable for the program, as KEY=VALUE
    #[arg(short, long = "env", value_parser = parse_env_var)]
    pub env: Vec<(String, String)>,

    /// Package to install before running; repeatable
    #[arg(long = "dep")]
    pub dependencies: Vec<String>,

    /// Working directory for the program
    #[arg(short, long)]
    pub workdir: Option<PathBuf>,

    /// Executor configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print the structured result as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_env_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{}`", raw)),
    }
}

impl Args {
    pub fn load_config(&self) -> Result<ExecutorConfig> {
        match &self.config {
            Some(path) => ExecutorConfig::load(path)
                .with_context(|| format!("loading config from {}", path.display())),
            None => Ok(ExecutorConfig::default()),
        }
    }

    /// Turn the command line into a request, reading the source or the
    /// request document from disk or standard input.
    pub fn build_request(&self, config: &ExecutorConfig) -> Result<ExecuteCodeRequest> {
        let mut request = match &self.request {
            Some(path) => {
                let raw = read_input(Some(path))?;
                serde_json::from_str(&raw).context("parsing execution request")?
            }
            None => {
                let code = read_input(self.file.as_deref())?;
                ExecuteCodeRequest::new(self.language()?.as_str(), code)
            }
        };

        if !self.dependencies.is_empty() {
            request.dependencies = Some(self.dependencies.clone());
        }
        if let Some(dir) = &self.workdir {
            request.working_directory = Some(dir.display().to_string());
        }
        if !self.env.is_empty() {
            let vars = request.environment_vars.get_or_insert_with(HashMap::new);
            vars.extend(self.env.iter().cloned());
        }
        if let Some(limits) = self.resource_limits(config, request.resource_limits.take()) {
            request.resource_limits = Some(limits);
        }

        Ok(request)
    }

    fn language(&self) -> Result<Language> {
        if let Some(language) = &self.language {
            return Ok(language.parse::<Language>()?);
        }
        let extension = self
            .file
            .as_deref()
            .and_then(Path::extension)
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| anyhow!("--language is required when reading from standard input"))?;
        extension
            .parse::<Language>()
            .with_context(|| format!("cannot infer a language from `.{}`", extension))
    }

    /// Flags override the request's limits, which override the configured defaults.
    fn resource_limits(
        &self,
        config: &ExecutorConfig,
        from_request: Option<ResourceLimitsSpec>,
    ) -> Option<ResourceLimitsSpec> {
        let overridden = self.max_time.is_some()
            || self.max_memory.is_some()
            || self.max_processes.is_some()
            || self.allow_network
            || self.deny_file_access;
        if !overridden {
            return from_request;
        }

        let mut limits =
            from_request.unwrap_or_else(|| ResourceLimitsSpec::from(config.default_limits.clone()));
        if let Some(max_time) = self.max_time {
            limits.max_time = max_time;
        }
        if let Some(max_memory) = self.max_memory {
            limits.max_memory = max_memory;
        }
        if let Some(max_processes) = self.max_processes {
            limits.max_processes = max_processes;
        }
        if self.allow_network {
            limits.network_access = true;
        }
        if self.deny_file_access {
            limits.file_access = false;
        }
        Some(limits)
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading standard input")?;
            Ok(buf)
        }
    }
}

/// Run once and report. Ctrl-C cancels whatever is running.
pub async fn run(args: Args) -> Result<ExitCode> {
    let config = args.load_config()?;
    let request = args.build_request(&config)?;
    let executor = CodeExecutor::with_config(config)?;

    info!("Running {} program", request.language);

    let mut task = {
        let executor = executor.clone();
        tokio::spawn(async move { execute_code(&executor, &request).await })
    };

    let joined = tokio::select! {
        joined = &mut task => Some(joined),
        _ = tokio::signal::ctrl_c() => None,
    };

    let response = match joined {
        Some(joined) => joined.context("execution task failed")??,
        None => {
            let running = executor.running_executions();
            if running.is_empty() {
                // Still installing dependencies; dropping the task stops the installer.
                warn!("Interrupted before the program started");
                task.abort();
                executor.cleanup()?;
                return Ok(ExitCode::from(EXIT_INTERRUPTED));
            }
            for id in &running {
                warn!("Interrupted, cancelling execution {}", id);
                executor.cancel(id);
            }
            let response = task.await.context("execution task failed")??;
            report(&response, args.json)?;
            executor.cleanup()?;
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
    };

    report(&response, args.json)?;
    executor.cleanup()?;

    Ok(if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn report(response: &ExecuteCodeResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    print!("{}", response.output);
    if let Some(error) = &response.error {
        eprintln!("{}", error);
    }
    info!("Finished in {:.3}s", response.execution_time);
    Ok(())
}

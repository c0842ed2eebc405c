//! Process supervisor
//!
//! Owns the live table of running executions. Every spawned process is
//! started in its own process group, registered under a fresh execution id,
//! and raced against a watchdog and an explicit cancellation. Exactly one
//! terminal transition (exit, timeout, cancellation) removes an entry: the
//! path that removes it from the table is the one that decides the outcome.

use nix::errno::Errno;
use nix::sys::resource::{getrlimit, setrlimit, Resource};
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{error::Error, types::ResourceLimits};

/// Why a tracked process was ended from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    TimedOut,
    Cancelled,
}

/// How a supervised process ended
#[derive(Debug)]
pub enum ProcessExit {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
    /// Waiting on the child failed at the OS level
    Failed(String),
}

impl From<Termination> for ProcessExit {
    fn from(reason: Termination) -> Self {
        match reason {
            Termination::TimedOut => ProcessExit::TimedOut,
            Termination::Cancelled => ProcessExit::Cancelled,
        }
    }
}

/// Everything collected from a finished process
#[derive(Debug)]
pub struct ProcessOutput {
    pub execution_id: String,
    pub exit: ProcessExit,
    pub stdout: String,
    pub stderr: String,
    /// Time from spawn until the terminal transition
    pub elapsed: Duration,
}

/// What to run
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Layered over the inherited environment
    pub env: HashMap<String, String>,
    pub cwd: PathBuf,
    /// Skip the address-space and task-count ceilings
    pub threaded: bool,
}

struct TrackedProcess {
    pgid: Pid,
    started: Instant,
    limits: ResourceLimits,
    notify: oneshot::Sender<Termination>,
}

/// Read-only view of a live table entry
#[derive(Debug, Clone)]
pub struct TrackedProcessInfo {
    pub execution_id: String,
    pub pid: i32,
    pub running_for: Duration,
    pub limits: ResourceLimits,
}

type ProcessTable = Arc<Mutex<HashMap<String, TrackedProcess>>>;

fn lock(table: &ProcessTable) -> MutexGuard<'_, HashMap<String, TrackedProcess>> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone)]
pub struct ProcessSupervisor {
    table: ProcessTable,
    grace_period: Duration,
    max_output_bytes: usize,
}

impl ProcessSupervisor {
    pub fn new(grace_period: Duration, max_output_bytes: usize) -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
            grace_period,
            max_output_bytes,
        }
    }

    /// Start `spec` in a new process group under `limits` and begin tracking it.
    ///
    /// The returned handle must be awaited with [`RunningProcess::wait`];
    /// dropping it kills the process group and removes the entry.
    pub async fn spawn(
        &self,
        spec: CommandSpec,
        limits: &ResourceLimits,
    ) -> Result<RunningProcess, Error> {
        let execution_id = Uuid::new_v4().to_string();

        // Sizing the task ceiling walks /proc.
        let plan = {
            let limits = limits.clone();
            let threaded = spec.threaded;
            tokio::task::spawn_blocking(move || LimitPlan::for_limits(&limits, threaded))
                .await
                .map_err(|e| Error::Spawn(format!("failed to compute limits: {}", e)))?
        };

        debug!("Spawning {} - Command: {}", execution_id, spec.program.display());
        debug!("Spawning {} - Args: {:?}", execution_id, spec.args);
        debug!("Spawning {} - Cwd: {}", execution_id, spec.cwd.display());
        debug!("Spawning {} - Limits: {:?}", execution_id, plan);

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .process_group(0);

        // SAFETY: the hook only issues raw syscalls on values computed
        // before the fork; it neither allocates nor takes locks.
        unsafe {
            command.pre_exec(move || plan.apply());
        }

        let mut child = command
            .spawn()
            .map_err(|e| Error::Spawn(format!("{}: {}", spec.program.display(), e)))?;

        let pid = child
            .id()
            .ok_or_else(|| Error::Spawn("process exited before it could be tracked".to_string()))?;
        let pgid = Pid::from_raw(pid as i32);

        let stdout = Capture::start(child.stdout.take(), self.max_output_bytes);
        let stderr = Capture::start(child.stderr.take(), self.max_output_bytes);

        let started = Instant::now();
        let deadline = started.checked_add(limits.max_time());
        let (notify, termination) = oneshot::channel();
        lock(&self.table).insert(
            execution_id.clone(),
            TrackedProcess {
                pgid,
                started,
                limits: limits.clone(),
                notify,
            },
        );

        let watchdog = tokio::spawn(watchdog(self.clone(), execution_id.clone(), deadline));

        debug!("Tracking execution {} as pid {}", execution_id, pid);

        Ok(RunningProcess {
            execution_id,
            child,
            pgid,
            started,
            termination,
            watchdog,
            stdout,
            stderr,
            table: self.table.clone(),
            grace_period: self.grace_period,
        })
    }

    /// Cancel a tracked execution. Returns `false` if the id is not live.
    pub fn terminate(&self, execution_id: &str) -> bool {
        self.terminate_with(execution_id, Termination::Cancelled)
    }

    /// Terminate every tracked execution and return how many were live.
    pub fn terminate_all(&self) -> usize {
        let ids: Vec<String> = lock(&self.table).keys().cloned().collect();
        ids.iter().filter(|id| self.terminate(id)).count()
    }

    fn terminate_with(&self, execution_id: &str, reason: Termination) -> bool {
        let entry = lock(&self.table).remove(execution_id);
        match entry {
            Some(tracked) => {
                signal_process(tracked.pgid, Signal::SIGTERM);
                // The waiter may already be gone if its future was dropped.
                let _ = tracked.notify.send(reason);
                true
            }
            None => false,
        }
    }

    pub fn is_tracked(&self, execution_id: &str) -> bool {
        lock(&self.table).contains_key(execution_id)
    }

    /// Ids of all live executions
    pub fn running(&self) -> Vec<String> {
        lock(&self.table).keys().cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<TrackedProcessInfo> {
        lock(&self.table)
            .iter()
            .map(|(id, tracked)| TrackedProcessInfo {
                execution_id: id.clone(),
                pid: tracked.pgid.as_raw(),
                running_for: tracked.started.elapsed(),
                limits: tracked.limits.clone(),
            })
            .collect()
    }
}

async fn watchdog(supervisor: ProcessSupervisor, execution_id: String, deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        // Past the end of the clock; the process can only exit or be cancelled.
        None => return,
    }
    if supervisor.terminate_with(&execution_id, Termination::TimedOut) {
        warn!("Execution {} exceeded its time limit", execution_id);
    }
}

/// Handle to a spawned, tracked process
pub struct RunningProcess {
    execution_id: String,
    child: Child,
    pgid: Pid,
    started: Instant,
    termination: oneshot::Receiver<Termination>,
    watchdog: JoinHandle<()>,
    stdout: Capture,
    stderr: Capture,
    table: ProcessTable,
    grace_period: Duration,
}

enum Race {
    Exited(io::Result<ExitStatus>),
    Terminated(Termination),
}

impl RunningProcess {
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn pid(&self) -> i32 {
        self.pgid.as_raw()
    }

    /// Wait for exit, timeout or cancellation, whichever happens first.
    pub async fn wait(mut self) -> ProcessOutput {
        let race = tokio::select! {
            status = self.child.wait() => Race::Exited(status),
            reason = &mut self.termination => {
                Race::Terminated(reason.unwrap_or(Termination::Cancelled))
            }
        };
        let elapsed = self.started.elapsed();
        self.watchdog.abort();

        let exit = match race {
            Race::Exited(status) => {
                if self.claim() {
                    match status {
                        Ok(status) => ProcessExit::Exited(status),
                        Err(e) => {
                            error!("Failed to wait on execution {}: {}", self.execution_id, e);
                            ProcessExit::Failed(e.to_string())
                        }
                    }
                } else {
                    // Exited after a timeout or cancel already took the entry.
                    let reason = (&mut self.termination)
                        .await
                        .unwrap_or(Termination::Cancelled);
                    ProcessExit::from(reason)
                }
            }
            Race::Terminated(reason) => {
                self.reap().await;
                ProcessExit::from(reason)
            }
        };

        // Anything the program left behind in its group goes too.
        signal_group(self.pgid, Signal::SIGKILL);

        let stdout = self.stdout.collect(self.grace_period).await;
        let stderr = self.stderr.collect(self.grace_period).await;

        debug!("Execution {} finished: {:?}", self.execution_id, exit);

        ProcessOutput {
            execution_id: self.execution_id.clone(),
            exit,
            stdout,
            stderr,
            elapsed,
        }
    }

    fn claim(&self) -> bool {
        lock(&self.table).remove(&self.execution_id).is_some()
    }

    /// Give the process the grace period to exit after SIGTERM, then SIGKILL.
    async fn reap(&mut self) {
        if time::timeout(self.grace_period, self.child.wait()).await.is_ok() {
            return;
        }
        info!(
            "Execution {} ignored SIGTERM, sending SIGKILL",
            self.execution_id
        );
        signal_process(self.pgid, Signal::SIGKILL);
        if let Err(e) = self.child.wait().await {
            warn!("Failed to reap execution {}: {}", self.execution_id, e);
        }
    }
}

impl Drop for RunningProcess {
    fn drop(&mut self) {
        self.watchdog.abort();
        if self.claim() {
            debug!("Execution {} dropped while running", self.execution_id);
            signal_process(self.pgid, Signal::SIGKILL);
        }
    }
}

/// Signal the group, and the leader directly in case it has not yet moved
/// into its own group.
fn signal_process(pgid: Pid, signal: Signal) {
    signal_group(pgid, signal);
    match kill(pgid, signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to send {} to {}: {}", signal, pgid, e),
    }
}

fn signal_group(pgid: Pid, signal: Signal) {
    match killpg(pgid, signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to send {} to group {}: {}", signal, pgid, e),
    }
}

/// Bounded reader for one output pipe.
///
/// Bytes land in a shared buffer as they are read, so whatever arrived
/// before the reader is abandoned is still reported.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    reader: JoinHandle<()>,
}

impl Capture {
    fn start<R>(pipe: Option<R>, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = buf.clone();
        let reader = tokio::spawn(async move {
            let Some(mut pipe) = pipe else {
                return;
            };
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => {
                        // Past the cap the pipe is still drained so the
                        // writer never blocks.
                        let mut buf = sink.lock().unwrap_or_else(|p| p.into_inner());
                        let room = limit.saturating_sub(buf.len());
                        buf.extend_from_slice(&chunk[..n.min(room)]);
                    }
                    Err(e) => {
                        debug!("Output pipe closed with error: {}", e);
                        break;
                    }
                }
            }
        });
        Self { buf, reader }
    }

    async fn collect(&mut self, grace: Duration) -> String {
        match time::timeout(grace.max(Duration::from_millis(100)), &mut self.reader).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Output reader failed: {}", e),
            Err(_) => {
                // A descendant that left the group still holds the pipe open.
                self.reader.abort();
                warn!("Output pipe still open after the process ended");
            }
        }
        let bytes = std::mem::take(&mut *self.buf.lock().unwrap_or_else(|p| p.into_inner()));
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Kernel limits applied in the child between fork and exec
#[derive(Debug, Clone, Copy, Default)]
struct LimitPlan {
    address_space: Option<u64>,
    cpu_seconds: Option<u64>,
    tasks: Option<u64>,
    file_size: Option<u64>,
    isolate_network: bool,
}

impl LimitPlan {
    fn for_limits(limits: &ResourceLimits, threaded: bool) -> Self {
        let mut plan = LimitPlan {
            isolate_network: !limits.network_access(),
            ..Default::default()
        };

        if !threaded {
            plan.address_space = Some(clamp(Resource::RLIMIT_AS, limits.max_memory_bytes()));
            let cpu = (limits.max_time().as_secs_f64().ceil() as u64).saturating_add(1);
            plan.cpu_seconds = Some(clamp(Resource::RLIMIT_CPU, cpu));
            plan.tasks = task_ceiling(limits.max_processes())
                .map(|tasks| clamp(Resource::RLIMIT_NPROC, tasks));
        }

        if !limits.file_access() {
            plan.file_size = Some(0);
        }

        plan
    }

    fn apply(&self) -> io::Result<()> {
        #[cfg(target_os = "linux")]
        if self.isolate_network {
            use nix::sched::{unshare, CloneFlags};
            // Refused without user namespace support; network isolation is
            // best-effort.
            let _ = unshare(CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWNET);
        }

        if let Some(bytes) = self.address_space {
            setrlimit(Resource::RLIMIT_AS, bytes, bytes)?;
        }
        if let Some(secs) = self.cpu_seconds {
            setrlimit(Resource::RLIMIT_CPU, secs, secs)?;
        }
        if let Some(tasks) = self.tasks {
            setrlimit(Resource::RLIMIT_NPROC, tasks, tasks)?;
        }
        if let Some(bytes) = self.file_size {
            setrlimit(Resource::RLIMIT_FSIZE, bytes, bytes)?;
        }
        Ok(())
    }
}

/// Never ask for more than the current hard limit.
fn clamp(resource: Resource, value: u64) -> u64 {
    match getrlimit(resource) {
        Ok((_, hard)) => value.min(hard),
        Err(_) => value,
    }
}

/// RLIMIT_NPROC counts every task of the real user, so the ceiling is the
/// user's current task count plus the allowance. Root is exempt from the
/// limit and gets none.
#[cfg(target_os = "linux")]
fn task_ceiling(max_processes: u32) -> Option<u64> {
    let uid = nix::unistd::getuid();
    if uid.is_root() {
        return None;
    }
    user_task_count(uid.as_raw()).map(|current| current + u64::from(max_processes))
}

#[cfg(not(target_os = "linux"))]
fn task_ceiling(_max_processes: u32) -> Option<u64> {
    None
}

#[cfg(target_os = "linux")]
fn user_task_count(uid: u32) -> Option<u64> {
    let mut total = 0u64;
    for entry in std::fs::read_dir("/proc").ok()?.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let Ok(status) = std::fs::read_to_string(entry.path().join("status")) else {
            continue;
        };

        let mut owner = None;
        let mut threads = 0u64;
        for line in status.lines() {
            if let Some(rest) = line.strip_prefix("Uid:") {
                owner = rest.split_whitespace().next().and_then(|v| v.parse::<u32>().ok());
            } else if let Some(rest) = line.strip_prefix("Threads:") {
                threads = rest.trim().parse().unwrap_or(1);
            }
        }
        if owner == Some(uid) {
            total += threads;
        }
    }
    Some(total)
}

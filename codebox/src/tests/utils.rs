pub mod defaults {
    use crate::{CodeExecutor, ExecutorConfig, ResourceLimits};
    use tokio::time::{sleep, Duration, Instant};

    pub fn default_test_limits() -> ResourceLimits {
        ResourceLimits::new(default_timeout(), 256, 1).unwrap()
    }

    /// For shell programs that fork external commands. RLIMIT_NPROC is
    /// counted per user, so leave room for concurrently running tests.
    pub fn forking_limits() -> ResourceLimits {
        ResourceLimits::new(default_timeout(), 256, 64).unwrap()
    }

    pub fn limits_with_time(max_time: Duration) -> ResourceLimits {
        ResourceLimits::new(max_time, 256, 64).unwrap()
    }

    pub fn default_timeout() -> Duration {
        Duration::from_secs(10)
    }

    pub fn test_config() -> ExecutorConfig {
        ExecutorConfig::default()
            .with_default_limits(default_test_limits())
            .with_kill_grace_period(Duration::from_millis(200))
    }

    pub fn test_executor() -> CodeExecutor {
        CodeExecutor::with_config(test_config()).unwrap()
    }

    /// Poll the live table until an execution shows up.
    pub async fn wait_for_running(executor: &CodeExecutor, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(id) = executor.running_executions().into_iter().next() {
                return Some(id);
            }
            sleep(Duration::from_millis(10)).await;
        }
        None
    }
}

pub mod process {
    /// True once `pid` is gone or only a zombie is left.
    #[cfg(target_os = "linux")]
    pub fn is_dead(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Err(_) => true,
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
        }
    }

    pub fn running_as_root() -> bool {
        nix::unistd::getuid().is_root()
    }
}

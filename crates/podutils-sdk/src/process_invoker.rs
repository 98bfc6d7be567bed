use crate::string_util::StringUtil;
use crate::trace::TraceWriter;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Grace period used when the caller does not configure one.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(15);

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// A process log shared by the stdout and stderr copy tasks.
type SharedLog = Arc<Mutex<File>>;

/// Everything needed to launch one supervised process.
#[derive(Debug, Clone, Default)]
pub struct ProcessStartInfo {
    /// Executable followed by its arguments. Must not be empty.
    pub args: Vec<String>,
    /// Working directory for the child; inherits ours when `None`.
    pub working_directory: Option<PathBuf>,
    /// Extra environment variables layered over the inherited environment.
    pub environment: HashMap<String, String>,
    /// File receiving both output streams (truncated on open).
    pub log_file: Option<PathBuf>,
    /// Wall-clock limit for the child.
    pub timeout: Option<Duration>,
    /// Time between the termination signal and the forced kill.
    pub grace_period: Option<Duration>,
}

impl ProcessStartInfo {
    pub fn new(args: Vec<String>) -> Self {
        Self {
            args,
            ..Self::default()
        }
    }
}

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The process exited on its own.
    Exited(i32),
    /// The process outlived its timeout and was terminated.
    TimedOut { exit_code: i32 },
    /// The caller's cancellation token fired and the process was terminated.
    Cancelled { exit_code: i32 },
}

impl ProcessOutcome {
    /// The raw status the process ended with (`128 + n` when killed by signal `n`).
    pub fn exit_code(&self) -> i32 {
        match *self {
            ProcessOutcome::Exited(code) => code,
            ProcessOutcome::TimedOut { exit_code } => exit_code,
            ProcessOutcome::Cancelled { exit_code } => exit_code,
        }
    }
}

/// Failures to launch or supervise a process. A non-zero exit is not an error.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("no command given")]
    EmptyCommand,

    #[error("could not resolve executable '{file_name}': {source}")]
    NotFound {
        file_name: String,
        #[source]
        source: which::Error,
    },

    #[error("failed to start process '{file_name}': {source}")]
    Launch {
        file_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open process log '{}': {source}", path.display())]
    ProcessLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for process {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Spawns a child process, copies stdout and stderr on separate tasks into a
/// process log (and optionally our own stdout/stderr), and enforces a timeout
/// and cancellation with a graceful-then-forced termination.
///
/// On unix the child leads its own process group, and termination signals go
/// to the whole group so helpers spawned by the command do not linger.
pub struct ProcessInvoker {
    trace: Arc<dyn TraceWriter>,
    forward_output: bool,
}

impl ProcessInvoker {
    /// Create a new `ProcessInvoker` that forwards child output to our own streams.
    pub fn new(trace: Arc<dyn TraceWriter>) -> Self {
        Self {
            trace,
            forward_output: true,
        }
    }

    /// Enable or disable mirroring child output onto our stdout/stderr.
    pub fn with_output_forwarding(mut self, forward: bool) -> Self {
        self.forward_output = forward;
        self
    }

    /// Run the process described by `start` to completion, timeout or cancellation.
    pub async fn execute(
        &self,
        start: &ProcessStartInfo,
        cancellation_token: CancellationToken,
    ) -> Result<ProcessOutcome, ProcessError> {
        let (file_name, arguments) = start.args.split_first().ok_or(ProcessError::EmptyCommand)?;

        // Replace the log before anything else can fail.
        let log = match start.log_file {
            Some(ref path) => Some(Arc::new(Mutex::new(open_process_log(path).await?))),
            None => None,
        };

        let executable = which::which(file_name).map_err(|source| ProcessError::NotFound {
            file_name: file_name.clone(),
            source,
        })?;

        let grace_period = start.grace_period.unwrap_or(DEFAULT_GRACE_PERIOD);

        self.trace.info("Starting process:");
        self.trace
            .info(&format!("  File name: '{}'", executable.display()));
        self.trace
            .info(&format!("  Arguments: '{}'", arguments.join(" ")));
        if let Some(ref dir) = start.working_directory {
            self.trace
                .info(&format!("  Working directory: '{}'", dir.display()));
        }
        if let Some(timeout) = start.timeout {
            self.trace.info(&format!(
                "  Timeout: '{}', grace period: '{}'",
                StringUtil::format_duration(timeout),
                StringUtil::format_duration(grace_period)
            ));
        }

        let mut cmd = Command::new(&executable);
        cmd.args(arguments);
        if let Some(ref dir) = start.working_directory {
            cmd.current_dir(dir);
        }
        cmd.envs(&start.environment);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|source| ProcessError::Launch {
            file_name: file_name.clone(),
            source,
        })?;

        let pid = child.id();
        self.trace.info(&format!(
            "Process started with process id {}, waiting for process exit.",
            pid.unwrap_or(0)
        ));

        let stdout_task = child.stdout.take().map(|stdout| {
            tokio::spawn(copy_stream(
                stdout,
                log.clone(),
                self.forward_output.then(tokio::io::stdout),
            ))
        });
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(copy_stream(
                stderr,
                log.clone(),
                self.forward_output.then(tokio::io::stderr),
            ))
        });

        let outcome = tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|source| ProcessError::Wait {
                    pid: pid.unwrap_or(0),
                    source,
                })?;
                ProcessOutcome::Exited(exit_code_of(status))
            }
            _ = deadline(start.timeout) => {
                self.trace.warning(&format!(
                    "Process did not finish before {} timeout.",
                    StringUtil::format_duration(start.timeout.unwrap_or_default())
                ));
                let exit_code = self.terminate(&mut child, pid, grace_period).await;
                ProcessOutcome::TimedOut { exit_code }
            }
            _ = cancellation_token.cancelled() => {
                self.trace.info("Cancellation requested, terminating process.");
                let exit_code = self.terminate(&mut child, pid, grace_period).await;
                ProcessOutcome::Cancelled { exit_code }
            }
        };

        // Helpers left running in the background can hold the pipes open after
        // the command itself is gone; they get the grace period, then the group
        // is killed and the copy abandoned.
        let drain_deadline = tokio::time::Instant::now() + grace_period;
        for (name, task) in [("STDOUT", stdout_task), ("STDERR", stderr_task)] {
            let Some(mut task) = task else { continue };
            match tokio::time::timeout_at(drain_deadline, &mut task).await {
                Ok(Ok(Ok(bytes))) => self
                    .trace
                    .verbose(&format!("{name} stream read finished after {bytes} bytes.")),
                Ok(Ok(Err(e))) => self
                    .trace
                    .warning(&format!("{name} stream copy failed: {e}")),
                Ok(Err(e)) => self
                    .trace
                    .warning(&format!("{name} stream task failed: {e}")),
                Err(_) => {
                    self.trace.warning(&format!(
                        "{name} stream still open {} after the process ended, killing leftover processes.",
                        StringUtil::format_duration(grace_period)
                    ));
                    self.signal_group(pid, GroupSignal::Kill);
                    task.abort();
                }
            }
        }

        if let Some(log) = log {
            let mut file = log.lock().await;
            if let Err(e) = file.flush().await {
                self.trace
                    .warning(&format!("Failed to flush process log: {e}"));
            }
            if let Err(e) = file.sync_all().await {
                self.trace
                    .warning(&format!("Failed to sync process log: {e}"));
            }
        }

        self.trace.info(&format!(
            "Finished process {} with exit code {}, and elapsed time {:.2?}.",
            pid.unwrap_or(0),
            outcome.exit_code(),
            started.elapsed()
        ));

        Ok(outcome)
    }

    /// Ask the process group to stop, wait out the grace period, then kill it.
    async fn terminate(&self, child: &mut Child, pid: Option<u32>, grace_period: Duration) -> i32 {
        if self.signal_group(pid, GroupSignal::Terminate) {
            self.trace.info(&format!(
                "Waiting for process exit or {} after termination signal.",
                StringUtil::format_duration(grace_period)
            ));
            match tokio::time::timeout(grace_period, child.wait()).await {
                Ok(Ok(status)) => {
                    self.trace
                        .info("Process terminated successfully through termination signal.");
                    // Reap anything the command left behind in its group.
                    self.signal_group(pid, GroupSignal::Kill);
                    return exit_code_of(status);
                }
                Ok(Err(e)) => {
                    self.trace
                        .warning(&format!("Failed to wait for terminated process: {e}"));
                }
                Err(_) => {
                    self.trace.warning(&format!(
                        "Process did not honor termination signal within {}.",
                        StringUtil::format_duration(grace_period)
                    ));
                }
            }
        }

        self.trace.info("Killing process group.");
        self.signal_group(pid, GroupSignal::Kill);
        if let Err(e) = child.start_kill() {
            self.trace.verbose(&format!("start_kill: {e}"));
        }
        match child.wait().await {
            Ok(status) => exit_code_of(status),
            Err(e) => {
                self.trace
                    .error(&format!("Failed to wait for killed process: {e}"));
                -1
            }
        }
    }

    /// Send `signal` to the process group led by `pid`.
    /// Returns `true` if the signal was delivered.
    #[cfg(unix)]
    fn signal_group(&self, pid: Option<u32>, signal: GroupSignal) -> bool {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(pid) = pid else { return false };
        let sig = match signal {
            GroupSignal::Terminate => Signal::SIGTERM,
            GroupSignal::Kill => Signal::SIGKILL,
        };
        match killpg(Pid::from_raw(pid as i32), sig) {
            Ok(()) => {
                self.trace
                    .verbose(&format!("Sent {sig:?} to process group {pid}."));
                true
            }
            Err(e) => {
                self.trace
                    .verbose(&format!("{sig:?} could not be sent to process group {pid}: {e}"));
                false
            }
        }
    }

    /// Without process groups there is no graceful signal; callers fall through to kill.
    #[cfg(not(unix))]
    fn signal_group(&self, _pid: Option<u32>, _signal: GroupSignal) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending::<()>().await,
    }
}

async fn open_process_log(path: &std::path::Path) -> Result<File, ProcessError> {
    let to_error = |source| ProcessError::ProcessLog {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(to_error)?;
        }
    }
    File::create(path).await.map_err(to_error)
}

/// Copy one child stream into the shared log and, optionally, a forward sink.
///
/// Chunks are written in read order, so each stream keeps its own ordering
/// inside the log even though the two streams interleave.
async fn copy_stream<R, W>(
    mut reader: R,
    log: Option<SharedLog>,
    mut forward: Option<W>,
) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        if let Some(ref log) = log {
            log.lock().await.write_all(&buffer[..n]).await?;
        }
        if let Some(ref mut sink) = forward {
            // A closed stdout must not stop log capture.
            if sink.write_all(&buffer[..n]).await.is_ok() {
                let _ = sink.flush().await;
            }
        }
        total += n as u64;
    }
    Ok(total)
}

/// The exit code, or `128 + signal` for a process killed by a signal.
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::trace::NullTraceWriter;

    fn make_invoker() -> ProcessInvoker {
        ProcessInvoker::new(Arc::new(NullTraceWriter)).with_output_forwarding(false)
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn execute_captures_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("logs/process-log.txt");
        let mut start = ProcessStartInfo::new(sh("echo out; echo err 1>&2"));
        start.log_file = Some(log.clone());

        let outcome = make_invoker()
            .execute(&start, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, ProcessOutcome::Exited(0));
        let contents = std::fs::read_to_string(&log).unwrap();
        assert!(contents.contains("out\n"));
        assert!(contents.contains("err\n"));
    }

    #[tokio::test]
    async fn execute_truncates_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("process-log.txt");
        std::fs::write(&log, "stale output").unwrap();
        let mut start = ProcessStartInfo::new(vec!["true".to_string()]);
        start.log_file = Some(log.clone());

        make_invoker()
            .execute(&start, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&log).unwrap(), "");
    }

    #[tokio::test]
    async fn execute_preserves_stream_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("process-log.txt");
        let mut start = ProcessStartInfo::new(sh("for i in 1 2 3 4 5; do echo $i; done"));
        start.log_file = Some(log.clone());

        make_invoker()
            .execute(&start, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&log).unwrap(), "1\n2\n3\n4\n5\n");
    }

    #[tokio::test]
    async fn execute_nonzero_exit_is_not_an_error() {
        let start = ProcessStartInfo::new(sh("exit 3"));
        let outcome = make_invoker()
            .execute(&start, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Exited(3));
    }

    #[tokio::test]
    async fn execute_reports_signal_as_offset_code() {
        let start = ProcessStartInfo::new(sh("kill -9 $$"));
        let outcome = make_invoker()
            .execute(&start, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Exited(137));
    }

    #[tokio::test]
    async fn execute_passes_environment() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("process-log.txt");
        let mut start = ProcessStartInfo::new(sh("echo $MY_TEST_VAR"));
        start
            .environment
            .insert("MY_TEST_VAR".to_string(), "test_value_123".to_string());
        start.log_file = Some(log.clone());

        make_invoker()
            .execute(&start, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&log).unwrap(), "test_value_123\n");
    }

    #[tokio::test]
    async fn execute_nonexistent() {
        let start = ProcessStartInfo::new(vec!["nonexistent_command_xyz_123".to_string()]);
        let err = make_invoker()
            .execute(&start, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::NotFound { .. }));
    }

    #[tokio::test]
    async fn execute_empty_command() {
        let start = ProcessStartInfo::default();
        let err = make_invoker()
            .execute(&start, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::EmptyCommand));
    }

    #[tokio::test]
    async fn execute_times_out() {
        let mut start = ProcessStartInfo::new(sh("sleep 30"));
        start.timeout = Some(Duration::from_millis(200));
        start.grace_period = Some(Duration::from_secs(5));

        let begun = Instant::now();
        let outcome = make_invoker()
            .execute(&start, CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(outcome, ProcessOutcome::TimedOut { .. }));
        assert!(begun.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn execute_kills_after_grace_period() {
        let mut start = ProcessStartInfo::new(sh("trap '' TERM; sleep 30"));
        start.timeout = Some(Duration::from_millis(200));
        start.grace_period = Some(Duration::from_millis(200));

        let begun = Instant::now();
        let outcome = make_invoker()
            .execute(&start, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, ProcessOutcome::TimedOut { exit_code: 137 });
        assert!(begun.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn execute_cancelled() {
        let start = ProcessStartInfo::new(sh("sleep 30"));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let outcome = make_invoker().execute(&start, cancel).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Cancelled { .. }));
    }

    #[tokio::test]
    async fn execute_returns_when_background_helper_holds_pipes() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("process-log.txt");
        let mut start = ProcessStartInfo::new(sh("sleep 20 & echo started"));
        start.log_file = Some(log.clone());
        start.timeout = Some(Duration::from_millis(500));
        start.grace_period = Some(Duration::from_millis(200));

        let begun = Instant::now();
        let outcome = tokio::time::timeout(
            Duration::from_secs(8),
            make_invoker().execute(&start, CancellationToken::new()),
        )
        .await
        .expect("execute must not wait on leftover helpers")
        .unwrap();

        assert_eq!(outcome, ProcessOutcome::Exited(0));
        assert!(begun.elapsed() < Duration::from_secs(5));
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "started\n");
    }

    #[tokio::test]
    async fn execute_nonexistent_still_truncates_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("process-log.txt");
        std::fs::write(&log, "output from an earlier run").unwrap();
        let mut start = ProcessStartInfo::new(vec!["/definitely/not/a/binary".to_string()]);
        start.log_file = Some(log.clone());

        let err = make_invoker()
            .execute(&start, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::NotFound { .. }));
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "");
    }
}

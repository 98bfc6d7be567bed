// Entrypoint: runs one container's real command under supervision and
// leaves exactly one marker behind, whatever happens.

use podutils_common::constants::{defaults, env, return_code};
use podutils_common::{EntrypointOptions, Marker};
use podutils_sdk::{PollThrottler, ProcessInvoker, ProcessOutcome, ProcessStartInfo, StringUtil, TraceWriter};
use std::any::Any;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct Entrypoint {
    options: EntrypointOptions,
    trace: Arc<dyn TraceWriter>,
    forward_output: bool,
}

impl Entrypoint {
    pub fn new(options: EntrypointOptions, trace: Arc<dyn TraceWriter>) -> Self {
        Self {
            options,
            trace,
            forward_output: true,
        }
    }

    /// Enable or disable mirroring the command's output onto our own streams.
    pub fn with_output_forwarding(mut self, forward: bool) -> Self {
        self.forward_output = forward;
        self
    }

    /// Supervise the command, write the marker and return the process exit code.
    ///
    /// Every path ends in the marker write, including a launch failure, a failed
    /// previous step and a panic inside supervision.
    pub async fn run(&self, cancel: CancellationToken) -> i32 {
        let marker = self.supervise(cancel).await;
        let code = marker.exit_code();

        if let Some(error) = &marker.error {
            self.trace.warning(&format!(
                "{} finished with code {code}: {error}",
                self.options.display_name()
            ));
        } else {
            self.trace.info(&format!(
                "{} finished with code {code}",
                self.options.display_name()
            ));
        }

        if let Err(e) = marker.write(&self.options.marker_file) {
            self.trace.error(&format!("{e}"));
            return return_code::INTERNAL_ERROR;
        }

        if self.options.always_zero {
            return return_code::SUCCESS;
        }
        code
    }

    /// Run `execute` on its own task so a panic still yields a marker.
    async fn supervise(&self, cancel: CancellationToken) -> Marker {
        let this = self.clone();
        let handle = tokio::spawn(async move { this.execute(cancel).await });

        match handle.await {
            Ok(marker) => marker,
            Err(e) if e.is_panic() => Marker::internal_error(format!(
                "entrypoint panicked: {}",
                panic_message(e.into_panic())
            )),
            Err(e) => Marker::internal_error(format!("supervision task failed: {e}")),
        }
    }

    async fn execute(&self, cancel: CancellationToken) -> Marker {
        if let Some(previous) = &self.options.previous_marker {
            if let Some(marker) = self.wait_for_previous(previous, &cancel).await {
                return marker;
            }
        }

        let mut start = ProcessStartInfo::new(self.options.args.clone());
        start.timeout = self.timeout();
        start.grace_period = self.options.grace_period;
        if !self.options.process_log.as_os_str().is_empty() {
            start.log_file = Some(self.options.process_log.clone());
        }

        if let Some(dir) = &self.options.artifact_dir {
            if let Err(e) = std::fs::create_dir_all(dir) {
                return self.launch_failed(
                    format!("could not create artifact directory '{}': {e}", dir.display()),
                    LogState::Untouched,
                );
            }
            start
                .environment
                .insert(env::ARTIFACTS.to_string(), dir.display().to_string());
        }

        let invoker =
            ProcessInvoker::new(self.trace.clone()).with_output_forwarding(self.forward_output);
        match invoker.execute(&start, cancel).await {
            Ok(ProcessOutcome::Exited(code)) => Marker::exited(code),
            Ok(ProcessOutcome::TimedOut { exit_code }) => Marker::failed(
                return_code::TIMEOUT,
                format!(
                    "process timed out after {} (terminated with {exit_code})",
                    StringUtil::format_duration(start.timeout.unwrap_or_default())
                ),
            ),
            Ok(ProcessOutcome::Cancelled { exit_code }) => Marker::failed(
                return_code::ABORTED,
                format!("entrypoint interrupted (process terminated with {exit_code})"),
            ),
            Err(e) => self.launch_failed(format!("could not run process: {e}"), LogState::Opened),
        }
    }

    /// An unset or zero timeout means the command may run indefinitely.
    fn timeout(&self) -> Option<std::time::Duration> {
        self.options.timeout.filter(|t| !t.is_zero())
    }

    /// Wait for the previous step's marker. `Some` is the marker this
    /// entrypoint should write instead of running the command.
    async fn wait_for_previous(&self, previous: &Path, cancel: &CancellationToken) -> Option<Marker> {
        self.trace.info(&format!(
            "Waiting for previous step marker {}",
            previous.display()
        ));
        let mut throttler = PollThrottler::new(defaults::POLL_INTERVAL, defaults::MAX_POLL_INTERVAL);

        match Marker::wait_for(previous, &mut throttler, cancel).await {
            Ok(Some(marker)) if marker.is_success() => None,
            Ok(Some(marker)) => Some(Marker::failed(
                return_code::PREVIOUS_STEP_FAILED,
                match marker.return_code {
                    Some(code) => format!("previous step failed with code {code}"),
                    None => "previous step did not complete".to_string(),
                },
            )),
            Ok(None) => Some(Marker::failed(
                return_code::ABORTED,
                "entrypoint interrupted while waiting for the previous step",
            )),
            Err(e) => Some(Marker::failed(
                return_code::PREVIOUS_STEP_FAILED,
                format!("could not read previous step marker: {e}"),
            )),
        }
    }

    /// The command never ran. The reason also goes to the process log so it
    /// shows up next to the output the command would have produced.
    fn launch_failed(&self, error: String, log_state: LogState) -> Marker {
        let log = &self.options.process_log;
        if !log.as_os_str().is_empty() {
            let mut open = std::fs::OpenOptions::new();
            match log_state {
                LogState::Untouched => open.write(true).truncate(true),
                LogState::Opened => open.append(true),
            };
            let recorded = open
                .create(true)
                .open(log)
                .and_then(|mut file| writeln!(file, "{error}"));
            if let Err(e) = recorded {
                self.trace.warning(&format!(
                    "Could not record launch failure in {}: {e}",
                    log.display()
                ));
            }
        }
        Marker::internal_error(error)
    }
}

/// Whether the process invoker already replaced the process log this run.
#[derive(Debug, Clone, Copy)]
enum LogState {
    Untouched,
    Opened,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// Sidecar coordinator: waits for every sibling's marker under one deadline,
// ships logs and artifacts, and reports the verdict once.

use futures::future::join_all;
use podutils_common::constants::artifact_keys;
use podutils_common::{
    Failure, FailureReason, Marker, MarkerError, SecretMasker, SidecarOptions, Verdict,
};
use podutils_publish::{ArtifactStore, StatusReporter};
use podutils_sdk::{PollThrottler, StringUtil, TraceWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::artifacts::{self, Upload};
use crate::phase::{Phase, PhaseTracker};

/// Exit code of a sidecar run that failed.
pub const SIDECAR_FAILURE: i32 = 1;

/// Problems with the coordination machinery, as opposed to test failures.
#[derive(Debug, thiserror::Error)]
pub enum SidecarError {
    #[error("marker of {entry} is unusable: {source}")]
    Marker {
        entry: String,
        #[source]
        source: MarkerError,
    },

    #[error("waiting for the marker of {entry} failed: {reason}")]
    WaitTask { entry: String, reason: String },

    #[error("failed to load secrets for censoring: {0:#}")]
    Censoring(#[source] anyhow::Error),

    #[error("failed to list artifacts in '{}': {source}", path.display())]
    ArtifactDir {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to upload {key}: {source:#}")]
    Upload {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to report job status: {0:#}")]
    Report(#[source] anyhow::Error),
}

/// What a sidecar run produced.
#[derive(Debug)]
pub struct RunOutcome {
    /// Number of siblings classified as failed.
    pub failure_count: usize,
    pub verdict: Verdict,
    /// Corrupt markers, failed uploads and a failed report. Never test failures.
    pub errors: Vec<SidecarError>,
}

impl RunOutcome {
    /// Non-zero when the machinery failed, or when sibling failures should
    /// fail the sidecar too.
    pub fn exit_code(&self, entry_error: bool) -> i32 {
        if !self.errors.is_empty() || (entry_error && self.failure_count > 0) {
            SIDECAR_FAILURE
        } else {
            0
        }
    }
}

pub struct Sidecar {
    options: SidecarOptions,
    store: Arc<dyn ArtifactStore>,
    reporter: Arc<dyn StatusReporter>,
    trace: Arc<dyn TraceWriter>,
}

impl Sidecar {
    pub fn new(
        options: SidecarOptions,
        store: Arc<dyn ArtifactStore>,
        reporter: Arc<dyn StatusReporter>,
        trace: Arc<dyn TraceWriter>,
    ) -> Self {
        Self {
            options,
            store,
            reporter,
            trace,
        }
    }

    /// Wait, collect and report. `sidecar_log` is our own log file, uploaded
    /// after everything else.
    pub async fn run(&self, cancel: CancellationToken, sidecar_log: Option<&Path>) -> RunOutcome {
        let mut phase = PhaseTracker::new();
        let mut errors = Vec::new();

        let results = self.wait_for_markers(&cancel).await;

        self.enter(&mut phase, Phase::Collecting);
        let mut failures = Vec::new();
        for (index, result) in results.into_iter().enumerate() {
            let entry = self.options.entries[index].display_name(index);
            let (failure, error) = self.classify(&entry, result);
            failures.extend(failure);
            errors.extend(error);
        }

        let verdict = Verdict::from_failures(failures);
        if verdict.passed {
            self.trace
                .info(&format!("All {} containers passed", self.options.entries.len()));
        } else {
            for failure in &verdict.failures {
                self.trace.warning(&format!("Container failed: {failure}"));
            }
            self.trace.warning(&format!(
                "{} of {} containers failed",
                verdict.failure_count,
                self.options.entries.len()
            ));
        }

        self.collect(sidecar_log, &mut errors).await;

        self.enter(&mut phase, Phase::Reporting);
        if let Err(e) = self.reporter.report(&self.options.job, &verdict).await {
            let error = SidecarError::Report(e);
            self.trace.error(&error.to_string());
            errors.push(error);
        }

        self.enter(&mut phase, Phase::Done);
        RunOutcome {
            failure_count: verdict.failure_count,
            verdict,
            errors,
        }
    }

    fn enter(&self, phase: &mut PhaseTracker, to: Phase) {
        match phase.advance(to) {
            Ok(()) => self.trace.verbose(&format!("Sidecar is {to}")),
            Err(e) => self.trace.error(&e.to_string()),
        }
    }

    // -----------------------------------------------------------------------
    // Waiting
    // -----------------------------------------------------------------------

    /// One polling task per marker, all bounded by the same deadline.
    /// Results come back in entry order.
    async fn wait_for_markers(
        &self,
        cancel: &CancellationToken,
    ) -> Vec<Result<Option<Marker>, SidecarError>> {
        let deadline = cancel.child_token();
        let timeout = self.options.timeout;
        self.trace.info(&format!(
            "Waiting up to {} for {} markers",
            StringUtil::format_duration(timeout),
            self.options.entries.len()
        ));

        let timer = {
            let deadline = deadline.clone();
            let trace = self.trace.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        trace.warning(&format!(
                            "Deadline of {} passed, abandoning outstanding waits",
                            StringUtil::format_duration(timeout)
                        ));
                        deadline.cancel();
                    }
                    _ = deadline.cancelled() => {}
                }
            })
        };

        let tasks = self.options.entries.iter().map(|entry| {
            let path = entry.marker_file.clone();
            let token = deadline.clone();
            let mut throttler =
                PollThrottler::new(self.options.poll_interval, self.options.max_poll_interval);
            tokio::spawn(async move { Marker::wait_for(&path, &mut throttler, &token).await })
        });
        let joined = join_all(tasks).await;

        if cancel.is_cancelled() {
            self.trace
                .warning("Interrupted while waiting, collecting whatever markers are present");
        }
        deadline.cancel();
        if let Err(e) = timer.await {
            self.trace.verbose(&format!("Deadline timer ended abnormally: {e}"));
        }

        joined
            .into_iter()
            .enumerate()
            .map(|(index, joined)| {
                let entry = self.options.entries[index].display_name(index);
                match joined {
                    Ok(result) => result.map_err(|source| SidecarError::Marker { entry, source }),
                    Err(e) => Err(SidecarError::WaitTask {
                        entry,
                        reason: e.to_string(),
                    }),
                }
            })
            .collect()
    }

    fn classify(
        &self,
        entry: &str,
        result: Result<Option<Marker>, SidecarError>,
    ) -> (Option<Failure>, Option<SidecarError>) {
        match result {
            Ok(Some(marker)) => match (marker.return_code, marker.error) {
                (Some(0), _) => {
                    self.trace.info(&format!("{entry} passed"));
                    (None, None)
                }
                (Some(code), error) => {
                    let detail = match error {
                        Some(error) => format!("exit code {code}: {error}"),
                        None => format!("exit code {code}"),
                    };
                    (
                        Some(Failure::new(entry, FailureReason::NonzeroExit).with_detail(detail)),
                        None,
                    )
                }
                (None, error) => (
                    Some(
                        Failure::new(entry, FailureReason::EntrypointError)
                            .with_detail(error.unwrap_or_else(|| "no return code".to_string())),
                    ),
                    None,
                ),
            },
            Ok(None) => {
                self.trace.warning(&format!(
                    "No marker from {entry} before the deadline; the container may have crashed or been evicted"
                ));
                (Some(Failure::new(entry, FailureReason::MissingMarker)), None)
            }
            Err(error) => {
                self.trace.error(&error.to_string());
                let failure =
                    Failure::new(entry, FailureReason::CorruptMarker).with_detail(error.to_string());
                (Some(failure), Some(error))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Collecting
    // -----------------------------------------------------------------------

    async fn collect(&self, sidecar_log: Option<&Path>, errors: &mut Vec<SidecarError>) {
        let masker = match SecretMasker::load_secret_files(&self.options.censoring.secret_files) {
            Ok(masker) => masker,
            Err(e) => {
                let error = SidecarError::Censoring(e);
                self.trace
                    .error(&format!("{error}; not uploading anything that could leak it"));
                errors.push(error);
                return;
            }
        };

        let (mut uploads, missing) = artifacts::process_logs(&self.options);
        for path in missing {
            self.trace
                .warning(&format!("Process log {} was never written", path.display()));
        }

        if let Some(dir) = &self.options.artifact_dir {
            if dir.is_dir() {
                match artifacts::artifact_dir(dir) {
                    Ok(found) => uploads.extend(found),
                    Err(source) => {
                        let error = SidecarError::ArtifactDir {
                            path: dir.clone(),
                            source,
                        };
                        self.trace.error(&error.to_string());
                        errors.push(error);
                    }
                }
            } else {
                self.trace.warning(&format!(
                    "Artifact directory {} does not exist",
                    dir.display()
                ));
            }
        }

        self.trace
            .info(&format!("Uploading {} artifacts", uploads.len()));

        // Censored copies live here until the upload finishes.
        let scratch = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                errors.push(SidecarError::Censoring(anyhow::Error::new(e).context(
                    "failed to create a scratch directory for censored copies",
                )));
                return;
            }
        };

        for (index, upload) in uploads.iter().enumerate() {
            self.upload(upload, &masker, scratch.path(), index, errors).await;
        }

        // Last, so it covers the uploads above.
        if let Some(log) = sidecar_log {
            let upload = Upload::new(log, artifact_keys::SIDECAR_LOG);
            self.upload(&upload, &masker, scratch.path(), uploads.len(), errors)
                .await;
        }
    }

    async fn upload(
        &self,
        upload: &Upload,
        masker: &SecretMasker,
        scratch: &Path,
        index: usize,
        errors: &mut Vec<SidecarError>,
    ) {
        let source = if masker.is_empty() {
            upload.source.clone()
        } else {
            let censored = scratch.join(index.to_string());
            if let Err(e) = masker.mask_file(&upload.source, &censored) {
                self.push_upload_error(upload, e, errors);
                return;
            }
            censored
        };

        match self.store.upload(&source, &upload.key).await {
            Ok(()) => self.trace.verbose(&format!("Uploaded {}", upload.key)),
            Err(e) => self.push_upload_error(upload, e, errors),
        }
    }

    fn push_upload_error(&self, upload: &Upload, source: anyhow::Error, errors: &mut Vec<SidecarError>) {
        let error = SidecarError::Upload {
            key: upload.key.clone(),
            source,
        };
        self.trace.error(&error.to_string());
        errors.push(error);
    }
}

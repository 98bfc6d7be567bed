// Typed configuration for the entrypoint and the sidecar.
// Validation is pure and never touches the filesystem.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::defaults;

/// A configuration problem detected before any process starts. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no process to wrap specified")]
    MissingArgs,

    #[error("no marker file specified")]
    MissingMarkerFile,

    #[error("no entries to wait for specified")]
    NoEntries,

    #[error("entry {index} has no marker file")]
    EntryMissingMarker { index: usize },

    #[error("marker file '{0}' is shared by more than one entry")]
    DuplicateMarker(String),

    #[error("timeout must be greater than zero")]
    ZeroTimeout,

    #[error("poll interval {poll} exceeds max poll interval {max}")]
    PollInterval { poll: String, max: String },

    #[error("no {0} configured")]
    MissingCollaborator(&'static str),

    #[error("invalid {field} url '{url}': {reason}")]
    InvalidUrl {
        field: &'static str,
        url: String,
        reason: String,
    },

    #[error("{0} path must not be empty")]
    EmptyPath(&'static str),
}

// ---------------------------------------------------------------------------
// EntrypointOptions
// ---------------------------------------------------------------------------

/// Per-container configuration of the entrypoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntrypointOptions {
    /// The command and its arguments.
    pub args: Vec<String>,

    /// Used in log lines only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,

    /// Receives stdout and stderr of the command. Empty means no log file.
    pub process_log: PathBuf,

    /// Receives the completion record.
    pub marker_file: PathBuf,

    #[serde(with = "crate::duration_serde::option")]
    pub timeout: Option<Duration>,

    #[serde(with = "crate::duration_serde::option")]
    pub grace_period: Option<Duration>,

    /// Created before launch and exported to the command as `$ARTIFACTS`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_dir: Option<PathBuf>,

    /// Marker of the step that must succeed before this one runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_marker: Option<PathBuf>,

    /// Exit 0 regardless of the command's result. The marker is unaffected.
    pub always_zero: bool,
}

impl EntrypointOptions {
    /// Pure check of the fields required to run.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.args.is_empty() {
            return Err(ValidationError::MissingArgs);
        }
        if self.marker_file.as_os_str().is_empty() {
            return Err(ValidationError::MissingMarkerFile);
        }
        Ok(())
    }

    /// Name used in log lines.
    pub fn display_name(&self) -> &str {
        self.container_name
            .as_deref()
            .or_else(|| self.args.first().map(String::as_str))
            .unwrap_or("entrypoint")
    }
}

// ---------------------------------------------------------------------------
// SidecarOptions
// ---------------------------------------------------------------------------

/// One sibling container the sidecar waits for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapperEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub marker_file: PathBuf,
    pub process_log: PathBuf,
}

impl WrapperEntry {
    /// The name used in verdicts and upload keys: the configured name, or
    /// the entry's position.
    pub fn display_name(&self, index: usize) -> String {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => format!("entry-{index}"),
        }
    }
}

/// Secrets to mask in every uploaded log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CensoringOptions {
    pub secret_files: Vec<PathBuf>,
}

/// Identifies the job run to the status-reporting collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobMetadata {
    pub job_name: String,
    pub build_id: String,
    pub extra: BTreeMap<String, String>,
}

/// Where artifacts go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArtifactStoreConfig {
    /// Copy into a directory (typically another mounted volume).
    Local { dir: PathBuf },
    /// `PUT` each artifact under a base URL.
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token_file: Option<PathBuf>,
    },
}

/// Where the verdict goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusReporterConfig {
    /// Write the verdict as JSON to a file.
    File { path: PathBuf },
    /// `POST` the verdict as JSON to a URL.
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token_file: Option<PathBuf>,
    },
}

/// Per-pod configuration of the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarOptions {
    pub entries: Vec<WrapperEntry>,

    /// Overall deadline for every sibling to write its marker.
    #[serde(with = "crate::duration_serde")]
    pub timeout: Duration,

    /// Turn sibling failures into a non-zero sidecar exit.
    pub entry_error: bool,

    #[serde(with = "crate::duration_serde")]
    pub poll_interval: Duration,

    #[serde(with = "crate::duration_serde")]
    pub max_poll_interval: Duration,

    /// Extra files to upload under `artifacts/`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_dir: Option<PathBuf>,

    pub censoring: CensoringOptions,

    /// Keep waiting through SIGINT/SIGTERM.
    pub ignore_interrupts: bool,

    pub job: JobMetadata,

    pub artifact_store: Option<ArtifactStoreConfig>,

    pub status_reporter: Option<StatusReporterConfig>,
}

impl Default for SidecarOptions {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            timeout: defaults::SIDECAR_TIMEOUT,
            entry_error: false,
            poll_interval: defaults::POLL_INTERVAL,
            max_poll_interval: defaults::MAX_POLL_INTERVAL,
            artifact_dir: None,
            censoring: CensoringOptions::default(),
            ignore_interrupts: false,
            job: JobMetadata::default(),
            artifact_store: None,
            status_reporter: None,
        }
    }
}

impl SidecarOptions {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.entries.is_empty() {
            return Err(ValidationError::NoEntries);
        }

        let mut seen = HashSet::new();
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.marker_file.as_os_str().is_empty() {
                return Err(ValidationError::EntryMissingMarker { index });
            }
            if !seen.insert(entry.marker_file.as_path()) {
                return Err(ValidationError::DuplicateMarker(
                    entry.marker_file.display().to_string(),
                ));
            }
        }

        if self.timeout.is_zero() {
            return Err(ValidationError::ZeroTimeout);
        }
        if self.poll_interval > self.max_poll_interval {
            return Err(ValidationError::PollInterval {
                poll: podutils_sdk::StringUtil::format_duration(self.poll_interval),
                max: podutils_sdk::StringUtil::format_duration(self.max_poll_interval),
            });
        }

        match self.artifact_store {
            None => return Err(ValidationError::MissingCollaborator("artifact store")),
            Some(ArtifactStoreConfig::Local { ref dir }) => {
                if dir.as_os_str().is_empty() {
                    return Err(ValidationError::EmptyPath("artifact store"));
                }
            }
            Some(ArtifactStoreConfig::Http { ref url, .. }) => {
                validate_url("artifact store", url)?;
            }
        }

        match self.status_reporter {
            None => return Err(ValidationError::MissingCollaborator("status reporter")),
            Some(StatusReporterConfig::File { ref path }) => {
                if path.as_os_str().is_empty() {
                    return Err(ValidationError::EmptyPath("status reporter"));
                }
            }
            Some(StatusReporterConfig::Http { ref url, .. }) => {
                validate_url("status reporter", url)?;
            }
        }

        Ok(())
    }

    /// The marker paths the sidecar must observe, in entry order.
    pub fn marker_files(&self) -> Vec<&Path> {
        self.entries.iter().map(|e| e.marker_file.as_path()).collect()
    }

    /// The process logs to collect, in entry order.
    pub fn process_logs(&self) -> Vec<&Path> {
        self.entries.iter().map(|e| e.process_log.as_path()).collect()
    }
}

fn validate_url(field: &'static str, raw: &str) -> Result<(), ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidUrl {
        field,
        url: raw.to_string(),
        reason,
    };
    let parsed = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entrypoint(args: &[&str], log: &str, marker: &str) -> EntrypointOptions {
        EntrypointOptions {
            args: args.iter().map(|s| s.to_string()).collect(),
            process_log: PathBuf::from(log),
            marker_file: PathBuf::from(marker),
            ..EntrypointOptions::default()
        }
    }

    #[test]
    fn entrypoint_validate() {
        struct Case {
            name: &'static str,
            input: EntrypointOptions,
            expected: Result<(), ValidationError>,
        }
        let cases = [
            Case {
                name: "all ok",
                input: entrypoint(&["/usr/bin/true"], "output.txt", "marker.txt"),
                expected: Ok(()),
            },
            Case {
                name: "missing args",
                input: entrypoint(&[], "output.txt", "marker.txt"),
                expected: Err(ValidationError::MissingArgs),
            },
            Case {
                name: "missing marker file",
                input: entrypoint(&["/usr/bin/true"], "output.txt", ""),
                expected: Err(ValidationError::MissingMarkerFile),
            },
            Case {
                name: "missing process log is allowed",
                input: entrypoint(&["/usr/bin/true"], "", "marker.txt"),
                expected: Ok(()),
            },
        ];

        for case in cases {
            assert_eq!(case.input.validate(), case.expected, "{}", case.name);
        }
    }

    #[test]
    fn entrypoint_validate_ignores_durations() {
        let mut options = entrypoint(&["make", "test"], "output.txt", "marker.txt");
        options.timeout = Some(Duration::ZERO);
        options.grace_period = Some(Duration::from_secs(1));
        assert_eq!(options.validate(), Ok(()));
    }

    #[test]
    fn entrypoint_from_json() {
        let options: EntrypointOptions = serde_json::from_str(
            r#"{
                "args": ["make", "test"],
                "process_log": "/logs/process-log.txt",
                "marker_file": "/logs/marker-file.txt",
                "timeout": "2h",
                "grace_period": "15s"
            }"#,
        )
        .unwrap();
        assert_eq!(options.args, vec!["make", "test"]);
        assert_eq!(options.timeout, Some(Duration::from_secs(7200)));
        assert_eq!(options.grace_period, Some(Duration::from_secs(15)));
        assert!(!options.always_zero);
        assert_eq!(options.display_name(), "make");
    }

    fn sidecar() -> SidecarOptions {
        SidecarOptions {
            entries: vec![WrapperEntry {
                name: Some("test".to_string()),
                marker_file: PathBuf::from("/logs/marker-file.txt"),
                process_log: PathBuf::from("/logs/process-log.txt"),
            }],
            artifact_store: Some(ArtifactStoreConfig::Local {
                dir: PathBuf::from("/out"),
            }),
            status_reporter: Some(StatusReporterConfig::File {
                path: PathBuf::from("/out/finished.json"),
            }),
            ..SidecarOptions::default()
        }
    }

    #[test]
    fn sidecar_validate_ok() {
        assert_eq!(sidecar().validate(), Ok(()));
    }

    #[test]
    fn sidecar_validate_failures() {
        let mut no_entries = sidecar();
        no_entries.entries.clear();
        assert_eq!(no_entries.validate(), Err(ValidationError::NoEntries));

        let mut duplicate = sidecar();
        duplicate.entries.push(duplicate.entries[0].clone());
        assert!(matches!(
            duplicate.validate(),
            Err(ValidationError::DuplicateMarker(_))
        ));

        let mut empty_marker = sidecar();
        empty_marker.entries[0].marker_file = PathBuf::new();
        assert_eq!(
            empty_marker.validate(),
            Err(ValidationError::EntryMissingMarker { index: 0 })
        );

        let mut zero = sidecar();
        zero.timeout = Duration::ZERO;
        assert_eq!(zero.validate(), Err(ValidationError::ZeroTimeout));

        let mut polls = sidecar();
        polls.poll_interval = Duration::from_secs(30);
        assert!(matches!(
            polls.validate(),
            Err(ValidationError::PollInterval { .. })
        ));

        let mut no_store = sidecar();
        no_store.artifact_store = None;
        assert_eq!(
            no_store.validate(),
            Err(ValidationError::MissingCollaborator("artifact store"))
        );

        let mut bad_url = sidecar();
        bad_url.status_reporter = Some(StatusReporterConfig::Http {
            url: "ftp://status.example.com".to_string(),
            token_file: None,
        });
        assert!(matches!(
            bad_url.validate(),
            Err(ValidationError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn sidecar_from_json_uses_defaults() {
        let options: SidecarOptions = serde_json::from_str(
            r#"{
                "entries": [
                    {"name": "unit", "marker_file": "/logs/unit/marker", "process_log": "/logs/unit/log"},
                    {"marker_file": "/logs/e2e/marker", "process_log": "/logs/e2e/log"}
                ],
                "entry_error": true,
                "artifact_store": {"type": "http", "url": "https://artifacts.example.com/jobs/42"},
                "status_reporter": {"type": "file", "path": "/logs/finished.json"}
            }"#,
        )
        .unwrap();

        assert_eq!(options.timeout, defaults::SIDECAR_TIMEOUT);
        assert_eq!(options.poll_interval, defaults::POLL_INTERVAL);
        assert!(options.entry_error);
        assert_eq!(
            options.marker_files(),
            vec![Path::new("/logs/unit/marker"), Path::new("/logs/e2e/marker")]
        );
        assert_eq!(options.process_logs().len(), 2);
        assert_eq!(options.entries[0].display_name(0), "unit");
        assert_eq!(options.entries[1].display_name(1), "entry-1");
        assert_eq!(options.validate(), Ok(()));
    }
}

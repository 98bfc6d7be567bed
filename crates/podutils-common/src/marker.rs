// Marker protocol: the completion record an entrypoint leaves on the shared
// volume and the sidecar waits for.

use podutils_sdk::{IOUtil, PollThrottler};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::constants::return_code;

/// Highest marker format version this build writes.
pub const MARKER_FORMAT_VERSION: u32 = 1;

/// Version reported for markers in the legacy bare-integer encoding.
pub const LEGACY_MARKER_VERSION: u32 = 0;

/// The completion record of one entrypoint.
///
/// Encoded (version 1) as one JSON object:
///
/// ```text
/// {"version": 1, "return_code": 0}
/// {"version": 1, "return_code": 124, "error": "process timed out after 10m"}
/// {"version": 1, "return_code": null, "error": "could not resolve executable ..."}
/// ```
///
/// Readers also accept the legacy encoding, a bare decimal exit code, which is
/// reported as version 0. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Exit status of the wrapped process; `None` when it never completed.
    pub return_code: Option<i32>,

    /// Why the entrypoint itself failed, timed out or was interrupted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_version() -> u32 {
    MARKER_FORMAT_VERSION
}

/// Errors reading or writing a marker.
#[derive(Debug, thiserror::Error)]
pub enum MarkerError {
    #[error("failed to read marker '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("marker '{}' is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("failed to write marker '{}': {source:#}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl Marker {
    /// The process ran to completion with `code`.
    pub fn exited(code: i32) -> Self {
        Self {
            version: MARKER_FORMAT_VERSION,
            return_code: Some(code),
            error: None,
        }
    }

    /// The process ended with a reserved `code` for the reason given.
    pub fn failed(code: i32, error: impl Into<String>) -> Self {
        Self {
            version: MARKER_FORMAT_VERSION,
            return_code: Some(code),
            error: Some(error.into()),
        }
    }

    /// The entrypoint could not launch or supervise the process.
    pub fn internal_error(error: impl Into<String>) -> Self {
        Self {
            version: MARKER_FORMAT_VERSION,
            return_code: None,
            error: Some(error.into()),
        }
    }

    /// Whether the wrapped process succeeded.
    pub fn is_success(&self) -> bool {
        self.return_code == Some(return_code::SUCCESS)
    }

    /// The code the entrypoint process exits with for this marker.
    pub fn exit_code(&self) -> i32 {
        self.return_code.unwrap_or(return_code::INTERNAL_ERROR)
    }

    /// Decode marker file contents. The error is a human-readable reason.
    pub fn parse(content: &str) -> Result<Self, String> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err("marker file is empty".to_string());
        }

        if let Ok(code) = trimmed.parse::<i32>() {
            return Ok(Self {
                version: LEGACY_MARKER_VERSION,
                return_code: Some(code),
                error: None,
            });
        }

        let value: serde_json::Value =
            serde_json::from_str(trimmed).map_err(|e| format!("not a valid marker: {e}"))?;
        let object = value
            .as_object()
            .ok_or_else(|| "marker is not a JSON object".to_string())?;
        if !object.contains_key("return_code") {
            return Err("marker has no return_code field".to_string());
        }

        serde_json::from_value(value).map_err(|e| format!("not a valid marker: {e}"))
    }

    /// Encode for writing. `error` is omitted when unset; `return_code` is
    /// always present, as `null` when the process never completed.
    pub fn to_json(&self) -> String {
        // Integers and strings always serialize.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Read the marker at `path`. `Ok(None)` means no marker exists yet.
    pub fn read(path: &Path) -> Result<Option<Self>, MarkerError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(MarkerError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        Self::parse(&content)
            .map(Some)
            .map_err(|reason| MarkerError::Corrupt {
                path: path.to_path_buf(),
                reason,
            })
    }

    /// Write the marker to `path` so that readers never see a partial file.
    pub fn write(&self, path: &Path) -> Result<(), MarkerError> {
        IOUtil::write_atomic(path, self.to_json().as_bytes()).map_err(|source| {
            MarkerError::Write {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Poll `path` until a marker appears or `cancel` fires.
    ///
    /// On cancellation the path is checked one final time, so a marker that
    /// landed just before the deadline still counts. `Ok(None)` means the
    /// marker never appeared.
    pub async fn wait_for(
        path: &Path,
        throttler: &mut PollThrottler,
        cancel: &CancellationToken,
    ) -> Result<Option<Self>, MarkerError> {
        loop {
            if let Some(marker) = Self::read(path)? {
                return Ok(Some(marker));
            }
            if !throttler.wait(cancel).await {
                return Self::read(path);
            }
        }
    }
}

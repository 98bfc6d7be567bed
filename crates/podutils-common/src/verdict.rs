// The aggregate outcome of a pod's job run, handed to the status reporter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a sibling container counts as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    #[serde(rename = "nonzero exit")]
    NonzeroExit,
    #[serde(rename = "missing marker (sibling timed out or crashed)")]
    MissingMarker,
    #[serde(rename = "corrupt marker")]
    CorruptMarker,
    #[serde(rename = "entrypoint error")]
    EntrypointError,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::NonzeroExit => "nonzero exit",
            FailureReason::MissingMarker => "missing marker (sibling timed out or crashed)",
            FailureReason::CorruptMarker => "corrupt marker",
            FailureReason::EntrypointError => "entrypoint error",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// The sibling entry that failed.
    pub source: String,
    pub reason: FailureReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Failure {
    pub fn new(source: impl Into<String>, reason: FailureReason) -> Self {
        Self {
            source: source.into(),
            reason,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

/// Pass/fail summary of every sibling, in entry order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    pub failure_count: usize,
    pub failures: Vec<Failure>,
    pub timestamp: DateTime<Utc>,
}

impl Verdict {
    pub fn from_failures(failures: Vec<Failure>) -> Self {
        Self {
            passed: failures.is_empty(),
            failure_count: failures.len(),
            failures,
            timestamp: Utc::now(),
        }
    }
}

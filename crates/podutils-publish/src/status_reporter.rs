// Status reporters: receive the job's verdict exactly once per sidecar run.

use anyhow::{Context, Result};
use async_trait::async_trait;
use podutils_common::{JobMetadata, Verdict};
use podutils_sdk::{IOUtil, PodUtilsPackage, TraceWriter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, job: &JobMetadata, verdict: &Verdict) -> Result<()>;
}

/// The document a reporter publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub job: JobMetadata,
    pub verdict: Verdict,
    pub reporter: String,
}

impl StatusReport {
    pub fn new(job: &JobMetadata, verdict: &Verdict) -> Self {
        Self {
            job: job.clone(),
            verdict: verdict.clone(),
            reporter: PodUtilsPackage::user_agent(),
        }
    }
}

// ---------------------------------------------------------------------------
// File
// ---------------------------------------------------------------------------

/// Writes the report as JSON, atomically, to a file.
pub struct FileStatusReporter {
    path: PathBuf,
    trace: Arc<dyn TraceWriter>,
}

impl FileStatusReporter {
    pub fn new(path: impl Into<PathBuf>, trace: Arc<dyn TraceWriter>) -> Self {
        Self {
            path: path.into(),
            trace,
        }
    }
}

#[async_trait]
impl StatusReporter for FileStatusReporter {
    async fn report(&self, job: &JobMetadata, verdict: &Verdict) -> Result<()> {
        let report = StatusReport::new(job, verdict);
        IOUtil::save_object_atomic(&self.path, &report)
            .with_context(|| format!("failed to write status to '{}'", self.path.display()))?;
        self.trace
            .info(&format!("Wrote job status to {}", self.path.display()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// `POST`s the report as JSON.
pub struct HttpStatusReporter {
    client: Client,
    url: String,
    token: Option<String>,
    trace: Arc<dyn TraceWriter>,
}

impl HttpStatusReporter {
    pub fn new(client: Client, url: &str, token: Option<String>, trace: Arc<dyn TraceWriter>) -> Self {
        Self {
            client,
            url: url.to_string(),
            token,
            trace,
        }
    }
}

#[async_trait]
impl StatusReporter for HttpStatusReporter {
    async fn report(&self, job: &JobMetadata, verdict: &Verdict) -> Result<()> {
        let report = StatusReport::new(job, verdict);

        let mut request = self.client.post(&self.url).json(&report);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("failed to send status to {}", self.url))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("status sink returned {status}: {body}");
        }

        self.trace.info(&format!("Reported job status to {}", self.url));
        Ok(())
    }
}

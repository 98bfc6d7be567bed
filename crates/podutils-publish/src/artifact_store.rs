// Artifact stores: where the sidecar ships process logs and declared artifacts.
// Keys are relative, `/`-separated paths.

use anyhow::{Context, Result};
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use podutils_sdk::TraceWriter;
use reqwest::{Client, StatusCode};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Maximum number of attempts for a single HTTP upload.
const MAX_RETRIES: u32 = 3;

/// Base delay between HTTP upload attempts; attempt `n` waits `n` times this.
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Characters left unescaped in a key segment.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload the file at `source` under `key`.
    async fn upload(&self, source: &Path, key: &str) -> Result<()>;
}

/// Reject keys that could escape the destination.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        anyhow::bail!("artifact key is empty");
    }
    let path = Path::new(key);
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            _ => anyhow::bail!("artifact key '{key}' must be a plain relative path"),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Local directory
// ---------------------------------------------------------------------------

/// Copies artifacts into a directory, typically another mounted volume.
pub struct LocalArtifactStore {
    root: PathBuf,
    trace: Arc<dyn TraceWriter>,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>, trace: Arc<dyn TraceWriter>) -> Self {
        Self {
            root: root.into(),
            trace,
        }
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn upload(&self, source: &Path, key: &str) -> Result<()> {
        validate_key(key)?;
        let destination = self.root.join(key);
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create '{}'", parent.display()))?;
        }

        let bytes = tokio::fs::copy(source, &destination).await.with_context(|| {
            format!(
                "failed to copy '{}' to '{}'",
                source.display(),
                destination.display()
            )
        })?;
        self.trace
            .verbose(&format!("Stored {key} ({bytes} bytes) in {}", self.root.display()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// `PUT`s each artifact to `<base url>/<key>`, retrying failed attempts.
pub struct HttpArtifactStore {
    client: Client,
    base_url: String,
    token: Option<String>,
    retry_delay: Duration,
    trace: Arc<dyn TraceWriter>,
}

impl HttpArtifactStore {
    pub fn new(
        client: Client,
        base_url: &str,
        token: Option<String>,
        trace: Arc<dyn TraceWriter>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            retry_delay: RETRY_DELAY,
            trace,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// The URL for `key`, with every segment percent-encoded.
    pub fn url_for(&self, key: &str) -> String {
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
            .collect();
        format!("{}/{}", self.base_url, encoded.join("/"))
    }

    async fn attempt_upload(&self, url: &str, source: &Path) -> Result<u64> {
        let data = tokio::fs::read(source)
            .await
            .with_context(|| format!("failed to read '{}' for upload", source.display()))?;
        let size = data.len() as u64;

        let mut request = self
            .client
            .put(url)
            .header("Content-Type", "application/octet-stream")
            .body(data);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("failed to send upload request")?;
        let status = response.status();
        if status != StatusCode::CREATED && !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            anyhow::bail!("artifact store returned {status}: {reason}");
        }
        Ok(size)
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn upload(&self, source: &Path, key: &str) -> Result<()> {
        validate_key(key)?;
        let url = self.url_for(key);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.attempt_upload(&url, source).await {
                Ok(size) => {
                    self.trace.verbose(&format!("Uploaded {key} ({size} bytes)"));
                    return Ok(());
                }
                Err(e) if attempt < MAX_RETRIES => {
                    self.trace.warning(&format!(
                        "Upload of {key} failed (attempt {attempt}/{MAX_RETRIES}): {e:#}"
                    ));
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("upload of '{}' failed after {MAX_RETRIES} attempts", source.display())
                    });
                }
            }
        }
    }
}

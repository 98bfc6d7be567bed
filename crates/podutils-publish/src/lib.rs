// podutils-publish: The sidecar's external collaborators.
// Artifact stores ship logs and declared artifacts; status reporters hand
// the verdict to whatever records the job's outcome.

pub mod artifact_store;
pub mod status_reporter;

#[cfg(test)]
mod test_server;

use anyhow::Result;
use podutils_common::{ArtifactStoreConfig, HttpClientFactory, StatusReporterConfig};
use podutils_sdk::TraceWriter;
use std::sync::Arc;

pub use artifact_store::{ArtifactStore, HttpArtifactStore, LocalArtifactStore};
pub use status_reporter::{FileStatusReporter, HttpStatusReporter, StatusReport, StatusReporter};

/// Build the artifact store described by `config`.
pub fn create_artifact_store(
    config: &ArtifactStoreConfig,
    trace: Arc<dyn TraceWriter>,
) -> Result<Arc<dyn ArtifactStore>> {
    Ok(match config {
        ArtifactStoreConfig::Local { dir } => Arc::new(LocalArtifactStore::new(dir, trace)),
        ArtifactStoreConfig::Http { url, token_file } => {
            let client = HttpClientFactory::create_default_client()?;
            let token = HttpClientFactory::read_bearer_token(token_file.as_deref())?;
            Arc::new(HttpArtifactStore::new(client, url, token, trace))
        }
    })
}

/// Build the status reporter described by `config`.
pub fn create_status_reporter(
    config: &StatusReporterConfig,
    trace: Arc<dyn TraceWriter>,
) -> Result<Arc<dyn StatusReporter>> {
    Ok(match config {
        StatusReporterConfig::File { path } => Arc::new(FileStatusReporter::new(path, trace)),
        StatusReporterConfig::Http { url, token_file } => {
            let client = HttpClientFactory::create_default_client()?;
            let token = HttpClientFactory::read_bearer_token(token_file.as_deref())?;
            Arc::new(HttpStatusReporter::new(client, url, token, trace))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use podutils_sdk::trace::NullTraceWriter;

    #[test]
    fn http_store_with_missing_token_file_fails() {
        let config = ArtifactStoreConfig::Http {
            url: "https://artifacts.example.com".to_string(),
            token_file: Some("/definitely/not/a/token".into()),
        };
        assert!(create_artifact_store(&config, Arc::new(NullTraceWriter)).is_err());
    }

    #[test]
    fn builds_local_collaborators() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStoreConfig::Local {
            dir: dir.path().to_path_buf(),
        };
        let reporter = StatusReporterConfig::File {
            path: dir.path().join("finished.json"),
        };
        assert!(create_artifact_store(&store, Arc::new(NullTraceWriter)).is_ok());
        assert!(create_status_reporter(&reporter, Arc::new(NullTraceWriter)).is_ok());
    }
}

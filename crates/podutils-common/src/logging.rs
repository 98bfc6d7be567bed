// Process-wide log setup for the pod utility binaries, and the sidecar's
// transient JSON log file that is uploaded with the artifacts.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::constants::artifact_keys;

/// Install the global subscriber: human-readable lines on stderr filtered by
/// `RUST_LOG` (default `info`), plus JSON lines into `json_file` when given.
pub fn init_logging(json_file: Option<File>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let json = json_file.map(|file| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(json)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}

/// A log file in a private temporary directory, removed explicitly before
/// the process exits.
#[derive(Debug)]
pub struct TransientLog {
    dir: tempfile::TempDir,
    path: PathBuf,
}

impl TransientLog {
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("sidecar-")
            .tempdir()
            .context("failed to create directory for the sidecar log")?;
        let path = dir.path().join(artifact_keys::SIDECAR_LOG);
        File::create(&path)
            .with_context(|| format!("failed to create '{}'", path.display()))?;
        Ok(Self { dir, path })
    }

    /// A new append handle to the log.
    pub fn writer(&self) -> Result<File> {
        OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open '{}'", self.path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the log and its directory.
    pub fn remove(self) -> Result<()> {
        self.dir
            .close()
            .context("failed to remove the sidecar log directory")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn transient_log_lifecycle() {
        let log = TransientLog::create().unwrap();
        let path = log.path().to_path_buf();
        assert!(path.ends_with(artifact_keys::SIDECAR_LOG));

        let mut writer = log.writer().unwrap();
        writeln!(writer, "{{\"message\":\"one\"}}").unwrap();
        let mut second = log.writer().unwrap();
        writeln!(second, "{{\"message\":\"two\"}}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);

        log.remove().unwrap();
        assert!(!path.exists());
    }
}

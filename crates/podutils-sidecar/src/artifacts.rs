// What the sidecar uploads, and under which keys.

use podutils_common::constants::artifact_keys;
use podutils_common::SidecarOptions;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One file to ship to the artifact store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub source: PathBuf,
    pub key: String,
}

impl Upload {
    pub fn new(source: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            key: key.into(),
        }
    }
}

/// The key for entry `index`'s process log. A pod with a single wrapped
/// container keeps the plain name.
pub fn process_log_key(options: &SidecarOptions, index: usize) -> String {
    if options.entries.len() == 1 {
        return artifact_keys::BUILD_LOG.to_string();
    }
    let name = options.entries[index].display_name(index);
    format!("{name}-{}", artifact_keys::BUILD_LOG)
}

/// One upload per entry's process log, in entry order. Logs that were
/// never created are returned separately.
pub fn process_logs(options: &SidecarOptions) -> (Vec<Upload>, Vec<PathBuf>) {
    let mut uploads = Vec::new();
    let mut missing = Vec::new();
    for (index, entry) in options.entries.iter().enumerate() {
        if entry.process_log.as_os_str().is_empty() {
            continue;
        }
        if entry.process_log.is_file() {
            uploads.push(Upload::new(&entry.process_log, process_log_key(options, index)));
        } else {
            missing.push(entry.process_log.clone());
        }
    }
    (uploads, missing)
}

/// Every regular file under `dir`, keyed `artifacts/<relative path>`.
pub fn artifact_dir(dir: &Path) -> Result<Vec<Upload>, walkdir::Error> {
    let mut uploads = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let relative: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        uploads.push(Upload::new(
            entry.path(),
            format!("{}/{}", artifact_keys::ARTIFACTS_PREFIX, relative.join("/")),
        ));
    }
    Ok(uploads)
}

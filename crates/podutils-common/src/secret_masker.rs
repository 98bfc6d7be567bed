// Secret values collected from the censoring files, replaced with `***`
// wherever they appear in logs and artifacts the sidecar uploads.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::path::Path;

pub const MASK: &str = "***";

/// Registered secrets, kept longest first so a secret that contains another
/// one is replaced whole.
#[derive(Debug, Default)]
pub struct SecretMasker {
    secrets: RwLock<Vec<Vec<u8>>>,
}

impl SecretMasker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blank values are ignored, surrounding whitespace is not part of a secret.
    pub fn add_value(&self, secret: &str) {
        let value = secret.trim().as_bytes();
        if value.is_empty() {
            return;
        }
        let mut secrets = self.secrets.write();
        if secrets.iter().any(|known| known.as_slice() == value) {
            return;
        }
        let at = secrets.partition_point(|known| known.len() >= value.len());
        secrets.insert(at, value.to_vec());
    }

    /// Registers the whole file and each of its lines.
    pub fn add_file(&self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read secret file '{}'", path.display()))?;
        self.add_value(&content);
        content.lines().for_each(|line| self.add_value(line));
        Ok(())
    }

    /// Fails on the first file that cannot be read.
    pub fn load_secret_files(paths: &[impl AsRef<Path>]) -> Result<Self> {
        let masker = Self::new();
        for path in paths {
            masker.add_file(path.as_ref())?;
        }
        Ok(masker)
    }

    pub fn mask_secrets(&self, input: &str) -> String {
        if self.is_empty() {
            return input.to_owned();
        }
        String::from_utf8_lossy(&self.mask_bytes(input.as_bytes())).into_owned()
    }

    /// Works on raw bytes, so binary artifacts come through intact.
    pub fn mask_bytes(&self, input: &[u8]) -> Vec<u8> {
        let secrets = self.secrets.read();
        let mut out = Vec::with_capacity(input.len());
        let mut rest = input;
        'scan: while let Some((&first, tail)) = rest.split_first() {
            for secret in secrets.iter() {
                if rest.starts_with(secret) {
                    out.extend_from_slice(MASK.as_bytes());
                    rest = &rest[secret.len()..];
                    continue 'scan;
                }
            }
            out.push(first);
            rest = tail;
        }
        out
    }

    /// Writes a masked copy of `source` to `destination`.
    pub fn mask_file(&self, source: &Path, destination: &Path) -> Result<()> {
        let bytes = std::fs::read(source)
            .with_context(|| format!("failed to read '{}'", source.display()))?;
        std::fs::write(destination, self.mask_bytes(&bytes))
            .with_context(|| format!("failed to write '{}'", destination.display()))
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_single_secret() {
        let masker = SecretMasker::new();
        masker.add_value("password123");
        assert_eq!(masker.mask_secrets("my password123 is here"), "my *** is here");
    }

    #[test]
    fn longer_secret_wins() {
        let masker = SecretMasker::new();
        masker.add_value("pass");
        masker.add_value("password");
        assert_eq!(
            masker.mask_secrets("my password is here, pass it on"),
            "my *** is here, *** it on"
        );
    }

    #[test]
    fn blank_values_ignored() {
        let masker = SecretMasker::new();
        masker.add_value("");
        masker.add_value("   ");
        assert!(masker.is_empty());
    }

    #[test]
    fn secret_file_lines_are_masked() {
        let dir = tempfile::tempdir().unwrap();
        let secret = dir.path().join("credentials");
        std::fs::write(&secret, "user=robot\ntoken=abcdef\n\n").unwrap();

        let masker = SecretMasker::load_secret_files(&[&secret]).unwrap();
        assert_eq!(
            masker.mask_secrets("login user=robot with token=abcdef"),
            "login *** with ***"
        );
    }

    #[test]
    fn missing_secret_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SecretMasker::load_secret_files(&[dir.path().join("nope")]).is_err());
    }

    #[test]
    fn binary_content_survives() {
        let masker = SecretMasker::new();
        masker.add_value("key");
        let input = [0xff, b'k', b'e', b'y', 0x00, 0xfe];
        assert_eq!(
            masker.mask_bytes(&input),
            vec![0xff, b'*', b'*', b'*', 0x00, 0xfe]
        );
    }

    #[test]
    fn writes_masked_copy() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("build-log.txt");
        let destination = dir.path().join("censored.txt");
        std::fs::write(&source, "fetching with hunter2\ndone\n").unwrap();

        let masker = SecretMasker::new();
        masker.add_value("hunter2");
        masker.mask_file(&source, &destination).unwrap();

        assert_eq!(
            std::fs::read_to_string(&destination).unwrap(),
            "fetching with ***\ndone\n"
        );
    }
}

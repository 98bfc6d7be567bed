// Locating and decoding options: an explicit file wins over the environment
// variable the job-construction collaborator sets.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::constants::env;
use crate::options::{EntrypointOptions, SidecarOptions, ValidationError};

/// Options that can be read from a file or from an environment variable.
pub trait LoadableOptions: DeserializeOwned {
    /// Environment variable holding the JSON encoding.
    const ENV_VAR: &'static str;

    fn validate(&self) -> Result<(), ValidationError>;
}

impl LoadableOptions for EntrypointOptions {
    const ENV_VAR: &'static str = env::ENTRYPOINT_OPTIONS;

    fn validate(&self) -> Result<(), ValidationError> {
        EntrypointOptions::validate(self)
    }
}

impl LoadableOptions for SidecarOptions {
    const ENV_VAR: &'static str = env::SIDECAR_OPTIONS;

    fn validate(&self) -> Result<(), ValidationError> {
        SidecarOptions::validate(self)
    }
}

pub struct OptionsLoader;

impl OptionsLoader {
    /// Load options from `file` if given, otherwise from `T::ENV_VAR`.
    /// `Ok(None)` means neither source is present.
    pub fn load<T: LoadableOptions>(file: Option<&Path>) -> Result<Option<T>> {
        Self::load_from(file, T::ENV_VAR)
    }

    /// Like [`OptionsLoader::load`] with an explicit variable name.
    pub fn load_from<T: DeserializeOwned>(file: Option<&Path>, env_var: &str) -> Result<Option<T>> {
        if let Some(file) = file {
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read options file '{}'", file.display()))?;
            return Self::from_json(&content)
                .with_context(|| format!("invalid options in '{}'", file.display()))
                .map(Some);
        }

        match std::env::var(env_var) {
            Ok(value) if !value.trim().is_empty() => Self::from_json(&value)
                .with_context(|| format!("invalid options in ${env_var}"))
                .map(Some),
            _ => Ok(None),
        }
    }

    pub fn from_json<T: DeserializeOwned>(content: &str) -> Result<T> {
        Ok(serde_json::from_str(content)?)
    }
}

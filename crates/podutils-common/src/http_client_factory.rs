// HTTP clients for the artifact store and the status reporter.

use anyhow::{Context, Result};
use podutils_sdk::{PodUtilsPackage, StringUtil};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;

use crate::constants::{defaults, env};

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Create a `reqwest::Client` with the package user agent and the given
    /// request timeout.
    ///
    /// If `PODUTILS_TLS_NO_VERIFY` is set to a true value, TLS certificate
    /// verification is disabled.
    pub fn create_client(timeout: Duration) -> Result<Client> {
        let mut builder = Client::builder()
            .user_agent(PodUtilsPackage::user_agent())
            .timeout(timeout);

        if let Ok(val) = std::env::var(env::TLS_NO_VERIFY) {
            if StringUtil::convert_to_bool(&val) == Some(true) {
                tracing::warn!("TLS certificate verification is disabled");
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder.build().context("failed to build HTTP client")
    }

    pub fn create_default_client() -> Result<Client> {
        Self::create_client(defaults::HTTP_REQUEST_TIMEOUT)
    }

    /// Read a bearer token from `token_file`. `None` in gives `None` out.
    pub fn read_bearer_token(token_file: Option<&Path>) -> Result<Option<String>> {
        let Some(path) = token_file else {
            return Ok(None);
        };
        let token = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read token file '{}'", path.display()))?;
        let token = token.trim();
        if token.is_empty() {
            anyhow::bail!("token file '{}' is empty", path.display());
        }
        Ok(Some(token.to_string()))
    }
}

// Named trace sources with secret masking.
// Sources created with `child` share one `SecretMasker`.

use crate::secret_masker::SecretMasker;
use podutils_sdk::trace::{TraceLevel, TraceWriter};
use std::sync::Arc;

/// A trace source that masks secrets before emitting through `tracing`.
#[derive(Debug, Clone)]
pub struct Tracing {
    name: String,
    secret_masker: Arc<SecretMasker>,
}

impl Tracing {
    pub fn new(name: impl Into<String>, secret_masker: Arc<SecretMasker>) -> Self {
        Self {
            name: name.into(),
            secret_masker,
        }
    }

    /// A source with no secrets registered.
    pub fn unmasked(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(SecretMasker::new()))
    }

    /// Another source sharing this one's masker.
    pub fn child(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.secret_masker.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn secret_masker(&self) -> &Arc<SecretMasker> {
        &self.secret_masker
    }
}

impl TraceWriter for Tracing {
    fn write(&self, level: TraceLevel, message: &str) {
        let masked = self.secret_masker.mask_secrets(message);
        let component = self.name.as_str();

        match level {
            TraceLevel::Error => tracing::error!(component, "{}", masked),
            TraceLevel::Warning => tracing::warn!(component, "{}", masked),
            TraceLevel::Info => tracing::info!(component, "{}", masked),
            TraceLevel::Verbose => tracing::debug!(component, "{}", masked),
        }
    }
}

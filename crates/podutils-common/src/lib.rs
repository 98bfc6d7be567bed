// podutils-common: Shared contracts and services for the pod utilities.
// Depends on `podutils-sdk`; consumed by the entrypoint, the sidecar and the
// publishing collaborators.

pub mod constants;
pub mod duration_serde;
pub mod http_client_factory;
pub mod logging;
pub mod marker;
pub mod options;
pub mod options_loader;
pub mod secret_masker;
#[cfg(unix)]
pub mod shutdown;
pub mod trace_source;
pub mod verdict;

// ---------------------------------------------------------------------------
// Re-exports for convenient access
// ---------------------------------------------------------------------------

pub use http_client_factory::HttpClientFactory;
pub use logging::TransientLog;
pub use marker::{Marker, MarkerError, MARKER_FORMAT_VERSION};
pub use options::{
    ArtifactStoreConfig, CensoringOptions, EntrypointOptions, JobMetadata, SidecarOptions,
    StatusReporterConfig, ValidationError, WrapperEntry,
};
pub use options_loader::{LoadableOptions, OptionsLoader};
pub use secret_masker::SecretMasker;
#[cfg(unix)]
pub use shutdown::install_shutdown_handler;
pub use trace_source::Tracing;
pub use verdict::{Failure, FailureReason, Verdict};

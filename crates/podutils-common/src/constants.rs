// Constants shared by the entrypoint and the sidecar.
// Exit codes and artifact names must stay stable across sibling versions.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Return codes
// ---------------------------------------------------------------------------

/// Exit codes with a reserved meaning. Any other value is the wrapped
/// process's own status.
pub mod return_code {
    pub const SUCCESS: i32 = 0;
    /// The wrapped process outlived its timeout.
    pub const TIMEOUT: i32 = 124;
    /// The entrypoint could not launch or supervise the process.
    pub const INTERNAL_ERROR: i32 = 127;
    /// The previous step's marker reported failure; the command did not run.
    pub const PREVIOUS_STEP_FAILED: i32 = 129;
    /// The entrypoint itself was interrupted.
    pub const ABORTED: i32 = 130;
}

// ---------------------------------------------------------------------------
// Environment variables
// ---------------------------------------------------------------------------

pub mod env {
    /// JSON-encoded `EntrypointOptions`.
    pub const ENTRYPOINT_OPTIONS: &str = "ENTRYPOINT_OPTIONS";
    /// JSON-encoded `SidecarOptions`.
    pub const SIDECAR_OPTIONS: &str = "SIDECAR_OPTIONS";
    /// Exported to the wrapped process when an artifact directory is configured.
    pub const ARTIFACTS: &str = "ARTIFACTS";
    /// Disables TLS verification for the HTTP collaborators.
    pub const TLS_NO_VERIFY: &str = "PODUTILS_TLS_NO_VERIFY";
}

// ---------------------------------------------------------------------------
// Artifact keys
// ---------------------------------------------------------------------------

pub mod artifact_keys {
    /// Process log key for a pod with a single wrapped container.
    pub const BUILD_LOG: &str = "build-log.txt";
    /// The sidecar's own structured log.
    pub const SIDECAR_LOG: &str = "sidecar-logs.json";
    /// Prefix for files collected from the declared artifact directory.
    pub const ARTIFACTS_PREFIX: &str = "artifacts";
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub mod defaults {
    use super::Duration;

    /// Overall deadline for all siblings to write their markers.
    pub const SIDECAR_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);
    /// First marker poll interval.
    pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
    /// Ceiling for the marker poll backoff.
    pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(10);
    /// Request timeout for the HTTP collaborators.
    pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_codes_are_distinct_and_nonzero() {
        let codes = [
            return_code::TIMEOUT,
            return_code::INTERNAL_ERROR,
            return_code::PREVIOUS_STEP_FAILED,
            return_code::ABORTED,
        ];
        for (i, a) in codes.iter().enumerate() {
            assert_ne!(*a, return_code::SUCCESS);
            assert!((1..=255).contains(a));
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn poll_defaults_are_ordered() {
        assert!(defaults::POLL_INTERVAL <= defaults::MAX_POLL_INTERVAL);
    }
}

// podutils-sidecar: Per-pod coordinator.
// Waits for every sibling's marker, ships logs and artifacts, and reports
// the job's verdict.

pub mod artifacts;
pub mod phase;
pub mod sidecar;

pub use phase::{Phase, PhaseTracker};
pub use sidecar::{RunOutcome, Sidecar, SidecarError, SIDECAR_FAILURE};

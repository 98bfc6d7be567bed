// podutils-entrypoint: Per-container wrapper.
// Runs the container's real command, records its output in the process log
// and its result in the marker the sidecar waits for.

pub mod cli;
pub mod entrypoint;

pub use cli::Args;
pub use entrypoint::Entrypoint;

// podutils-sdk: Foundation layer for the pod utilities.
// This crate has ZERO dependencies on other workspace crates and provides
// process supervision, tracing and file primitives shared by the entrypoint
// and the sidecar.

pub mod build_constants;
pub mod io_util;
pub mod poll_throttler;
pub mod process_invoker;
pub mod string_util;
pub mod trace;

// Re-export commonly used items at crate root
pub use build_constants::{PodUtilsPackage, Source};
pub use io_util::IOUtil;
pub use poll_throttler::PollThrottler;
pub use process_invoker::{ProcessError, ProcessInvoker, ProcessOutcome, ProcessStartInfo};
pub use string_util::StringUtil;
pub use trace::TraceWriter;

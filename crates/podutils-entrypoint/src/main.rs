// Entry point for the entrypoint binary.
//
// Resolves options, installs the signal handler and runs the wrapped command.
// The process exits with the command's code (or a reserved code) so the
// container status is usable without reading the marker.

use clap::Parser;
use podutils_common::constants::return_code;
use podutils_common::logging::init_logging;
use podutils_common::{install_shutdown_handler, EntrypointOptions, Marker, Tracing};
use podutils_sdk::{PodUtilsPackage, Source};
use std::sync::Arc;

use podutils_entrypoint::{Args, Entrypoint};

fn main() {
    let args = Args::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to build Tokio runtime: {e}");
            std::process::exit(return_code::INTERNAL_ERROR);
        }
    };

    let exit_code = runtime.block_on(async move { run(args).await });

    std::process::exit(exit_code);
}

async fn run(args: Args) -> i32 {
    if let Err(e) = init_logging(None) {
        eprintln!("{e:#}");
    }

    tracing::debug!(
        "{} {} (commit {})",
        PodUtilsPackage::PACKAGE_NAME,
        PodUtilsPackage::VERSION,
        Source::COMMIT_HASH
    );

    let options = match args.resolve() {
        Ok(options) => options,
        Err(e) => {
            tracing::error!("Could not resolve options: {e:#}");
            return return_code::INTERNAL_ERROR;
        }
    };

    if let Err(e) = options.validate() {
        tracing::error!("Invalid options: {e}");
        mark_invalid(&options, &e.to_string());
        return return_code::INTERNAL_ERROR;
    }

    let cancel = match install_shutdown_handler(false) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("Failed to install signal handlers: {e}");
            mark_invalid(&options, &format!("failed to install signal handlers: {e}"));
            return return_code::INTERNAL_ERROR;
        }
    };

    let trace = Arc::new(Tracing::unmasked(options.display_name()));
    Entrypoint::new(options, trace).run(cancel).await
}

/// Leave a marker when options are unusable but still name one, so the
/// sidecar does not wait out its deadline for a container that never ran.
fn mark_invalid(options: &EntrypointOptions, reason: &str) {
    if options.marker_file.as_os_str().is_empty() {
        return;
    }
    if let Err(e) = Marker::internal_error(reason).write(&options.marker_file) {
        tracing::error!("{e}");
    }
}

// Entry point for the sidecar binary.
//
// Logs go to stderr and to a transient JSON file that is uploaded with the
// artifacts and removed before the process exits.

use clap::Parser;
use podutils_common::logging::{init_logging, TransientLog};
use podutils_common::{install_shutdown_handler, OptionsLoader, SidecarOptions, Tracing};
use podutils_publish::{create_artifact_store, create_status_reporter};
use podutils_sdk::{PodUtilsPackage, Source, TraceWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use podutils_sidecar::{Sidecar, SIDECAR_FAILURE};

#[derive(Parser, Debug)]
#[command(name = "sidecar", version, about = "Wait for sibling containers and report the job's result")]
struct Args {
    /// JSON file holding the options; defaults to `$SIDECAR_OPTIONS`.
    #[arg(long)]
    options: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to build Tokio runtime: {e}");
            std::process::exit(SIDECAR_FAILURE);
        }
    };

    let exit_code = runtime.block_on(async move { run(args).await });

    std::process::exit(exit_code);
}

async fn run(args: Args) -> i32 {
    let log = match TransientLog::create() {
        Ok(log) => Some(log),
        Err(e) => {
            eprintln!("Unable to set up log file: {e:#}");
            None
        }
    };
    let writer = log.as_ref().and_then(|log| match log.writer() {
        Ok(writer) => Some(writer),
        Err(e) => {
            eprintln!("{e:#}");
            None
        }
    });
    if let Err(e) = init_logging(writer) {
        eprintln!("{e:#}");
    }

    let exit_code = run_sidecar(args, log.as_ref().map(TransientLog::path)).await;

    if let Some(log) = log {
        if let Err(e) = log.remove() {
            tracing::warn!("{e:#}");
        }
    }
    exit_code
}

async fn run_sidecar(args: Args, log_path: Option<&Path>) -> i32 {
    tracing::debug!(
        "{} {} (commit {})",
        PodUtilsPackage::PACKAGE_NAME,
        PodUtilsPackage::VERSION,
        Source::COMMIT_HASH
    );

    let options = match OptionsLoader::load::<SidecarOptions>(args.options.as_deref()) {
        Ok(Some(options)) => options,
        Ok(None) => {
            tracing::error!("Could not resolve options: pass --options or set $SIDECAR_OPTIONS");
            return SIDECAR_FAILURE;
        }
        Err(e) => {
            tracing::error!("Could not resolve options: {e:#}");
            return SIDECAR_FAILURE;
        }
    };

    if let Err(e) = options.validate() {
        tracing::error!("Invalid options: {e}");
        return SIDECAR_FAILURE;
    }

    let source = Tracing::unmasked("sidecar");
    let trace: Arc<dyn TraceWriter> = Arc::new(source.clone());
    let publish_trace: Arc<dyn TraceWriter> = Arc::new(source.child("publish"));

    let (Some(store_config), Some(reporter_config)) =
        (&options.artifact_store, &options.status_reporter)
    else {
        tracing::error!("Invalid options: artifact store and status reporter are required");
        return SIDECAR_FAILURE;
    };
    let store = match create_artifact_store(store_config, publish_trace.clone()) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Could not set up the artifact store: {e:#}");
            return SIDECAR_FAILURE;
        }
    };
    let reporter = match create_status_reporter(reporter_config, publish_trace) {
        Ok(reporter) => reporter,
        Err(e) => {
            tracing::error!("Could not set up the status reporter: {e:#}");
            return SIDECAR_FAILURE;
        }
    };

    let cancel = match install_shutdown_handler(options.ignore_interrupts) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("Failed to install signal handlers: {e}");
            return SIDECAR_FAILURE;
        }
    };

    let entry_error = options.entry_error;
    let sidecar = Sidecar::new(options, store, reporter, trace);
    let outcome = sidecar.run(cancel, log_path).await;

    if !outcome.errors.is_empty() {
        tracing::error!("Sidecar finished with {} errors", outcome.errors.len());
    }
    if entry_error && outcome.failure_count > 0 {
        tracing::error!("{} containers failed", outcome.failure_count);
    }
    outcome.exit_code(entry_error)
}

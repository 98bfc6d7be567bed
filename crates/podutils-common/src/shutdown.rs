use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Install a handler for SIGTERM and SIGINT.
///
/// Returns a `CancellationToken` that is cancelled on the first signal. With
/// `ignore_interrupts` the signals are logged and swallowed instead, and the
/// token only fires if the caller cancels it.
pub fn install_shutdown_handler(ignore_interrupts: bool) -> std::io::Result<CancellationToken> {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
                _ = token_clone.cancelled() => return,
            };

            if ignore_interrupts {
                tracing::warn!("Received {name}, ignoring as configured");
                continue;
            }

            tracing::info!("Received {name}, initiating graceful shutdown");
            token_clone.cancel();
            return;
        }
    });

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handler_task_ends_when_token_cancelled() {
        let token = install_shutdown_handler(true).unwrap();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Create a `CancellationToken` and spawn a task that cancels it on
/// SIGINT or SIGTERM.
///
/// Signal handlers are installed before this returns, so a failure to
/// install them is a startup error rather than a panic in the task.
#[cfg(unix)]
pub fn create_shutdown_token() -> Result<CancellationToken> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let received = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!(signal = received, "Received shutdown signal");
        token_clone.cancel();
    });

    Ok(token)
}

/// Create a `CancellationToken` cancelled on Ctrl+C.
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
pub fn create_shutdown_token() -> Result<CancellationToken> {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!(signal = "SIGINT", "Received shutdown signal"),
            Err(e) => tracing::error!(error = %e, "Failed to wait for Ctrl+C, shutting down"),
        }
        token_clone.cancel();
    });

    Ok(token)
}

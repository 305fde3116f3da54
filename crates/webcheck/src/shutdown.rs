//! Process shutdown: SIGINT/SIGTERM cancel a token the loops watch.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancels `cancel` on the first shutdown signal. Returns after cancelling.
pub async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
        () = cancel.cancelled() => return,
    }

    cancel.cancel();
}

/// A token cancelled by SIGINT/SIGTERM, with the listener running in the background.
pub fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));
    cancel
}

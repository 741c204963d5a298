//! Signal handling for graceful shutdown

use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Setup signal handlers for graceful shutdown
///
/// The returned receiver yields once Ctrl+C or SIGTERM is received.
pub fn setup_signal_handlers() -> Result<mpsc::Receiver<()>> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

    // Handle Ctrl+C (SIGINT)
    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C signal: {}", e);
            return;
        }

        info!("Ctrl+C signal received");
        let _ = ctrl_c_tx.try_send(());
    });

    // Handle SIGTERM (Unix only)
    #[cfg(unix)]
    {
        use signal_hook::consts::SIGTERM;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGTERM, shutdown_flag.clone())?;

        tokio::spawn(async move {
            // Poll for signal
            loop {
                if shutdown_flag.load(Ordering::Relaxed) {
                    info!("SIGTERM signal received");
                    let _ = shutdown_tx.try_send(());
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });
    }

    Ok(shutdown_rx)
}

/// Resolve when the first shutdown signal arrives
pub async fn wait_for_shutdown(mut signals: mpsc::Receiver<()>) {
    let _ = signals.recv().await;
}

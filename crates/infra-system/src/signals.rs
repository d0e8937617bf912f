// SIGTERM/SIGINT -> graceful shutdown

use lightq_core::application::worker::{shutdown_channel, ShutdownSender, ShutdownToken};
use lightq_core::error::Result;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

/// Install SIGTERM and SIGINT handlers that request shutdown on the first signal.
///
/// The returned sender can also trigger shutdown programmatically.
pub fn shutdown_on_signals() -> Result<(ShutdownSender, ShutdownToken)> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let (sender, token) = shutdown_channel();

    let trigger = sender.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating graceful shutdown");
            }
        }
        trigger.shutdown();
    });

    Ok((sender, token))
}

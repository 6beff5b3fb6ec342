//! Signal handling.

use tokio_util::sync::CancellationToken;

/// Cancel `token` on SIGINT (Ctrl+C) or, on unix, SIGTERM.
///
/// # Errors
///
/// Returns an error if the SIGTERM handler cannot be installed.
pub fn install_signal_handler(token: CancellationToken) -> std::io::Result<()> {
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            tokio::select! {
                _ = ctrl_c => tracing::info!("received SIGINT, initiating shutdown"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM, initiating shutdown"),
                () = token.cancelled() => return,
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = ctrl_c => tracing::info!("received Ctrl+C, initiating shutdown"),
                () = token.cancelled() => return,
            }
        }

        token.cancel();
    });

    Ok(())
}

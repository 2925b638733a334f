use std::result;

use tokio::signal;

/// Resolves on Ctrl+C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// Value parser for `--port`. Port 0 would bind an ephemeral port, which
/// clients could not find.
pub fn parse_port(s: &str) -> result::Result<u16, String> {
    match s.trim().parse::<u16>() {
        Ok(0) => Err("port 0 is not allowed, use 1-65535".to_string()),
        Ok(port) => Ok(port),
        Err(err) => Err(format!("`{s}` is not a valid port: {err}")),
    }
}

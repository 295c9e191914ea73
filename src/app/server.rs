use tracing::debug;

use crate::error::AppResult;
use crate::server::{ServerConfig, TargetServer};
use crate::shutdown::shutdown_channel;
use crate::shutdown_handlers::setup_signal_shutdown_handler;

/// Serves the target endpoints until SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns an error when the listen address cannot be bound.
pub async fn run_server(config: ServerConfig) -> AppResult<()> {
    let server = TargetServer::bind(config).await?;
    let (shutdown_tx, _) = shutdown_channel();
    let signal_handle = setup_signal_shutdown_handler(&shutdown_tx);

    server.serve(shutdown_tx).await;

    if let Err(err) = signal_handle.await {
        debug!("signal handler task ended abnormally: {}", err);
    }
    Ok(())
}

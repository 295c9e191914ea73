//! Target service for the load generator: a liveness route with artificial
//! latency and a WebSocket echo route with keepalive.
mod connection;
mod echo;


use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::error::{AppResult, ServerError};
use crate::shutdown::ShutdownSender;

use connection::{ECHO_ROUTE, PING_ROUTE, Routes, serve_connection};

pub use echo::{EchoTimings, MAX_MESSAGE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Wait applied before every liveness answer.
    pub ping_latency: Duration,
    pub echo: EchoTimings,
}

impl ServerConfig {
    /// Config with the standard echo keepalive timings.
    #[must_use]
    pub fn new(listen: SocketAddr, ping_latency: Duration) -> Self {
        Self {
            listen,
            ping_latency,
            echo: EchoTimings::default(),
        }
    }
}

/// Bound target service, ready to accept connections.
pub struct TargetServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    routes: Routes,
}

impl TargetServer {
    /// # Errors
    ///
    /// Returns an error when the listen address cannot be bound.
    pub async fn bind(config: ServerConfig) -> AppResult<Self> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|err| ServerError::Bind {
                addr: config.listen,
                source: err,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| ServerError::LocalAddr { source: err })?;
        Ok(Self {
            listener,
            local_addr,
            routes: Routes {
                ping_latency: config.ping_latency,
                echo: config.echo,
            },
        })
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until shutdown. Each connection runs on its own
    /// task and ends on the same shutdown signal.
    pub async fn serve(self, shutdown_tx: ShutdownSender) {
        let mut shutdown_rx = shutdown_tx.subscribe();
        info!(
            addr = %self.local_addr,
            ping_latency = ?self.routes.ping_latency,
            "serving http server on {} and {}",
            PING_ROUTE,
            ECHO_ROUTE
        );
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!("Failed to accept connection: {}", err);
                            continue;
                        }
                    };
                    let routes = self.routes;
                    let connection_rx = shutdown_tx.subscribe();
                    tokio::spawn(async move {
                        if let Err(err) = serve_connection(stream, routes, connection_rx).await {
                            debug!("Connection from {} failed: {}", peer, err);
                        }
                    });
                }
            }
        }
        info!("Target server stopped");
    }
}

use std::net::SocketAddr;

use http::StatusCode;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::{AppResult, ServerError};
use crate::http::wire::{HttpConnection, Response};
use crate::shutdown::ShutdownSender;
use crate::workload::ConcurrencyLimiter;

use super::exposition::{EXPOSITION_CONTENT_TYPE, RunGauges, render_exposition};
use super::intake::DropCounter;
use super::sink::CountersView;

const METRICS_PATH: &str = "/metrics";

/// Everything the endpoint reads to render one scrape.
#[derive(Debug, Clone)]
pub struct MetricsState {
    pub view: CountersView,
    pub dropped: DropCounter,
    pub limiter: ConcurrencyLimiter,
}

impl MetricsState {
    #[must_use]
    pub fn render(&self) -> String {
        let gauges = RunGauges {
            dropped: self.dropped.get(),
            in_flight: self.limiter.held(),
            concurrency_limit: self.limiter.capacity(),
        };
        self.view
            .with(|counters| render_exposition(counters, gauges))
    }
}

/// Prometheus scrape listener. Serves one request per connection.
pub struct MetricsEndpoint {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: MetricsState,
}

impl MetricsEndpoint {
    /// # Errors
    ///
    /// Returns an error when the address cannot be bound.
    pub async fn bind(addr: SocketAddr, state: MetricsState) -> AppResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| ServerError::Bind { addr, source: err })?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| ServerError::LocalAddr { source: err })?;
        Ok(Self {
            listener,
            local_addr,
            state,
        })
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts scrapes until shutdown. Per-connection failures are logged and
    /// never end the loop.
    pub async fn serve(self, shutdown_tx: ShutdownSender) {
        let mut shutdown_rx = shutdown_tx.subscribe();
        info!("Metrics endpoint listening on http://{}{}", self.local_addr, METRICS_PATH);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!("Failed to accept metrics connection: {}", err);
                            continue;
                        }
                    };
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_scrape(stream, &state).await {
                            debug!("Metrics request from {} failed: {}", peer, err);
                        }
                    });
                }
            }
        }
        debug!("Metrics endpoint stopped");
    }
}

async fn handle_scrape(stream: TcpStream, state: &MetricsState) -> Result<(), ServerError> {
    let mut connection = HttpConnection::new(stream);
    let Some(head) = connection.read_head().await? else {
        return Ok(());
    };

    if head.path != METRICS_PATH {
        return connection
            .write_response(&Response::text(StatusCode::NOT_FOUND, "not found\n"), false)
            .await;
    }
    if head.method != "GET" {
        return connection
            .write_response(
                &Response::text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n"),
                false,
            )
            .await;
    }

    let body = state.render();
    let response = Response {
        status: StatusCode::OK,
        content_type: Some(EXPOSITION_CONTENT_TYPE),
        body: body.as_bytes(),
    };
    connection.write_response(&response, false).await
}

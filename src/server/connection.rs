use std::time::Duration;

use http::StatusCode;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use crate::error::ServerError;
use crate::http::wire::{HttpConnection, RequestHead, Response};
use crate::shutdown::ShutdownReceiver;

use super::echo::{self, EchoTimings};

pub(super) const PING_ROUTE: &str = "/http/ping";
pub(super) const ECHO_ROUTE: &str = "/ws";

/// How long a keep-alive connection may sit idle between requests.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-connection settings shared by every accepted connection.
#[derive(Debug, Clone, Copy)]
pub(super) struct Routes {
    pub(super) ping_latency: Duration,
    pub(super) echo: EchoTimings,
}

enum Next {
    KeepReading,
    Close,
}

/// Serves requests on one connection until the peer leaves, the connection
/// goes idle, a response asks to close, or shutdown fires.
pub(super) async fn serve_connection<S>(
    stream: S,
    routes: Routes,
    mut shutdown_rx: ShutdownReceiver,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut connection = HttpConnection::new(stream);
    loop {
        let head = tokio::select! {
            _ = shutdown_rx.recv() => return Ok(()),
            read = timeout(IDLE_TIMEOUT, connection.read_head()) => match read {
                Ok(Ok(Some(head))) => head,
                Ok(Ok(None)) | Err(_) => return Ok(()),
                Ok(Err(err)) => {
                    reject_malformed(&mut connection, &err).await;
                    return Err(err);
                }
            },
        };

        if head.path == ECHO_ROUTE {
            return echo::upgrade(connection, &head, routes.echo, shutdown_rx).await;
        }

        let next = if head.path == PING_ROUTE {
            ping(&mut connection, &head, routes.ping_latency, &mut shutdown_rx).await?
        } else {
            not_found(&mut connection, &head).await?
        };
        if matches!(next, Next::Close) {
            return Ok(());
        }
    }
}

/// Liveness: wait the configured latency, then answer 200 with no body.
/// Any method is accepted.
async fn ping<S>(
    connection: &mut HttpConnection<S>,
    head: &RequestHead,
    latency: Duration,
    shutdown_rx: &mut ShutdownReceiver,
) -> Result<Next, ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let keep_alive = consume_body(connection, head).await?;
    if !latency.is_zero() {
        tokio::select! {
            _ = shutdown_rx.recv() => return Ok(Next::Close),
            () = tokio::time::sleep(latency) => {}
        }
    }
    connection
        .write_response(&Response::empty(StatusCode::OK), keep_alive)
        .await?;
    Ok(if keep_alive {
        Next::KeepReading
    } else {
        Next::Close
    })
}

async fn not_found<S>(
    connection: &mut HttpConnection<S>,
    head: &RequestHead,
) -> Result<Next, ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let keep_alive = consume_body(connection, head).await?;
    connection
        .write_response(
            &Response::text(StatusCode::NOT_FOUND, "404 page not found\n"),
            keep_alive,
        )
        .await?;
    Ok(if keep_alive {
        Next::KeepReading
    } else {
        Next::Close
    })
}

/// Skips the request body. Returns whether the connection can carry another
/// request afterwards; chunked bodies are not parsed, so they end it.
async fn consume_body<S>(
    connection: &mut HttpConnection<S>,
    head: &RequestHead,
) -> Result<bool, ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if head.is_chunked() {
        return Ok(false);
    }
    connection.discard_body(head.content_length()?).await?;
    Ok(head.keep_alive())
}

async fn reject_malformed<S>(connection: &mut HttpConnection<S>, err: &ServerError)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let response = match err {
        ServerError::RequestTooLarge { .. } => Response::text(
            StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            "request header too large\n",
        ),
        ServerError::MalformedRequest { .. } => {
            Response::text(StatusCode::BAD_REQUEST, "malformed request\n")
        }
        ServerError::Bind { .. }
        | ServerError::LocalAddr { .. }
        | ServerError::ReadRequest { .. }
        | ServerError::WriteResponse { .. } => return,
    };
    let _written = connection.write_response(&response, false).await;
}

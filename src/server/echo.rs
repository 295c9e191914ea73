use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until, timeout};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role, WebSocketConfig};
use tracing::debug;

use crate::error::ServerError;
use crate::http::wire::{HttpConnection, RequestHead, Response};
use crate::shutdown::ShutdownReceiver;

/// Largest accepted message, and frame, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 16 << 20;

const WEBSOCKET_VERSION: &str = "13";
const MIN_PING_PERIOD: Duration = Duration::from_millis(1);

/// Keepalive and deadline settings of an echo session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoTimings {
    /// Bound on every single write, including pings and the close frame.
    pub write_wait: Duration,
    /// Read deadline, pushed forward by every received frame.
    pub pong_wait: Duration,
    /// Keepalive ping cadence. Kept below `pong_wait`.
    pub ping_period: Duration,
}

impl Default for EchoTimings {
    fn default() -> Self {
        Self {
            write_wait: Duration::from_secs(10),
            pong_wait: Duration::from_secs(60),
            ping_period: Duration::from_secs(54),
        }
    }
}

/// Why an echo session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SessionEnd {
    PeerClosed,
    ReadTimeout,
    ReadFailed,
    WriteFailed,
    Shutdown,
}

/// Validates the upgrade request, answers it, and runs the echo session on
/// the same connection. Invalid upgrades get a plain HTTP error response.
pub(super) async fn upgrade<S>(
    mut connection: HttpConnection<S>,
    head: &RequestHead,
    timings: EchoTimings,
    shutdown_rx: ShutdownReceiver,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if head.method != "GET" {
        return connection
            .write_response(
                &Response::text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n"),
                false,
            )
            .await;
    }
    let Some(key) = handshake_key(head).filter(|_key| !connection.has_buffered_input()) else {
        return connection
            .write_response(
                &Response::text(StatusCode::BAD_REQUEST, "bad websocket handshake\n"),
                false,
            )
            .await;
    };

    let accept = derive_accept_key(key.as_bytes());
    let switching = format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        accept
    );
    connection
        .write_raw(switching.as_bytes(), "upgrade response")
        .await?;

    let socket = WebSocketStream::from_raw_socket(
        connection.into_inner(),
        Role::Server,
        Some(session_config()),
    )
    .await;
    let end = run_session(socket, timings, shutdown_rx).await;
    debug!(?end, "echo session ended");
    Ok(())
}

fn handshake_key(head: &RequestHead) -> Option<String> {
    if !head.header_has_token("upgrade", "websocket")
        || !head.header_has_token("connection", "upgrade")
        || head.header("sec-websocket-version") != Some(WEBSOCKET_VERSION)
    {
        return None;
    }
    head.header("sec-websocket-key")
        .filter(|key| !key.is_empty())
        .map(str::to_owned)
}

fn session_config() -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(MAX_MESSAGE_SIZE);
    config.max_frame_size = Some(MAX_MESSAGE_SIZE);
    config
}

/// Echoes text and binary messages verbatim until the peer leaves, a read
/// fails or times out, or shutdown fires. Every exit except a write failure
/// sends a normal-closure close frame.
pub(super) async fn run_session<S>(
    mut socket: WebSocketStream<S>,
    timings: EchoTimings,
    mut shutdown_rx: ShutdownReceiver,
) -> SessionEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ping_period = timings.ping_period.max(MIN_PING_PERIOD);
    let first_ping = deadline_after(ping_period);
    let mut keepalive = interval_at(first_ping, ping_period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut read_deadline = deadline_after(timings.pong_wait);

    let end = loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break SessionEnd::Shutdown,
            () = sleep_until(read_deadline) => break SessionEnd::ReadTimeout,
            _ = keepalive.tick() => {
                if !send_bounded(&mut socket, Message::Ping(Vec::new()), timings.write_wait).await {
                    break SessionEnd::WriteFailed;
                }
            }
            frame = socket.next() => {
                let message = match frame {
                    None => break SessionEnd::PeerClosed,
                    Some(Err(err)) => {
                        debug!("echo read failed: {}", err);
                        break SessionEnd::ReadFailed;
                    }
                    Some(Ok(message)) => message,
                };
                read_deadline = deadline_after(timings.pong_wait);
                match message {
                    Message::Text(_) | Message::Binary(_) => {
                        if !send_bounded(&mut socket, message, timings.write_wait).await {
                            break SessionEnd::WriteFailed;
                        }
                    }
                    // The close reply is queued by the protocol layer; keep
                    // reading until the stream ends.
                    Message::Close(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                }
            }
        }
    };

    if end != SessionEnd::WriteFailed && end != SessionEnd::PeerClosed {
        let close = Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        }));
        let _sent = send_bounded(&mut socket, close, timings.write_wait).await;
    }
    end
}

async fn send_bounded<S>(socket: &mut WebSocketStream<S>, message: Message, limit: Duration) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match timeout(limit, socket.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            debug!("echo write failed: {}", err);
            false
        }
        Err(_elapsed) => {
            debug!("echo write exceeded {:?}", limit);
            false
        }
    }
}

fn deadline_after(wait: Duration) -> Instant {
    Instant::now().checked_add(wait).unwrap_or_else(Instant::now)
}

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read local address: {source}")]
    LocalAddr {
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read request: {source}")]
    ReadRequest {
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed request: {reason}")]
    MalformedRequest { reason: &'static str },
    #[error("Request head exceeds {limit} bytes.")]
    RequestTooLarge { limit: usize },
    #[error("Failed to write {context}: {source}")]
    WriteResponse {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

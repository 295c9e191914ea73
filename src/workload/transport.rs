use async_trait::async_trait;
use http::StatusCode;

use crate::error::TransportError;

/// A completed call. Only the status is kept; the body is drained and
/// discarded by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallResponse {
    pub status: StatusCode,
}

/// Performs one outbound call against the target's liveness endpoint.
///
/// Implementations must not retry and must not impose their own deadline;
/// the executor owns both.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn call(&self) -> Result<CallResponse, TransportError>;
}

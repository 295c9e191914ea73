use http::StatusCode;

use crate::error::TransportError;

/// Status code recorded when a call never produced a response.
pub const TRANSPORT_FAILURE_CODE: i32 = -1;

/// The one status the aggregator classifies as a success.
pub const SUCCESS_STATUS: i32 = 200;

/// Result of a single call, keyed by `(status_code, status_label)` when
/// aggregated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Outcome {
    pub status_code: i32,
    pub status_label: String,
}

impl Outcome {
    #[must_use]
    pub fn response(status: StatusCode) -> Self {
        Self {
            status_code: i32::from(status.as_u16()),
            status_label: status.canonical_reason().unwrap_or("Unknown").to_owned(),
        }
    }

    #[must_use]
    pub fn transport_failure(err: &TransportError) -> Self {
        Self {
            status_code: TRANSPORT_FAILURE_CODE,
            status_label: err.to_string(),
        }
    }

    #[must_use]
    pub const fn is_transport_failure(&self) -> bool {
        self.status_code == TRANSPORT_FAILURE_CODE
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status_code == SUCCESS_STATUS
    }
}

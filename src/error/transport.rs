use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to build HTTP client: {source}")]
    BuildClient {
        #[source]
        source: reqwest::Error,
    },
    #[error("{description}")]
    Request { description: String },
    #[error("failed to read response body: {description}")]
    ReadBody { description: String },
    #[error("request deadline of {deadline:?} exceeded")]
    DeadlineExceeded { deadline: Duration },
}

impl TransportError {
    /// Builds a request failure whose description includes the whole source
    /// chain, since reqwest's top-level message omits the root cause.
    pub(crate) fn request(err: &reqwest::Error) -> Self {
        Self::Request {
            description: describe_chain(err),
        }
    }

    pub(crate) fn read_body(err: &reqwest::Error) -> Self {
        Self::ReadBody {
            description: describe_chain(err),
        }
    }
}

fn describe_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut description = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !description.contains(&cause_text) {
            description.push_str(": ");
            description.push_str(&cause_text);
        }
        source = cause.source();
    }
    description
}

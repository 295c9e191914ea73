use async_trait::async_trait;
use futures_util::StreamExt;
use http::HeaderValue;
use http::header::AUTHORIZATION;
use reqwest::Client;
use url::Url;

use crate::args::DEFAULT_USER_AGENT;
use crate::error::{AppError, ConfigError, TransportError};
use crate::workload::{CallResponse, Transport};

/// Path of the liveness route, relative to the target base address.
pub const PING_PATH: &str = "http/ping";

/// Liveness calls against `{base}/http/ping` over a pooled reqwest client.
///
/// The client carries no timeout of its own; the executor's deadline bounds
/// every call.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    ping_url: Url,
    authorization: HeaderValue,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns an error when the credential is not a valid header value or
    /// the HTTP client cannot be built.
    pub fn new(base: &Url, credential: &str) -> Result<Self, AppError> {
        let mut authorization = HeaderValue::from_str(credential)
            .map_err(|err| ConfigError::InvalidAuthorization { source: err })?;
        authorization.set_sensitive(true);

        let client = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|err| TransportError::BuildClient { source: err })?;

        Ok(Self {
            client,
            ping_url: ping_url(base),
            authorization,
        })
    }

    #[must_use]
    pub const fn ping_url(&self) -> &Url {
        &self.ping_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self) -> Result<CallResponse, TransportError> {
        let response = self
            .client
            .get(self.ping_url.clone())
            .header(AUTHORIZATION, self.authorization.clone())
            .send()
            .await
            .map_err(|err| TransportError::request(&err))?;
        let status = response.status();
        drain_response_body(response)
            .await
            .map_err(|err| TransportError::read_body(&err))?;
        Ok(CallResponse { status })
    }
}

/// Joins the liveness path onto the base address, keeping any path prefix
/// the base already carries.
pub(crate) fn ping_url(base: &Url) -> Url {
    let mut url = base.clone();
    let prefix = base.path().trim_end_matches('/');
    url.set_path(&format!("{prefix}/{PING_PATH}"));
    url.set_query(None);
    url.set_fragment(None);
    url
}

async fn drain_response_body(response: reqwest::Response) -> Result<u64, reqwest::Error> {
    let mut stream = response.bytes_stream();
    let mut total_bytes: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let bytes = chunk?;
        total_bytes = total_bytes.saturating_add(u64::try_from(bytes.len()).unwrap_or(u64::MAX));
    }
    Ok(total_bytes)
}

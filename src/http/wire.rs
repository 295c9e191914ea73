use std::collections::HashMap;

use http::StatusCode;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ServerError;

/// Upper bound on a request line plus headers.
pub(crate) const MAX_HEAD_BYTES: usize = 16 * 1024;
const READ_CHUNK_BYTES: usize = 1024;
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Parsed request line and headers. Header names are stored lowercase and the
/// query string is stripped from the path.
#[derive(Debug, Clone)]
pub(crate) struct RequestHead {
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) version: String,
    headers: HashMap<String, String>,
}

impl RequestHead {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// True when the comma-separated header value lists `token`, ignoring case.
    pub(crate) fn header_has_token(&self, name: &str, token: &str) -> bool {
        self.header(name).is_some_and(|value| {
            value
                .split(',')
                .any(|item| item.trim().eq_ignore_ascii_case(token))
        })
    }

    pub(crate) fn content_length(&self) -> Result<usize, ServerError> {
        match self.header("content-length") {
            None => Ok(0),
            Some(value) => value
                .trim()
                .parse::<usize>()
                .map_err(|_err| ServerError::MalformedRequest {
                    reason: "invalid content-length",
                }),
        }
    }

    pub(crate) fn is_chunked(&self) -> bool {
        self.header_has_token("transfer-encoding", "chunked")
    }

    /// HTTP/1.1 defaults to persistent connections, HTTP/1.0 to close.
    pub(crate) fn keep_alive(&self) -> bool {
        if self.header_has_token("connection", "close") {
            return false;
        }
        if self.version.eq_ignore_ascii_case("HTTP/1.0") {
            return self.header_has_token("connection", "keep-alive");
        }
        true
    }
}

/// Buffered HTTP/1.1 connection. Bytes read past a request head stay in the
/// buffer for the next read.
#[derive(Debug)]
pub(crate) struct HttpConnection<S> {
    stream: S,
    buffer: Vec<u8>,
}

impl<S> HttpConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::with_capacity(READ_CHUNK_BYTES),
        }
    }

    /// Reads the next request head. `Ok(None)` means the peer closed the
    /// connection cleanly between requests.
    pub(crate) async fn read_head(&mut self) -> Result<Option<RequestHead>, ServerError> {
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        loop {
            if let Some(end) = find_head_end(&self.buffer) {
                let consumed = end
                    .checked_add(HEAD_TERMINATOR.len())
                    .ok_or(ServerError::MalformedRequest {
                        reason: "request head overflow",
                    })?;
                let head_bytes: Vec<u8> = self.buffer.drain(..consumed).collect();
                let text = head_bytes.get(..end).unwrap_or_default();
                return parse_head(text).map(Some);
            }
            if self.buffer.len() > MAX_HEAD_BYTES {
                return Err(ServerError::RequestTooLarge {
                    limit: MAX_HEAD_BYTES,
                });
            }
            let bytes = self
                .stream
                .read(&mut chunk)
                .await
                .map_err(|err| ServerError::ReadRequest { source: err })?;
            if bytes == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(ServerError::MalformedRequest {
                    reason: "connection closed mid-request",
                });
            }
            let read_slice = chunk
                .get(..bytes)
                .ok_or(ServerError::MalformedRequest {
                    reason: "invalid read length",
                })?;
            self.buffer.extend_from_slice(read_slice);
        }
    }

    /// Consumes and discards a request body of `length` bytes.
    pub(crate) async fn discard_body(&mut self, length: usize) -> Result<(), ServerError> {
        let buffered = self.buffer.len().min(length);
        self.buffer.drain(..buffered);
        let mut remaining = length.saturating_sub(buffered);
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        while remaining > 0 {
            let bytes = self
                .stream
                .read(&mut chunk)
                .await
                .map_err(|err| ServerError::ReadRequest { source: err })?;
            if bytes == 0 {
                return Err(ServerError::MalformedRequest {
                    reason: "connection closed mid-body",
                });
            }
            if bytes > remaining {
                let extra = chunk.get(remaining..bytes).unwrap_or_default();
                self.buffer.extend_from_slice(extra);
                remaining = 0;
            } else {
                remaining = remaining.saturating_sub(bytes);
            }
        }
        Ok(())
    }

    /// True when bytes beyond the last request head have already arrived.
    pub(crate) fn has_buffered_input(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub(crate) async fn write_response(
        &mut self,
        response: &Response<'_>,
        keep_alive: bool,
    ) -> Result<(), ServerError> {
        let content_type = response
            .content_type
            .map(|value| format!("Content-Type: {}\r\n", value))
            .unwrap_or_default();
        let head = format!(
            "HTTP/1.1 {} {}\r\n{}Content-Length: {}\r\nConnection: {}\r\n\r\n",
            response.status.as_u16(),
            response.status.canonical_reason().unwrap_or("Unknown"),
            content_type,
            response.body.len(),
            if keep_alive { "keep-alive" } else { "close" }
        );
        self.stream
            .write_all(head.as_bytes())
            .await
            .map_err(|err| ServerError::WriteResponse {
                context: "response head",
                source: err,
            })?;
        self.stream
            .write_all(response.body)
            .await
            .map_err(|err| ServerError::WriteResponse {
                context: "response body",
                source: err,
            })?;
        self.stream
            .flush()
            .await
            .map_err(|err| ServerError::WriteResponse {
                context: "response",
                source: err,
            })
    }

    /// Writes raw bytes, used for protocol switch responses.
    pub(crate) async fn write_raw(
        &mut self,
        bytes: &[u8],
        context: &'static str,
    ) -> Result<(), ServerError> {
        self.stream
            .write_all(bytes)
            .await
            .map_err(|err| ServerError::WriteResponse {
                context,
                source: err,
            })?;
        self.stream
            .flush()
            .await
            .map_err(|err| ServerError::WriteResponse {
                context,
                source: err,
            })
    }

    pub(crate) fn into_inner(self) -> S {
        self.stream
    }
}

/// A complete response with a borrowed body.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Response<'body> {
    pub(crate) status: StatusCode,
    pub(crate) content_type: Option<&'static str>,
    pub(crate) body: &'body [u8],
}

impl Response<'static> {
    pub(crate) const fn empty(status: StatusCode) -> Self {
        Self {
            status,
            content_type: None,
            body: b"",
        }
    }

    pub(crate) const fn text(status: StatusCode, body: &'static str) -> Self {
        Self {
            status,
            content_type: Some("text/plain; charset=utf-8"),
            body: body.as_bytes(),
        }
    }
}

fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
}

fn parse_head(bytes: &[u8]) -> Result<RequestHead, ServerError> {
    let text = std::str::from_utf8(bytes).map_err(|_err| ServerError::MalformedRequest {
        reason: "request head is not UTF-8",
    })?;
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or(ServerError::MalformedRequest {
        reason: "missing request line",
    })?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or(ServerError::MalformedRequest {
        reason: "missing method",
    })?;
    let target = parts.next().ok_or(ServerError::MalformedRequest {
        reason: "missing request target",
    })?;
    let version = parts.next().ok_or(ServerError::MalformedRequest {
        reason: "missing HTTP version",
    })?;
    if !version.starts_with("HTTP/1.") {
        return Err(ServerError::MalformedRequest {
            reason: "unsupported HTTP version",
        });
    }
    let path = target.split('?').next().unwrap_or(target);

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(ServerError::MalformedRequest {
                reason: "malformed header",
            });
        };
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    Ok(RequestHead {
        method: method.to_owned(),
        path: path.to_owned(),
        version: version.to_owned(),
        headers,
    })
}

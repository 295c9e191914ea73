//! HTTP plumbing: the reqwest-backed liveness transport and the minimal
//! HTTP/1.1 wire handling shared by the target server and the metrics
//! endpoint.
mod transport;
pub(crate) mod wire;


pub use transport::{HttpTransport, PING_PATH};

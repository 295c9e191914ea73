use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

pub(crate) const DEFAULT_USER_AGENT: &str = concat!("loadtest/", env!("CARGO_PKG_VERSION"));

/// Environment variable holding the `Authorization` header value.
pub const AUTH_ENV_VAR: &str = "AUTH";

pub(crate) const DEFAULT_TARGET_ADDR: &str = "http://localhost:8080";
pub(crate) const DEFAULT_CONCURRENCY: usize = 100;
pub(crate) const DEFAULT_WAIT: Duration = Duration::from_millis(1);
pub(crate) const DEFAULT_METRICS_LISTEN: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 9090);

pub(crate) const DEFAULT_SERVER_LISTEN: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080);
pub(crate) const DEFAULT_PING_LATENCY: Duration = Duration::from_millis(10);

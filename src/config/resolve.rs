use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use url::Url;

use crate::args::{
    ClientArgs, DEFAULT_CONCURRENCY, DEFAULT_METRICS_LISTEN, DEFAULT_PING_LATENCY,
    DEFAULT_SERVER_LISTEN, DEFAULT_TARGET_ADDR, DEFAULT_WAIT, PositiveUsize, ServerArgs,
};
use crate::error::{AppResult, ConfigError, ValidationError};
use crate::server::ServerConfig;
use crate::workload::WorkloadConfig;

use super::types::{ClientSection, ConfigFile, DurationValue, ServerSection};

/// Everything a client run needs, after flags, file and defaults are merged.
#[derive(Clone)]
pub struct ClientSettings {
    pub target: Url,
    pub credential: String,
    pub workload: WorkloadConfig,
    /// `None` when the metrics endpoint is disabled.
    pub metrics_listen: Option<SocketAddr>,
    /// `None` runs until interrupted.
    pub duration: Option<Duration>,
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("target", &self.target.as_str())
            .field("credential", &"<redacted>")
            .field("workload", &self.workload)
            .field("metrics_listen", &self.metrics_listen)
            .field("duration", &self.duration)
            .finish()
    }
}

/// Merges client flags over the `[client]` section over built-in defaults.
///
/// # Errors
///
/// Returns an error for an unusable target address or an invalid value in
/// the config file.
pub fn resolve_client(
    args: &ClientArgs,
    file: Option<&ConfigFile>,
) -> AppResult<ClientSettings> {
    let empty = ClientSection::default();
    let section = file.and_then(|file| file.client.as_ref()).unwrap_or(&empty);

    let addr = args
        .addr
        .as_deref()
        .or(section.addr.as_deref())
        .unwrap_or(DEFAULT_TARGET_ADDR);
    let target = parse_target(addr)?;

    let concurrency = match (args.concurrency, section.concurrency) {
        (Some(concurrency), _) => concurrency,
        (None, Some(value)) => PositiveUsize::try_from(value).map_err(|err| {
            ConfigError::InvalidValue {
                field: "client.concurrency",
                source: err,
            }
        })?,
        (None, None) => PositiveUsize::try_from(DEFAULT_CONCURRENCY)?,
    };

    let wait = match args.wait {
        Some(wait) => wait,
        None => file_duration(section.wait.as_ref(), "client.wait")?.unwrap_or(DEFAULT_WAIT),
    };
    let workload = WorkloadConfig::new(concurrency, wait)?;

    let metrics_listen = if args.no_metrics {
        None
    } else {
        match args.metrics_listen {
            Some(addr) => Some(addr),
            None => Some(
                file_socket_addr(section.metrics_listen.as_deref(), "client.metrics_listen")?
                    .unwrap_or(DEFAULT_METRICS_LISTEN),
            ),
        }
    };

    let duration = match args.duration {
        Some(duration) => Some(duration),
        None => file_duration(section.duration.as_ref(), "client.duration")?,
    };

    let credential = args
        .auth
        .as_ref()
        .map(|auth| auth.expose().to_owned())
        .unwrap_or_default();

    Ok(ClientSettings {
        target,
        credential,
        workload,
        metrics_listen,
        duration,
    })
}

/// Merges server flags over the `[server]` section over built-in defaults.
///
/// # Errors
///
/// Returns an error for an invalid value in the config file.
pub fn resolve_server(args: &ServerArgs, file: Option<&ConfigFile>) -> AppResult<ServerConfig> {
    let empty = ServerSection::default();
    let section = file.and_then(|file| file.server.as_ref()).unwrap_or(&empty);

    let listen = match args.listen {
        Some(listen) => listen,
        None => file_socket_addr(section.listen.as_deref(), "server.listen")?
            .unwrap_or(DEFAULT_SERVER_LISTEN),
    };
    let ping_latency = match args.ping_latency {
        Some(latency) => latency,
        None => file_duration(section.ping_latency.as_ref(), "server.ping_latency")?
            .unwrap_or(DEFAULT_PING_LATENCY),
    };

    Ok(ServerConfig::new(listen, ping_latency))
}

/// Parses the target base address. Only `http` and `https` with a host are
/// accepted.
pub(crate) fn parse_target(addr: &str) -> Result<Url, ConfigError> {
    let trimmed = addr.trim();
    let url = Url::parse(trimmed).map_err(|err| ConfigError::InvalidTargetAddress {
        url: trimmed.to_owned(),
        source: err,
    })?;
    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ConfigError::UnsupportedScheme {
                scheme: scheme.to_owned(),
            });
        }
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::InvalidTargetAddress {
            url: trimmed.to_owned(),
            source: url::ParseError::EmptyHost,
        });
    }
    Ok(url)
}

fn file_duration(
    value: Option<&DurationValue>,
    field: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    value
        .map(|value| {
            value
                .to_duration()
                .map_err(|err| ConfigError::InvalidValue { field, source: err })
        })
        .transpose()
}

fn file_socket_addr(
    value: Option<&str>,
    field: &'static str,
) -> Result<Option<SocketAddr>, ConfigError> {
    value
        .map(|value| {
            value
                .trim()
                .parse::<SocketAddr>()
                .map_err(|err| ConfigError::InvalidValue {
                    field,
                    source: ValidationError::InvalidSocketAddr {
                        value: value.to_owned(),
                        source: err,
                    },
                })
        })
        .transpose()
}

use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::time::Duration;

use super::defaults::AUTH_ENV_VAR;
use super::parsers::{parse_duration_arg, parse_positive_usize, parse_socket_addr};
use super::types::{Credential, PositiveUsize};

#[derive(Debug, Parser, Clone)]
#[clap(
    name = "loadtest",
    version,
    about = "Open-loop HTTP load generator with bounded concurrency, plus a ping/echo target service to aim it at."
)]
pub struct LoadtestArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging (LOADTEST_LOG/RUST_LOG take precedence)
    #[arg(long = "verbose", short = 'v', global = true)]
    pub verbose: bool,

    /// Path to a .toml or .json config file
    #[arg(long = "config", global = true)]
    pub config: Option<String>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Serve /http/ping and the /ws echo endpoint
    Server(ServerArgs),
    /// Send requests to a target at a fixed cadence
    Client(ClientArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ServerArgs {
    /// Listen address [default: 0.0.0.0:8080]
    #[arg(long = "listen", short = 'l', value_parser = parse_socket_addr)]
    pub listen: Option<SocketAddr>,

    /// Artificial latency before answering /http/ping (e.g. 500us, 1.5ms, 1m30s; bare number = seconds) [default: 10ms]
    #[arg(long = "ping-latency", value_parser = parse_duration_arg)]
    pub ping_latency: Option<Duration>,
}

#[derive(Debug, Args, Clone)]
pub struct ClientArgs {
    /// Address of the remote server [default: http://localhost:8080]
    #[arg(long = "addr", short = 'a')]
    pub addr: Option<String>,

    /// Maximum number of concurrent in-flight requests [default: 100]
    #[arg(long = "concurrency", short = 'c', value_parser = parse_positive_usize)]
    pub concurrency: Option<PositiveUsize>,

    /// Time to wait between scheduling more requests (e.g. 500us, 1.5ms, 1m30s; bare number = seconds) [default: 1ms]
    #[arg(long = "wait", short = 'w', value_parser = parse_duration_arg)]
    pub wait: Option<Duration>,

    /// Listen address for the Prometheus /metrics endpoint [default: 0.0.0.0:9090]
    #[arg(long = "metrics-listen", value_parser = parse_socket_addr)]
    pub metrics_listen: Option<SocketAddr>,

    /// Do not serve the /metrics endpoint
    #[arg(long = "no-metrics")]
    pub no_metrics: bool,

    /// Stop after this long instead of running until interrupted
    #[arg(long = "duration", short = 'd', value_parser = parse_duration_arg)]
    pub duration: Option<Duration>,

    /// Value sent verbatim as the Authorization header
    #[arg(long = "auth", env = AUTH_ENV_VAR, hide_env_values = true)]
    pub auth: Option<Credential>,
}

//! CLI argument types and parsing helpers.
mod cli;
mod defaults;
pub(crate) mod parsers;
mod types;


pub use cli::{ClientArgs, Command, LoadtestArgs, ServerArgs};
pub use types::{Credential, PositiveUsize};

pub use defaults::AUTH_ENV_VAR;
pub(crate) use defaults::{
    DEFAULT_CONCURRENCY, DEFAULT_METRICS_LISTEN, DEFAULT_PING_LATENCY,
    DEFAULT_SERVER_LISTEN, DEFAULT_TARGET_ADDR, DEFAULT_USER_AGENT, DEFAULT_WAIT,
};

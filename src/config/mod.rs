//! Configuration file loading and merging with command-line flags.
mod loader;
mod resolve;
pub mod types;


pub use loader::load_config;
pub use resolve::{ClientSettings, resolve_client, resolve_server};

#[cfg(test)]
pub(crate) use loader::load_config_file;
#[cfg(test)]
pub(crate) use resolve::parse_target;

mod app;
mod config;
mod server;
mod transport;
mod validation;

#[cfg(test)]
mod test_support;

pub use app::{AppError, AppResult};
pub use config::ConfigError;
pub use server::ServerError;
pub use transport::TransportError;
pub use validation::ValidationError;

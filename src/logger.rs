use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Environment variable consulted before `RUST_LOG` for the log filter.
const LOG_ENV_VAR: &str = "LOADTEST_LOG";

pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = std::env::var(LOG_ENV_VAR)
        .or_else(|_missing| std::env::var("RUST_LOG"))
        .map_or_else(
            |_missing| EnvFilter::new(default_level),
            |value| EnvFilter::try_new(value).unwrap_or_else(|_invalid| EnvFilter::new(default_level)),
        );

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set global default subscriber: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(false);
        init_logging(true);
    }
}

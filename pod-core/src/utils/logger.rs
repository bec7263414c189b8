use tracing_subscriber::{fmt, prelude::*, util::TryInitError, EnvFilter};

/// Initialize tracing logger
///
/// `RUST_LOG` overrides `log_level`. Returns an error instead of panicking
/// when a global subscriber is already installed.
pub fn init_logger(log_level: &str, json_logs: bool) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
    }
}

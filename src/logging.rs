use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Checked before `RUST_LOG`.
pub const LOG_ENV: &str = "SSH_MANAGER_LOG";

/// Logs go to stderr and default to `warn` so they stay out of the menu.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .with(filter)
        .init();
}

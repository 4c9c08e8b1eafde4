use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// The filter used when `RUST_LOG` isn't set.
const DEFAULT_FILTER: &str = "info";

/// Installs a stderr subscriber filtered by `RUST_LOG`. Command output goes to
/// stdout, so logs never mix with it.
pub fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init();
}

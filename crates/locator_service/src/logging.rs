use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_DIRECTIVES: [&str; 3] = [
    "locator_server=info",
    "locator_service=info",
    "locator_core=info",
];

pub fn default_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_LOG_DIRECTIVES.join(","))
}

/// `RUST_LOG` when it is set and valid, the crate-level defaults otherwise.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter())
}

/// Install the process-wide fmt subscriber. Fails if one is already installed.
pub fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to install tracing subscriber: {error}"))
}

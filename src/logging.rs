use tracing_subscriber::EnvFilter;

/// Overrides the configured level with a full filter directive, e.g. `forum_state=debug`.
pub const LOG_ENV: &str = "FORUM_STATE_LOG";

pub fn init(level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // A second install (tests, embedding applications) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

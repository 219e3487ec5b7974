/// JSON structured logging setup.
///
/// One JSON object per line on stdout, driven by the configured
/// `logLevel`. Matches the `tracing` + `tracing-subscriber` stack used
/// elsewhere in the pipeline's sibling bots.
use tracing_subscriber::EnvFilter;

pub fn init(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "URLMIGRATE_LOG";
const DEFAULT_FILTER: &str = "urlmigrate=info";

/// Install the JSON subscriber used by the CLI.
///
/// Output goes to stderr so that stdout stays free for reports. Calling this
/// more than once is harmless; later calls leave the first subscriber in place.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .try_init();
}

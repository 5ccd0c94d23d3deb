use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a stderr `fmt` subscriber filtered by `RUST_LOG`.
///
/// Panics if a global subscriber is already set; use [`try_init`] where that
/// can happen.
pub fn init() {
    fmt().with_env_filter(env_filter()).with_writer(std::io::stderr).init();
}

/// Like [`init`], but routes output through the test harness and returns an
/// error instead of panicking when a subscriber is already installed.
pub fn try_init() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    fmt()
        .with_env_filter(env_filter())
        .with_test_writer()
        .try_init()
}

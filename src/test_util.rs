//! Shared test plumbing.

/// Initializes tracing output for a test; safe to call from every test.
///
/// Verbosity follows `RUST_LOG`; with nothing set, only errors surface.
pub(crate) fn init_test_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

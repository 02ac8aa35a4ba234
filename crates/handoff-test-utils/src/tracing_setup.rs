//! Tracing initialisation helpers for tests.
//!
//! Call [`init_test_tracing`] at the top of any test that wants daemon log
//! lines in the harness output. The subscriber is installed at most once per
//! process, so it is safe to call from every test function.

use handoff_core::logging::StampedFormat;
use tracing_subscriber::EnvFilter;

/// Install a global subscriber that writes daemon-style lines to the
/// test-harness writer and respects `RUST_LOG`.
///
/// Safe to call multiple times - subsequent calls are silently ignored.
///
/// # Example
///
/// ```ignore
/// #[tokio::test]
/// async fn my_test() {
///     handoff_test_utils::tracing_setup::init_test_tracing();
///     tracing::info!("visible when RUST_LOG=info");
/// }
/// ```
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .event_format(StampedFormat)
        .with_test_writer()
        .try_init();
}

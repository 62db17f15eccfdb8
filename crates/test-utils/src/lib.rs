pub mod builders;
pub mod recording_hook;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Defaults to `info` with `debug` for the dispatcher itself; override with
/// e.g. `RUST_LOG=trace cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,taskdispatch=debug"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    with_timeout_of(Duration::from_secs(5), f).await
}

pub async fn with_timeout_of<F, T>(limit: Duration, f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, f)
        .await
        .unwrap_or_else(|_| panic!("Test timed out after {limit:?}"))
}

//! Common test utilities for tests that need a live MySQL server
//!
//! Settings come from `FIXTURE_*` environment variables on top of the
//! defaults, e.g.
//!
//! ```bash
//! FIXTURE_DB_ADDRESS=127.0.0.1:3306 FIXTURE_DB_PASSWORD=secret \
//!     cargo test --test fixture_test -- --ignored
//! ```

use std::time::Duration;

use mysql_fixture::FixtureConfig;
use tokio::sync::{Mutex, MutexGuard};

/// Every test resets the same schema, so they take turns
static DATABASE: Mutex<()> = Mutex::const_new(());

/// Serialize access to the shared test database
pub async fn lock_database() -> MutexGuard<'static, ()> {
    DATABASE.lock().await
}

/// Fixture config from the environment, with scripts from this crate
pub fn config() -> FixtureConfig {
    init_tracing();

    let mut config = FixtureConfig::load().expect("Failed to load fixture config");
    if std::env::var_os("FIXTURE_SCRIPTS").is_none() {
        config.scripts = format!("file://{}/migrations", env!("CARGO_MANIFEST_DIR"));
    }
    config
}

/// Config with short timeouts for failure-path tests
pub fn impatient_config() -> FixtureConfig {
    FixtureConfig {
        db_ping_max_retry: 0,
        db_close_timeout: Duration::from_millis(200),
        ..config()
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mysql_fixture=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

//! Shared test utilities for database operations
//!
//! Unit tests run without a MySQL server, so these helpers point the pool at
//! an address nothing listens on and keep every timeout short.

use std::time::Duration;

use super::Database;
use crate::config::FixtureConfig;

/// Configuration for a database that is never reachable
pub fn offline_config() -> FixtureConfig {
    FixtureConfig {
        db_address: "127.0.0.1:1".to_string(),
        db_ping_max_retry: 2,
        db_ping_retry_interval: Duration::from_millis(10),
        db_connect_timeout: Duration::from_millis(100),
        db_close_timeout: Duration::from_millis(100),
        ..FixtureConfig::default()
    }
}

/// Lazily-connecting pool for an unreachable database
///
/// Must be called from within a tokio runtime.
pub fn offline_database() -> Database {
    Database::open(&offline_config()).expect("offline config is valid")
}

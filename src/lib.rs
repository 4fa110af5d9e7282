//! mysql-fixture - MySQL integration test fixture
//!
//! Brings a test database to a known state: waits for the server to answer
//! pings, reverts and drops the schema, then applies the migration scripts
//! again. Teardown closes the connection pool.
//!
//! ```rust,ignore
//! use mysql_fixture::Fixture;
//!
//! #[tokio::test]
//! async fn test_create_user() {
//!     let fixture = Fixture::from_env().await.unwrap();
//!
//!     sqlx::query("INSERT INTO users (name) VALUES (?)")
//!         .bind("alice")
//!         .execute(fixture.pool())
//!         .await
//!         .unwrap();
//!
//!     fixture.teardown().await.unwrap();
//! }
//! ```

pub mod config;
pub mod db;
pub mod fixture;
pub mod probe;

pub use config::{ConfigError, FixtureConfig};
pub use db::migration::{MigrationError, MigrationOutcome, MigrationRunner};
pub use db::{Database, DbError};
pub use fixture::{Fixture, FixtureError};
pub use probe::{probe, ProbePolicy, Readiness};

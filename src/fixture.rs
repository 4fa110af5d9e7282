//! Test fixture - a freshly migrated database for one test
//!
//! `setup` opens the database, waits for it to answer pings, then runs the
//! migration scripts down, drops what is left and runs them up again.
//! `teardown` closes the database. The fixture owns the connection pool from
//! setup to teardown and releases it exactly once: inside `setup` when a
//! step fails, otherwise in `teardown`.

use sqlx::MySqlPool;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, FixtureConfig};
use crate::db::migration::{MigrationError, MigrationOutcome, MigrationRunner, DRIVER_NAME};
use crate::db::{Database, DbError};
use crate::probe::probe;

/// Fixture errors, one variant per stage
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database not ready after {attempts} attempts: {source}")]
    NotReady {
        attempts: u64,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to load migration scripts: {0}")]
    Migrator(#[source] MigrationError),

    #[error("failed to execute migration down scripts: {0}")]
    Down(#[source] MigrationError),

    #[error("failed to execute migration pre-drop: {0}")]
    Drop(#[source] MigrationError),

    #[error("failed to execute migration up scripts: {0}")]
    Up(#[source] MigrationError),

    #[error("failed to close database: {0}")]
    Teardown(#[source] DbError),
}

/// A migrated database owned for the duration of a test
pub struct Fixture {
    db: Database,
    release: ReleaseGuard,
}

impl Fixture {
    /// Set up a fixture from `FIXTURE_*` environment variables and defaults
    pub async fn from_env() -> Result<Self, FixtureError> {
        let config = FixtureConfig::load()?;
        Self::setup(&config).await
    }

    /// Open the database, wait until it is ready and reset its schema.
    ///
    /// Any failure aborts setup; the database is closed before the error is
    /// returned.
    pub async fn setup(config: &FixtureConfig) -> Result<Self, FixtureError> {
        let db = Database::open(config)?;
        Self::setup_with(db, config).await
    }

    /// Take ownership of `db` and reset it; closes `db` on failure
    async fn setup_with(db: Database, config: &FixtureConfig) -> Result<Self, FixtureError> {
        info!(dsn = db.dsn(), "setting up database fixture");

        if let Err(err) = reset(&db, config).await {
            if let Err(close_err) = db.close().await {
                warn!(error = %close_err, "failed to close database after setup failure");
            }
            return Err(err);
        }

        info!(dsn = db.dsn(), "database fixture ready");
        Ok(Self {
            db,
            release: ReleaseGuard { armed: true },
        })
    }

    /// Get the database handle
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Get the connection pool
    pub fn pool(&self) -> &MySqlPool {
        self.db.pool()
    }

    /// Close the database.
    ///
    /// A close failure is logged and returned; it is the caller's call
    /// whether that fails the test.
    pub async fn teardown(self) -> Result<(), FixtureError> {
        let Self { db, mut release } = self;
        release.armed = false;

        db.close().await.map_err(|err| {
            warn!(error = %err, "failed to close database");
            FixtureError::Teardown(err)
        })
    }
}

/// Warns when a fixture goes away without `teardown`, e.g. a panicking test.
/// The pool itself is released on drop without waiting.
struct ReleaseGuard {
    armed: bool,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!("database fixture dropped without teardown");
        }
    }
}

async fn reset(db: &Database, config: &FixtureConfig) -> Result<(), FixtureError> {
    let policy = config.probe_policy();
    probe(db, &policy)
        .await
        .map_err(|source| FixtureError::NotReady {
            attempts: policy.max_attempts(),
            source,
        })?;

    let runner = MigrationRunner::new(&config.scripts, DRIVER_NAME, db)
        .await
        .map_err(FixtureError::Migrator)?;

    log_step("down", runner.down().await.map_err(FixtureError::Down)?);
    log_step("drop", runner.drop().await.map_err(FixtureError::Drop)?);
    log_step("up", runner.up().await.map_err(FixtureError::Up)?);
    Ok(())
}

fn log_step(step: &str, outcome: MigrationOutcome) {
    match outcome {
        MigrationOutcome::Applied(count) => info!(step, count, "migration step done"),
        MigrationOutcome::NoChange => info!(step, "migration step had nothing to do"),
    }
}

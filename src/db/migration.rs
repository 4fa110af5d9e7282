//! Migration runner
//!
//! Thin wrapper over `sqlx::migrate` exposing the three steps a fixture needs
//! to reset a schema: revert everything, drop whatever is left, apply
//! everything again.

use std::path::PathBuf;

use sqlx::migrate::{Migrate, MigrateError, Migrator};
use sqlx::mysql::MySqlConnection;
use thiserror::Error;
use tracing::{debug, info};

use super::Database;

/// Driver name accepted by [`MigrationRunner::new`]
pub const DRIVER_NAME: &str = "mysql";

const FILE_SCHEME: &str = "file://";

/// Migration errors
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("unsupported migration source '{0}', expected {scheme}<path>", scheme = FILE_SCHEME)]
    UnsupportedSource(String),

    #[error("unsupported database driver '{0}', expected '{driver}'", driver = DRIVER_NAME)]
    UnsupportedDriver(String),

    #[error("migration error: {0}")]
    Migrate(#[from] MigrateError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of a migration step that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The step changed this many migrations or tables
    Applied(usize),
    /// There was nothing to do
    NoChange,
}

impl MigrationOutcome {
    fn from_count(count: usize) -> Self {
        if count == 0 {
            Self::NoChange
        } else {
            Self::Applied(count)
        }
    }
}

/// Resolve a `file://` locator to a directory path
pub fn source_path(locator: &str) -> Result<PathBuf, MigrationError> {
    match locator.strip_prefix(FILE_SCHEME) {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Err(MigrationError::UnsupportedSource(locator.to_string())),
    }
}

/// Runs migration scripts from a directory against a [`Database`]
pub struct MigrationRunner<'a> {
    migrator: Migrator,
    db: &'a Database,
}

impl<'a> MigrationRunner<'a> {
    /// Load migration scripts from `source` for use against `db`
    pub async fn new(
        source: &str,
        driver_name: &str,
        db: &'a Database,
    ) -> Result<Self, MigrationError> {
        if driver_name != DRIVER_NAME {
            return Err(MigrationError::UnsupportedDriver(driver_name.to_string()));
        }

        let source = source_path(source)?;
        let mut migrator = Migrator::new(source.as_path()).await?;
        // History rows without a script are cleared by drop() anyway
        migrator.set_ignore_missing(true);

        debug!(
            source = %source.display(),
            migrations = migrator.iter().count(),
            "loaded migration scripts"
        );

        Ok(Self { migrator, db })
    }

    /// Versions of the forward migrations, in apply order
    #[cfg(test)]
    fn versions(&self) -> Vec<i64> {
        self.migrator
            .iter()
            .filter(|m| !m.migration_type.is_down_migration())
            .map(|m| m.version)
            .collect()
    }

    /// Number of forward migrations not yet applied
    pub async fn pending(&self) -> Result<usize, MigrationError> {
        let applied = self.applied_versions().await?;
        Ok(self
            .migrator
            .iter()
            .filter(|m| !m.migration_type.is_down_migration() && !applied.contains(&m.version))
            .count())
    }

    /// Revert every applied migration
    pub async fn down(&self) -> Result<MigrationOutcome, MigrationError> {
        let applied = self.applied_versions().await?;
        let reverting = self
            .migrator
            .iter()
            .filter(|m| m.migration_type.is_down_migration() && applied.contains(&m.version))
            .count();

        if reverting > 0 {
            self.migrator.undo(self.db.pool(), 0).await?;
            info!("reverted {} migrations", reverting);
        }
        Ok(MigrationOutcome::from_count(reverting))
    }

    /// Drop every table and view in the current schema
    pub async fn drop(&self) -> Result<MigrationOutcome, MigrationError> {
        let mut conn = self.db.pool().acquire().await?;

        let objects: Vec<(String, String)> = sqlx::query_as(
            "SELECT CAST(table_name AS CHAR(64)), CAST(table_type AS CHAR(64)) \
             FROM information_schema.tables WHERE table_schema = DATABASE()",
        )
        .fetch_all(&mut *conn)
        .await?;

        if objects.is_empty() {
            return Ok(MigrationOutcome::NoChange);
        }

        sqlx::query("SET FOREIGN_KEY_CHECKS = 0")
            .execute(&mut *conn)
            .await?;
        let dropped = drop_objects(&mut conn, &objects).await;
        // Restore checks even when a drop failed; the drop error wins
        let restored = sqlx::query("SET FOREIGN_KEY_CHECKS = 1")
            .execute(&mut *conn)
            .await;
        dropped?;
        restored?;

        info!("dropped {} tables", objects.len());
        Ok(MigrationOutcome::Applied(objects.len()))
    }

    /// Apply every pending migration
    pub async fn up(&self) -> Result<MigrationOutcome, MigrationError> {
        let pending = self.pending().await?;
        if pending > 0 {
            self.migrator.run(self.db.pool()).await?;
            info!("applied {} migrations", pending);
        }
        Ok(MigrationOutcome::from_count(pending))
    }

    async fn applied_versions(&self) -> Result<Vec<i64>, MigrationError> {
        let mut conn = self.db.pool().acquire().await?;
        conn.ensure_migrations_table().await?;
        let applied = conn.list_applied_migrations().await?;
        Ok(applied.into_iter().map(|m| m.version).collect())
    }
}

async fn drop_objects(
    conn: &mut MySqlConnection,
    objects: &[(String, String)],
) -> Result<(), sqlx::Error> {
    for (name, kind) in objects {
        let statement = drop_statement(name, kind);
        debug!("{}", statement);
        sqlx::query(&statement).execute(&mut *conn).await?;
    }
    Ok(())
}

fn drop_statement(name: &str, kind: &str) -> String {
    let object = if kind == "VIEW" { "VIEW" } else { "TABLE" };
    format!("DROP {} IF EXISTS {}", object, quote_ident(name))
}

/// Quote a MySQL identifier with backticks
fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

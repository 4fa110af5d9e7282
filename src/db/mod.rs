//! Database module - MySQL connection pool owned by a fixture

pub mod migration;

#[cfg(test)]
pub(crate) mod test_utils;

use std::io;
use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions};
use sqlx::Connection;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, FixtureConfig};
use crate::probe::Readiness;

const POOL_MAX_CONNECTIONS: u32 = 5;

/// Database errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("timed out after {0:?} waiting for borrowed connections to be returned")]
    CloseTimeout(Duration),
}

/// Database handle wrapping a MySQL connection pool
pub struct Database {
    pool: MySqlPool,
    options: MySqlConnectOptions,
    dsn: String,
    connect_timeout: Duration,
    close_timeout: Duration,
}

impl Database {
    /// Open a connection pool for the configured database.
    ///
    /// The pool connects lazily: nothing goes over the network until the
    /// first query or readiness check. Must be called within a tokio runtime.
    pub fn open(config: &FixtureConfig) -> Result<Self, ConfigError> {
        let options = connect_options(config)?;
        let pool = MySqlPoolOptions::new()
            .max_connections(POOL_MAX_CONNECTIONS)
            .acquire_timeout(config.db_connect_timeout)
            .connect_lazy_with(options.clone());

        let db = Self {
            pool,
            options,
            dsn: redacted_dsn(config),
            connect_timeout: config.db_connect_timeout,
            close_timeout: config.db_close_timeout,
        };
        debug!(dsn = %db.dsn, "opened database pool");
        Ok(db)
    }

    /// Get the connection pool
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Connection URL with the password masked, for logs
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    /// Close the pool.
    ///
    /// Waits for connections still checked out elsewhere, up to the
    /// configured close timeout.
    pub async fn close(self) -> Result<(), DbError> {
        let Self {
            pool,
            dsn,
            close_timeout,
            ..
        } = self;

        tokio::time::timeout(close_timeout, pool.close())
            .await
            .map_err(|_| DbError::CloseTimeout(close_timeout))?;

        info!(dsn = %dsn, "database closed");
        Ok(())
    }

    /// Connect, ping and disconnect on a dedicated connection
    async fn ping_once(&self) -> Result<(), sqlx::Error> {
        let mut conn = MySqlConnection::connect_with(&self.options).await?;
        conn.ping().await?;
        conn.close().await
    }
}

impl Readiness for Database {
    type Error = sqlx::Error;

    /// One connection attempt, bounded by the connect timeout.
    ///
    /// Bypasses the pool, which would keep retrying refused connections
    /// until its acquire timeout and then report only that it timed out.
    async fn check_ready(&self) -> Result<(), sqlx::Error> {
        match tokio::time::timeout(self.connect_timeout, self.ping_once()).await {
            Ok(result) => result,
            Err(_) => Err(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no answer from database within {:?}", self.connect_timeout),
            ))),
        }
    }
}

/// Build connect options for the configured database.
///
/// Multi-statement execution and found-rows semantics are negotiated by the
/// driver on every connection, and temporal columns decode into `chrono`
/// types. The session time zone is left at the server default: decode into
/// `chrono::DateTime<Local>` where local time is wanted.
pub fn connect_options(config: &FixtureConfig) -> Result<MySqlConnectOptions, ConfigError> {
    config.validate()?;
    let (host, port) = config.host_port()?;

    Ok(MySqlConnectOptions::new()
        .host(&host)
        .port(port)
        .username(&config.db_user)
        .password(&config.db_password)
        .database(&config.db_name)
        .timezone(None::<String>))
}

fn redacted_dsn(config: &FixtureConfig) -> String {
    format!(
        "mysql://{}:***@{}/{}",
        config.db_user, config.db_address, config.db_name
    )
}

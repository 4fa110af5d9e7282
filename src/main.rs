//! mysql-fixture - reset a MySQL test database
//!
//! Runs the same setup an integration test fixture does (wait for the
//! server, migrate down, drop, migrate up) and then tears down.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use mysql_fixture::{Fixture, FixtureConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// MySQL test database reset tool
#[derive(Parser, Debug)]
#[command(
    name = "mysql-fixture",
    version,
    about = "Reset a MySQL test database to a freshly migrated state"
)]
struct Args {
    /// TOML file with fixture settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// The location of migration scripts
    #[arg(long)]
    scripts: Option<String>,

    /// Database username
    #[arg(long)]
    db_user: Option<String>,

    /// Database password
    #[arg(long)]
    db_password: Option<String>,

    /// Database address (host:port)
    #[arg(long)]
    db_address: Option<String>,

    /// Database name
    #[arg(long)]
    db_name: Option<String>,

    /// Database ping max retry
    #[arg(long)]
    db_ping_max_retry: Option<u32>,

    /// Database ping retry interval (e.g. 1s, 500ms)
    #[arg(long, value_parser = humantime::parse_duration)]
    db_ping_retry_interval: Option<Duration>,

    /// Timeout for a single connection attempt
    #[arg(long, value_parser = humantime::parse_duration)]
    db_connect_timeout: Option<Duration>,

    /// How long teardown waits for borrowed connections
    #[arg(long, value_parser = humantime::parse_duration)]
    db_close_timeout: Option<Duration>,
}

impl Args {
    /// Command-line flags take precedence over every other source
    fn apply(self, config: &mut FixtureConfig) {
        if let Some(v) = self.scripts {
            config.scripts = v;
        }
        if let Some(v) = self.db_user {
            config.db_user = v;
        }
        if let Some(v) = self.db_password {
            config.db_password = v;
        }
        if let Some(v) = self.db_address {
            config.db_address = v;
        }
        if let Some(v) = self.db_name {
            config.db_name = v;
        }
        if let Some(v) = self.db_ping_max_retry {
            config.db_ping_max_retry = v;
        }
        if let Some(v) = self.db_ping_retry_interval {
            config.db_ping_retry_interval = v;
        }
        if let Some(v) = self.db_connect_timeout {
            config.db_connect_timeout = v;
        }
        if let Some(v) = self.db_close_timeout {
            config.db_close_timeout = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mysql_fixture=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let args = Args::parse();

    if let Some(path) = &args.config {
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }
    }

    // Resolve config: defaults < file < env < flags
    let mut config: FixtureConfig = FixtureConfig::figment(args.config.as_deref()).extract()?;
    args.apply(&mut config);
    config.validate()?;

    let fixture = Fixture::setup(&config).await?;
    info!(dsn = fixture.db().dsn(), "database reset");
    fixture.teardown().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from([
            "mysql-fixture",
            "--scripts",
            "file:///srv/migrations",
            "--db-user",
            "ci",
            "--db-address",
            "mysql:3307",
            "--db-ping-max-retry",
            "5",
            "--db-ping-retry-interval",
            "250ms",
        ])
        .unwrap();

        let mut config = FixtureConfig::default();
        args.apply(&mut config);

        assert_eq!(config.scripts, "file:///srv/migrations");
        assert_eq!(config.db_user, "ci");
        assert_eq!(config.db_address, "mysql:3307");
        assert_eq!(config.db_ping_max_retry, 5);
        assert_eq!(config.db_ping_retry_interval, Duration::from_millis(250));
        assert_eq!(config.db_name, "myproject_test");
    }

    #[test]
    fn test_no_flags_keeps_config() {
        let args = Args::try_parse_from(["mysql-fixture"]).unwrap();
        let mut config = FixtureConfig::default();
        args.apply(&mut config);
        assert_eq!(config, FixtureConfig::default());
    }

    #[test]
    fn test_bad_duration_flag() {
        let result = Args::try_parse_from(["mysql-fixture", "--db-ping-retry-interval", "soon"]);
        assert!(result.is_err());
    }
}

//! Fixture configuration
//!
//! Settings are resolved once at startup into a [`FixtureConfig`] and passed
//! by reference from then on. Sources, lowest precedence first: built-in
//! defaults, an optional TOML file, `FIXTURE_*` environment variables.
//! The binary applies its command-line flags on top.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::probe::ProbePolicy;

/// Prefix of the environment variables read by [`FixtureConfig::load`]
pub const ENV_PREFIX: &str = "FIXTURE_";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Figment(#[from] figment::Error),

    #[error("invalid database address '{0}', expected host:port")]
    InvalidAddress(String),

    #[error("missing required setting '{0}'")]
    Missing(&'static str),
}

/// Settings for a database test fixture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    /// Location of migration scripts (`file://<path>`)
    pub scripts: String,
    /// Database username
    pub db_user: String,
    /// Database password
    pub db_password: String,
    /// Database address as `host:port`
    pub db_address: String,
    /// Database name
    pub db_name: String,
    /// Ping retries before giving up on the database
    pub db_ping_max_retry: u32,
    /// Delay between ping attempts
    #[serde(with = "human_duration")]
    pub db_ping_retry_interval: Duration,
    /// Upper bound on a single connection attempt
    #[serde(with = "human_duration")]
    pub db_connect_timeout: Duration,
    /// How long teardown waits for borrowed connections to come back
    #[serde(with = "human_duration")]
    pub db_close_timeout: Duration,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            scripts: "file://migrations".to_string(),
            db_user: "myproject".to_string(),
            db_password: "secret".to_string(),
            db_address: "localhost:3306".to_string(),
            db_name: "myproject_test".to_string(),
            db_ping_max_retry: 60,
            db_ping_retry_interval: Duration::from_secs(1),
            db_connect_timeout: Duration::from_secs(5),
            db_close_timeout: Duration::from_secs(10),
        }
    }
}

impl FixtureConfig {
    /// Layered configuration sources: defaults, optional TOML file, environment
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Resolve configuration from defaults and `FIXTURE_*` environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment(None))
    }

    /// Extract and validate configuration from a figment
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialization alone cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scripts.is_empty() {
            return Err(ConfigError::Missing("scripts"));
        }
        if self.db_user.is_empty() {
            return Err(ConfigError::Missing("db_user"));
        }
        if self.db_name.is_empty() {
            return Err(ConfigError::Missing("db_name"));
        }
        self.host_port()?;
        Ok(())
    }

    /// Split `db_address` into host and port
    pub fn host_port(&self) -> Result<(String, u16), ConfigError> {
        let invalid = || ConfigError::InvalidAddress(self.db_address.clone());

        let (host, port) = self.db_address.rsplit_once(':').ok_or_else(invalid)?;
        // IPv6 literals are written as [::1]:3306
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;

        Ok((host.to_string(), port))
    }

    /// Retry budget for the readiness probe
    pub fn probe_policy(&self) -> ProbePolicy {
        ProbePolicy::new(self.db_ping_max_retry, self.db_ping_retry_interval)
    }
}

/// Durations written as `1s`, `500ms`, `2m 30s`
mod human_duration {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = FixtureConfig::default();
        assert_eq!(config.scripts, "file://migrations");
        assert_eq!(config.db_user, "myproject");
        assert_eq!(config.db_password, "secret");
        assert_eq!(config.db_address, "localhost:3306");
        assert_eq!(config.db_name, "myproject_test");
        assert_eq!(config.db_ping_max_retry, 60);
        assert_eq!(config.db_ping_retry_interval, Duration::from_secs(1));
        config.validate().unwrap();
    }

    #[test]
    fn test_load_without_overrides_matches_defaults() {
        Jail::expect_with(|_| {
            let config = FixtureConfig::load().unwrap();
            assert_eq!(config, FixtureConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides() {
        Jail::expect_with(|jail| {
            jail.set_env("FIXTURE_DB_USER", "ci");
            jail.set_env("FIXTURE_DB_ADDRESS", "mysql:3307");
            jail.set_env("FIXTURE_DB_PING_MAX_RETRY", "5");
            jail.set_env("FIXTURE_DB_PING_RETRY_INTERVAL", "250ms");

            let config = FixtureConfig::load().unwrap();
            assert_eq!(config.db_user, "ci");
            assert_eq!(config.db_address, "mysql:3307");
            assert_eq!(config.db_ping_max_retry, 5);
            assert_eq!(config.db_ping_retry_interval, Duration::from_millis(250));
            // Untouched settings keep their defaults
            assert_eq!(config.db_name, "myproject_test");
            Ok(())
        });
    }

    #[test]
    fn test_env_takes_precedence_over_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "fixture.toml",
                r#"
                db_name = "from_file"
                db_password = "file-secret"
                db_close_timeout = "2m"
                "#,
            )?;
            jail.set_env("FIXTURE_DB_NAME", "from_env");

            let figment = FixtureConfig::figment(Some(Path::new("fixture.toml")));
            let config = FixtureConfig::from_figment(&figment).unwrap();
            assert_eq!(config.db_name, "from_env");
            assert_eq!(config.db_password, "file-secret");
            assert_eq!(config.db_close_timeout, Duration::from_secs(120));
            Ok(())
        });
    }

    #[test]
    fn test_bad_duration_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("FIXTURE_DB_PING_RETRY_INTERVAL", "soon");
            assert!(matches!(
                FixtureConfig::load(),
                Err(ConfigError::Figment(_))
            ));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_address_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("FIXTURE_DB_ADDRESS", "localhost");
            let err = FixtureConfig::load().unwrap_err();
            assert!(err.to_string().contains("expected host:port"));
            Ok(())
        });
    }

    #[test]
    fn test_host_port() {
        let mut config = FixtureConfig::default();
        assert_eq!(config.host_port().unwrap(), ("localhost".to_string(), 3306));

        config.db_address = "[::1]:3307".to_string();
        assert_eq!(config.host_port().unwrap(), ("::1".to_string(), 3307));

        for bad in ["localhost", ":3306", "localhost:", "localhost:99999", "host:port"] {
            config.db_address = bad.to_string();
            assert!(
                matches!(config.host_port(), Err(ConfigError::InvalidAddress(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_missing_values() {
        let config = FixtureConfig {
            db_name: String::new(),
            ..FixtureConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Missing("db_name"))));
    }

    #[test]
    fn test_probe_policy() {
        let config = FixtureConfig {
            db_ping_max_retry: 3,
            db_ping_retry_interval: Duration::from_millis(10),
            ..FixtureConfig::default()
        };
        let policy = config.probe_policy();
        assert_eq!(policy.max_retry, 3);
        assert_eq!(policy.retry_interval, Duration::from_millis(10));
        assert_eq!(policy.max_attempts(), 4);
    }
}

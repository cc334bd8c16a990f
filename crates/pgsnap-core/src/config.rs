//! Connection and collection options.
//!
//! The assembler treats these as opaque parameters: it reads the timeout and
//! the database list, nothing else. Connection fields are only consumed by
//! [`PgSession`](crate::collector::PgSession).

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default collection timeout in seconds.
pub const DEFAULT_TIMEOUT_SEC: u64 = 5;

/// TLS negotiation mode, mirroring libpq's `sslmode`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    #[default]
    Disable,
    Prefer,
    Require,
    /// Require TLS and verify the server certificate and host name.
    VerifyFull,
}

impl SslMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyFull => "verify-full",
        }
    }

    /// Value passed to the driver, which only negotiates
    /// disable/prefer/require. Certificate checks for `verify-full` happen
    /// in the TLS connector.
    pub fn driver_mode(self) -> &'static str {
        match self {
            SslMode::VerifyFull => "require",
            other => other.as_str(),
        }
    }

    pub fn uses_tls(self) -> bool {
        self != SslMode::Disable
    }
}

impl std::fmt::Display for SslMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SslMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disable" => Ok(SslMode::Disable),
            "prefer" | "allow" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(ConfigError::InvalidValue {
                name: "sslmode".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Recognized collection options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Coarse deadline for the whole collection, in seconds.
    pub timeout_sec: u64,
    /// Databases to run per-database probes against. Empty means the main database.
    pub databases: Vec<String>,
    pub ssl_mode: SslMode,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: None,
            timeout_sec: DEFAULT_TIMEOUT_SEC,
            databases: Vec::new(),
            ssl_mode: SslMode::Disable,
        }
    }
}

impl CollectConfig {
    /// Builds a config from the standard libpq environment variables:
    /// - PGHOST (default: localhost)
    /// - PGPORT (default: 5432)
    /// - PGUSER (default: $USER)
    /// - PGPASSWORD (default: none)
    /// - PGDATABASE (default: none, the main database is the user name)
    /// - PGSSLMODE (default: disable)
    /// - PGCONNECT_TIMEOUT (default: 5)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let user = lookup("PGUSER")
            .or_else(|| lookup("USER"))
            .ok_or_else(|| ConfigError::EnvNotSet("PGUSER or USER".to_string()))?;

        let mut config = Self {
            user,
            ..Self::default()
        };

        if let Some(host) = lookup("PGHOST") {
            config.host = host;
        }
        if let Some(port) = lookup("PGPORT") {
            config.port = parse_var("PGPORT", &port)?;
        }
        config.password = lookup("PGPASSWORD").filter(|p| !p.is_empty());
        if let Some(db) = lookup("PGDATABASE") {
            config.databases = vec![db];
        }
        if let Some(mode) = lookup("PGSSLMODE") {
            config.ssl_mode = mode.parse()?;
        }
        if let Some(timeout) = lookup("PGCONNECT_TIMEOUT") {
            config.timeout_sec = parse_var("PGCONNECT_TIMEOUT", &timeout)?;
        }

        Ok(config)
    }

    /// Checks the fields the collector relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.user.trim().is_empty() {
            return Err(ConfigError::EmptyUser);
        }
        if self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.timeout_sec == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }

    /// Database for the main session: the first requested database, else the user name.
    pub fn main_database(&self) -> &str {
        self.databases
            .first()
            .map(String::as_str)
            .unwrap_or(self.user.as_str())
    }

    /// Requested databases, deduplicated, in first-seen order.
    pub fn target_databases(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.databases
            .iter()
            .map(String::as_str)
            .filter(|db| !db.is_empty() && seen.insert(*db))
            .collect()
    }

    /// Builds a libpq key=value connection string for `dbname`.
    pub fn connection_string(&self, dbname: &str) -> String {
        let mut parts = vec![
            format!("host={}", quote_value(&self.host)),
            format!("port={}", self.port),
            format!("user={}", quote_value(&self.user)),
        ];
        if let Some(password) = &self.password {
            parts.push(format!("password={}", quote_value(password)));
        }
        parts.push(format!("dbname={}", quote_value(dbname)));
        parts.push(format!("connect_timeout={}", self.timeout_sec));
        parts.push(format!("sslmode={}", self.ssl_mode.driver_mode()));
        parts.push("application_name=pgsnap".to_string());
        parts.join(" ")
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}

/// Quotes a libpq connection-string value when it contains spaces, quotes or backslashes.
fn quote_value(value: &str) -> String {
    if !value.is_empty() && !value.contains([' ', '\'', '\\']) {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn from_env_uses_defaults() {
        let config = CollectConfig::from_lookup(lookup(&[("USER", "app")])).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.user, "app");
        assert_eq!(config.timeout_sec, DEFAULT_TIMEOUT_SEC);
        assert!(config.databases.is_empty());
        assert_eq!(config.main_database(), "app");
    }

    #[test]
    fn from_env_reads_libpq_variables() {
        let config = CollectConfig::from_lookup(lookup(&[
            ("PGUSER", "monitor"),
            ("USER", "ignored"),
            ("PGHOST", "db.internal"),
            ("PGPORT", "6432"),
            ("PGPASSWORD", "secret"),
            ("PGDATABASE", "orders"),
            ("PGSSLMODE", "require"),
            ("PGCONNECT_TIMEOUT", "12"),
        ]))
        .unwrap();
        assert_eq!(config.user, "monitor");
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 6432);
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.databases, vec!["orders".to_string()]);
        assert_eq!(config.ssl_mode, SslMode::Require);
        assert_eq!(config.timeout_sec, 12);
    }

    #[test]
    fn from_env_requires_user() {
        let err = CollectConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::EnvNotSet("PGUSER or USER".to_string()));
    }

    #[test]
    fn from_env_rejects_bad_port() {
        let err = CollectConfig::from_lookup(lookup(&[("USER", "app"), ("PGPORT", "abc")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref name, .. } if name == "PGPORT"));
    }

    #[test]
    fn validate_rejects_zero_timeout_and_port() {
        let mut config = CollectConfig::default();
        assert!(config.validate().is_ok());
        config.timeout_sec = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));
        config.timeout_sec = 1;
        config.port = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroPort));
        config.port = 5432;
        config.user = " ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::EmptyUser));
    }

    #[test]
    fn connection_string_quotes_values() {
        let config = CollectConfig {
            password: Some("it's secret".to_string()),
            ..CollectConfig::default()
        };
        assert_eq!(
            config.connection_string("my db"),
            "host=localhost port=5432 user=postgres password='it\\'s secret' \
             dbname='my db' connect_timeout=5 sslmode=disable application_name=pgsnap"
        );
    }

    #[test]
    fn target_databases_are_deduplicated() {
        let config = CollectConfig {
            databases: vec![
                "a".to_string(),
                "b".to_string(),
                "a".to_string(),
                String::new(),
            ],
            ..CollectConfig::default()
        };
        assert_eq!(config.target_databases(), vec!["a", "b"]);
    }

    #[test]
    fn ssl_mode_parses_libpq_names() {
        assert_eq!("verify-full".parse::<SslMode>().unwrap(), SslMode::VerifyFull);
        assert_eq!("allow".parse::<SslMode>().unwrap(), SslMode::Prefer);
        assert!("bogus".parse::<SslMode>().is_err());
    }

    #[test]
    fn verify_full_is_sent_to_driver_as_require() {
        let config = CollectConfig {
            ssl_mode: SslMode::VerifyFull,
            ..CollectConfig::default()
        };
        assert!(config.connection_string("postgres").contains("sslmode=require"));
        assert!(config.ssl_mode.uses_tls());
        assert!(!SslMode::Disable.uses_tls());
    }
}

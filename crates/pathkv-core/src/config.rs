//! Store configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::{TemporalCodec, WallClock};
use crate::domain::StoreError;

pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_SSL_MODE: &str = "disable";
pub const ENV_PREFIX: &str = "PATHKV_";

/// What a multi-row read (or the listener) does with an element it cannot decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// Log it, record it in the batch, keep going.
    #[default]
    Skip,
    /// Fail the whole call with the first decode error.
    Fail,
}

impl FromStr for DecodePolicy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(DecodePolicy::Skip),
            "fail" => Ok(DecodePolicy::Fail),
            other => Err(StoreError::Configuration(format!(
                "unknown decode policy {other:?} (expected skip or fail)"
            ))),
        }
    }
}

/// Connection parameters and client behaviour.
///
/// `name` and `host` are required; everything else has a default.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database name.
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    /// libpq-style `sslmode` (`disable`, `prefer`, `require`, ...).
    pub ssl_mode: String,
    /// Zone whose wall-clock digits the engine stores in its naive columns.
    pub wall_clock: WallClock,
    pub row_policy: DecodePolicy,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: String::new(),
            port: DEFAULT_PORT,
            user: String::new(),
            password: None,
            ssl_mode: DEFAULT_SSL_MODE.to_string(),
            wall_clock: WallClock::default(),
            row_policy: DecodePolicy::default(),
            max_connections: 10,
            acquire_timeout_secs: 30,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ssl_mode", &self.ssl_mode)
            .field("wall_clock", &self.wall_clock)
            .field("row_policy", &self.row_policy)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

impl StoreConfig {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            ..Self::default()
        }
    }

    /// Reads `PATHKV_DB_*`, `PATHKV_WALL_CLOCK` and `PATHKV_ROW_POLICY`.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`StoreConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            lookup(&format!("{ENV_PREFIX}{suffix}")).filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(name) = var("DB_NAME") {
            config.name = name;
        }
        if let Some(host) = var("DB_HOST") {
            config.host = host;
        }
        if let Some(port) = var("DB_PORT") {
            config.port = port
                .parse()
                .map_err(|_| StoreError::Configuration(format!("invalid port {port:?}")))?;
        }
        if let Some(user) = var("DB_USER") {
            config.user = user;
        }
        config.password = var("DB_PASSWORD");
        if let Some(ssl_mode) = var("DB_SSLMODE") {
            config.ssl_mode = ssl_mode;
        }
        if let Some(zone) = var("WALL_CLOCK") {
            config.wall_clock = zone.parse()?;
        }
        if let Some(policy) = var("ROW_POLICY") {
            config.row_policy = policy.parse()?;
        }
        Ok(config)
    }

    /// Fails when a parameter required to reach the engine is missing.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.name.trim().is_empty() {
            return Err(StoreError::Configuration("database name is required".into()));
        }
        if self.host.trim().is_empty() {
            return Err(StoreError::Configuration("database host is required".into()));
        }
        if self.max_connections == 0 {
            return Err(StoreError::Configuration(
                "max_connections must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn codec(&self) -> TemporalCodec {
        TemporalCodec::new(self.wall_clock)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::domain::ErrorKind;
    use rstest::rstest;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_match_a_local_postgres() {
        let config = StoreConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.ssl_mode, "disable");
        assert_eq!(config.wall_clock, WallClock::Local);
        assert_eq!(config.row_policy, DecodePolicy::Skip);
    }

    #[test]
    fn reads_prefixed_variables() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("PATHKV_DB_NAME", "pathkv"),
            ("PATHKV_DB_HOST", "10.0.1.249"),
            ("PATHKV_DB_PORT", "6543"),
            ("PATHKV_DB_USER", "svc"),
            ("PATHKV_DB_PASSWORD", "secret"),
            ("PATHKV_DB_SSLMODE", "require"),
            ("PATHKV_WALL_CLOCK", "utc"),
            ("PATHKV_ROW_POLICY", "fail"),
        ]))
        .unwrap();

        assert_eq!(config.name, "pathkv");
        assert_eq!(config.host, "10.0.1.249");
        assert_eq!(config.port, 6543);
        assert_eq!(config.user, "svc");
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.ssl_mode, "require");
        assert_eq!(config.wall_clock, WallClock::Utc);
        assert_eq!(config.row_policy, DecodePolicy::Fail);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_variables_fall_back_to_defaults() {
        let config =
            StoreConfig::from_lookup(lookup(&[("PATHKV_DB_PORT", ""), ("PATHKV_DB_PASSWORD", "")]))
                .unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.password, None);
    }

    #[test]
    fn bad_port_is_a_configuration_error() {
        let err = StoreConfig::from_lookup(lookup(&[("PATHKV_DB_PORT", "http")])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[rstest]
    #[case::no_name("", "localhost")]
    #[case::no_host("pathkv", "")]
    #[case::blank_host("pathkv", "  ")]
    fn validate_requires_name_and_host(#[case] name: &str, #[case] host: &str) {
        let err = StoreConfig::new(name, host).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn debug_redacts_password() {
        let mut config = StoreConfig::new("db", "host");
        config.password = Some("hunter2".into());
        let printed = format!("{config:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"name":"db","host":"h","wall_clock":"+09:00"}"#).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.wall_clock.to_string(), "+09:00");
    }
}

use ftdp_common::FtdpError;
use serde::Serialize;

use crate::config::{env_flag, env_opt, env_or, env_parse};
use crate::error::{IngestError, Result};

// ============================================================================
// ClickHouse Connection Defaults
// ============================================================================

/// Default ClickHouse host, reachable from inside the worker container.
pub const DEFAULT_HOST: &str = "host.docker.internal";

/// Default ClickHouse HTTP port.
pub const DEFAULT_PORT: u16 = 8123;

pub const DEFAULT_USER: &str = "dbt_user";

pub const DEFAULT_PASSWORD: &str = "dbt_password";

pub const DEFAULT_DATABASE: &str = "default";

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default per-statement timeout in seconds. Bulk loads of the larger
/// order tables routinely take minutes.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 3600;

/// Connection parameters for the analytical store
#[derive(Clone, Serialize)]
pub struct ClickHouseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip)]
    pub password: String,
    pub database: String,
    /// Use https instead of http
    pub secure: bool,
    pub connect_timeout_secs: u64,
    pub query_timeout_secs: u64,
    /// Session settings sent with every statement
    pub settings: Vec<(String, String)>,
}

impl std::fmt::Debug for ClickHouseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .field("secure", &self.secure)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: DEFAULT_USER.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            secure: false,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            settings: Vec::new(),
        }
    }
}

impl ClickHouseConfig {
    /// Load from `CLICKHOUSE_*` environment variables
    pub fn from_env() -> Result<Self> {
        let settings = match env_opt("CLICKHOUSE_SETTINGS") {
            Some(raw) => parse_settings(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            host: env_or("CLICKHOUSE_HOST", DEFAULT_HOST),
            port: env_parse("CLICKHOUSE_PORT")?.unwrap_or(DEFAULT_PORT),
            username: env_or("CLICKHOUSE_USER", DEFAULT_USER),
            password: env_or("CLICKHOUSE_PASSWORD", DEFAULT_PASSWORD),
            database: env_or("CLICKHOUSE_DATABASE", DEFAULT_DATABASE),
            secure: env_flag("CLICKHOUSE_SECURE", false)?,
            connect_timeout_secs: env_parse("CLICKHOUSE_CONNECT_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            query_timeout_secs: env_parse("CLICKHOUSE_QUERY_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS),
            settings,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(FtdpError::Config("CLICKHOUSE_HOST cannot be empty".to_string()).into());
        }

        if self.port == 0 {
            return Err(FtdpError::Config("CLICKHOUSE_PORT must be greater than 0".to_string()).into());
        }

        if self.query_timeout_secs == 0 {
            return Err(FtdpError::Config(
                "CLICKHOUSE_QUERY_TIMEOUT_SECS must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }

    /// Base URL of the HTTP interface
    pub fn endpoint(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Parse `key=value,key=value`
fn parse_settings(raw: &str) -> Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| {
                    IngestError::from(FtdpError::invalid_env(
                        "CLICKHOUSE_SETTINGS",
                        raw,
                        format!("'{}' is not key=value", pair),
                    ))
                })
        })
        .collect()
}

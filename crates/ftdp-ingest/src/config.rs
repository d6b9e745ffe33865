//! Pipeline configuration
//!
//! All settings come from the process environment (plus an optional `.env`
//! file) and are read once per invocation into explicit structs. Anything
//! that is set but unparseable is an error rather than a silent default.

use ftdp_common::FtdpError;
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;

use crate::clickhouse::config::ClickHouseConfig;
use crate::error::Result;
use crate::storage::config::StorageConfig;

// ============================================================================
// Transformation Stage Defaults
// ============================================================================

/// Default dbt executable inside the deployment's virtualenv.
pub const DEFAULT_DBT_EXECUTABLE: &str = "/usr/local/airflow/dbt_venv/bin/dbt";

/// Default dbt project directory.
pub const DEFAULT_DBT_PROJECT_DIR: &str = "/usr/local/airflow/analytics";

/// Default directory holding `profiles.yml`.
pub const DEFAULT_DBT_PROFILES_DIR: &str = "/usr/local/airflow/.dbt";

/// Default dbt profile name.
pub const DEFAULT_DBT_PROFILE: &str = "analytics";

/// Default dbt target.
pub const DEFAULT_DBT_TARGET: &str = "dev";

/// Read a variable, treating unset and empty the same
pub(crate) fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_or(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

/// Parse a variable if present, failing on malformed values
pub(crate) fn env_parse<T>(name: &str) -> std::result::Result<Option<T>, FtdpError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| FtdpError::invalid_env(name, raw, e)),
        None => Ok(None),
    }
}

/// Booleans accept `true`/`false` in any case, plus `1`/`0`
pub(crate) fn env_flag(name: &str, default: bool) -> std::result::Result<bool, FtdpError> {
    match env_opt(name) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(FtdpError::invalid_env(name, raw, "expected true or false")),
        },
        None => Ok(default),
    }
}

/// dbt invocation for the transformation stage
#[derive(Debug, Clone, Serialize)]
pub struct DbtConfig {
    pub enabled: bool,
    pub executable: PathBuf,
    pub project_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub profile: String,
    pub target: String,
}

impl Default for DbtConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            executable: PathBuf::from(DEFAULT_DBT_EXECUTABLE),
            project_dir: PathBuf::from(DEFAULT_DBT_PROJECT_DIR),
            profiles_dir: PathBuf::from(DEFAULT_DBT_PROFILES_DIR),
            profile: DEFAULT_DBT_PROFILE.to_string(),
            target: DEFAULT_DBT_TARGET.to_string(),
        }
    }
}

impl DbtConfig {
    /// Load from `DBT_*` environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            enabled: env_flag("DBT_ENABLED", true)?,
            executable: PathBuf::from(env_or("DBT_EXECUTABLE_PATH", DEFAULT_DBT_EXECUTABLE)),
            project_dir: PathBuf::from(env_or("DBT_PROJECT_DIR", DEFAULT_DBT_PROJECT_DIR)),
            profiles_dir: PathBuf::from(env_or("DBT_PROFILES_DIR", DEFAULT_DBT_PROFILES_DIR)),
            profile: env_or("DBT_PROFILE", DEFAULT_DBT_PROFILE),
            target: env_or("DBT_TARGET", DEFAULT_DBT_TARGET),
        })
    }
}

/// Pipeline runner knobs
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunnerConfig {
    /// Upper bound on concurrently running ingestion tasks; `None` runs
    /// every table at once
    pub max_parallel_tasks: Option<usize>,
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            max_parallel_tasks: env_parse("FTDP_MAX_PARALLEL_TASKS")?,
        })
    }
}

/// Everything one invocation needs
#[derive(Debug, Clone)]
pub struct Settings {
    pub clickhouse: ClickHouseConfig,
    pub storage: StorageConfig,
    pub dbt: DbtConfig,
    pub runner: RunnerConfig,
}

impl Settings {
    /// Load all settings from the environment and validate them
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = Self {
            clickhouse: ClickHouseConfig::from_env()?,
            storage: StorageConfig::from_env()?,
            dbt: DbtConfig::from_env()?,
            runner: RunnerConfig::from_env()?,
        };

        settings.validate()?;

        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.clickhouse.validate()?;
        self.storage.validate()?;

        if self.runner.max_parallel_tasks == Some(0) {
            return Err(FtdpError::Config(
                "FTDP_MAX_PARALLEL_TASKS must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear(vars: &[&str]) {
        for var in vars {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_dbt_defaults() {
        clear(&[
            "DBT_ENABLED",
            "DBT_EXECUTABLE_PATH",
            "DBT_PROJECT_DIR",
            "DBT_PROFILES_DIR",
            "DBT_PROFILE",
            "DBT_TARGET",
        ]);

        let config = DbtConfig::from_env().unwrap();
        assert!(config.enabled);
        assert_eq!(config.executable, PathBuf::from(DEFAULT_DBT_EXECUTABLE));
        assert_eq!(config.profile, "analytics");
        assert_eq!(config.target, "dev");
    }

    #[test]
    #[serial]
    fn test_dbt_overrides() {
        std::env::set_var("DBT_ENABLED", "False");
        std::env::set_var("DBT_TARGET", "prod");

        let config = DbtConfig::from_env().unwrap();
        assert!(!config.enabled);
        assert_eq!(config.target, "prod");

        clear(&["DBT_ENABLED", "DBT_TARGET"]);
    }

    #[test]
    #[serial]
    fn test_flag_rejects_garbage() {
        std::env::set_var("DBT_ENABLED", "maybe");
        assert!(DbtConfig::from_env().is_err());
        clear(&["DBT_ENABLED"]);
    }

    #[test]
    #[serial]
    fn test_parallelism_parse() {
        std::env::set_var("FTDP_MAX_PARALLEL_TASKS", "3");
        assert_eq!(RunnerConfig::from_env().unwrap().max_parallel_tasks, Some(3));

        std::env::set_var("FTDP_MAX_PARALLEL_TASKS", "many");
        let err = RunnerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("FTDP_MAX_PARALLEL_TASKS"));

        clear(&["FTDP_MAX_PARALLEL_TASKS"]);
        assert_eq!(RunnerConfig::from_env().unwrap().max_parallel_tasks, None);
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let settings = Settings {
            clickhouse: ClickHouseConfig::default(),
            storage: StorageConfig::for_bucket("truck-data"),
            dbt: DbtConfig::default(),
            runner: RunnerConfig {
                max_parallel_tasks: Some(0),
            },
        };
        assert!(settings.validate().is_err());
    }
}

//! Downstream transformation stage (dbt)

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::config::DbtConfig;
use crate::error::{IngestError, Result};

/// Task group id of the transformation stage
pub const TRANSFORM_TASK_ID: &str = "dbt_task_group";

/// Runs the models built on top of the raw tables
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Returns `true` if models ran, `false` if the stage is disabled
    async fn transform(&self) -> Result<bool>;
}

/// `dbt build` as a child process
#[derive(Debug, Clone)]
pub struct DbtRunner {
    config: DbtConfig,
}

impl DbtRunner {
    pub fn new(config: DbtConfig) -> Self {
        Self { config }
    }

    /// Arguments passed to the dbt executable
    pub fn args(&self) -> Vec<String> {
        vec![
            "build".to_string(),
            "--project-dir".to_string(),
            self.config.project_dir.display().to_string(),
            "--profiles-dir".to_string(),
            self.config.profiles_dir.display().to_string(),
            "--profile".to_string(),
            self.config.profile.clone(),
            "--target".to_string(),
            self.config.target.clone(),
        ]
    }
}

#[async_trait]
impl Transformer for DbtRunner {
    #[instrument(skip(self), fields(project = %self.config.project_dir.display(), target = %self.config.target))]
    async fn transform(&self) -> Result<bool> {
        if !self.config.enabled {
            info!("dbt disabled, skipping transformation stage");
            return Ok(false);
        }

        info!(executable = %self.config.executable.display(), "Running dbt build");

        let output = Command::new(&self.config.executable)
            .args(self.args())
            .current_dir(&self.config.project_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                IngestError::Transform(format!(
                    "failed to launch {}: {}",
                    self.config.executable.display(),
                    e
                ))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            debug!(target: "dbt", "{}", line);
        }

        if !output.status.success() {
            for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
                warn!(target: "dbt", "{}", line);
            }
            let tail = stdout.lines().last().unwrap_or_default().trim().to_string();
            return Err(IngestError::Transform(format!(
                "dbt build exited with {}: {}",
                output.status, tail
            )));
        }

        info!("dbt build finished");

        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn runner(executable: &str, enabled: bool) -> DbtRunner {
        DbtRunner::new(DbtConfig {
            enabled,
            executable: PathBuf::from(executable),
            project_dir: std::env::temp_dir(),
            ..DbtConfig::default()
        })
    }

    #[test]
    fn test_build_arguments() {
        let args = DbtRunner::new(DbtConfig::default()).args();
        assert_eq!(
            args,
            vec![
                "build",
                "--project-dir",
                "/usr/local/airflow/analytics",
                "--profiles-dir",
                "/usr/local/airflow/.dbt",
                "--profile",
                "analytics",
                "--target",
                "dev",
            ]
        );
    }

    #[tokio::test]
    async fn test_disabled_stage_is_skipped() {
        let ran = runner("/nonexistent/dbt", false).transform().await.unwrap();
        assert!(!ran);
    }

    #[tokio::test]
    async fn test_missing_executable_fails() {
        let err = runner("/nonexistent/dbt", true).transform().await.unwrap_err();
        assert!(matches!(err, IngestError::Transform(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_decides_outcome() {
        assert!(runner("true", true).transform().await.unwrap());

        let err = runner("false", true).transform().await.unwrap_err();
        assert!(err.to_string().contains("dbt build exited with"));
    }
}

use ftdp_common::FtdpError;
use serde::Serialize;

use crate::config::{env_opt, env_or};
use crate::error::Result;

/// Default AWS region when `AWS_REGION` is unset.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Where raw table files live and how to reach them
#[derive(Clone, Serialize)]
pub struct StorageConfig {
    pub bucket: String,
    /// Prepended verbatim to each table's source path
    pub prefix: String,
    #[serde(skip)]
    pub access_key: Option<String>,
    #[serde(skip)]
    pub secret_key: Option<String>,
    pub region: String,
    /// Custom S3-compatible endpoint (MinIO); switches to path-style URLs
    pub endpoint: Option<String>,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl StorageConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bucket: env_opt("S3_BUCKET").unwrap_or_default(),
            prefix: std::env::var("S3_PREFIX").unwrap_or_default(),
            access_key: env_opt("AWS_ACCESS_KEY_ID"),
            secret_key: env_opt("AWS_SECRET_ACCESS_KEY"),
            region: env_or("AWS_REGION", DEFAULT_REGION),
            endpoint: env_opt("S3_ENDPOINT_URL").map(|e| e.trim_end_matches('/').to_string()),
        })
    }

    /// Anonymous AWS access to `bucket`, no prefix
    pub fn for_bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: String::new(),
            access_key: None,
            secret_key: None,
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
        }
    }

    /// MinIO defaults, as used by local stacks
    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            endpoint: Some(endpoint.into()),
            ..Self::for_bucket(bucket)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(FtdpError::Config("S3_BUCKET must be set".to_string()).into());
        }

        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(FtdpError::Config(
                "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together".to_string(),
            )
            .into());
        }

        Ok(())
    }

    pub fn path_style(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Object key prefix holding a table's files
    pub fn source_prefix(&self, s3_path: &str) -> String {
        format!("{}{}/", self.prefix, s3_path)
    }

    /// URL of a single object, as the store's remote-read function expects
    pub fn object_url(&self, key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint, self.bucket, key),
            None => format!("s3://{}/{}", self.bucket, key),
        }
    }

    /// Glob URL matching every object under a table's source path
    pub fn source_url(&self, s3_path: &str) -> String {
        self.object_url(&format!("{}*", self.source_prefix(s3_path)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_source_url_on_aws() {
        let config = StorageConfig {
            prefix: "tasty_bytes/raw_pos/".to_string(),
            ..StorageConfig::for_bucket("food-truck")
        };
        assert_eq!(
            config.source_url("country"),
            "s3://food-truck/tasty_bytes/raw_pos/country/*"
        );
        assert_eq!(config.source_prefix("country"), "tasty_bytes/raw_pos/country/");
        assert!(!config.path_style());
    }

    #[test]
    fn test_source_url_on_minio() {
        let config = StorageConfig::for_minio("http://minio:9000", "food-truck");
        assert_eq!(config.source_url("truck"), "http://minio:9000/food-truck/truck/*");
        assert_eq!(
            config.object_url("truck/truck.csv"),
            "http://minio:9000/food-truck/truck/truck.csv"
        );
        assert!(config.path_style());
    }

    #[test]
    fn test_validate() {
        assert!(StorageConfig::for_bucket("").validate().is_err());
        assert!(StorageConfig::for_minio("http://localhost:9000", "b").validate().is_ok());

        let half_credentials = StorageConfig {
            access_key: Some("AKIA".to_string()),
            ..StorageConfig::for_bucket("b")
        };
        assert!(half_credentials.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = StorageConfig::for_minio("http://localhost:9000", "b");
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("\"***\""));
        assert!(!rendered.contains("secret_key: Some(\"minioadmin\")"));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("S3_BUCKET", "food-truck");
        std::env::set_var("S3_PREFIX", "raw/");
        std::env::set_var("S3_ENDPOINT_URL", "http://localhost:9000/");
        std::env::remove_var("AWS_REGION");
        std::env::remove_var("AWS_ACCESS_KEY_ID");
        std::env::remove_var("AWS_SECRET_ACCESS_KEY");

        let config = StorageConfig::from_env().unwrap();
        assert_eq!(config.bucket, "food-truck");
        assert_eq!(config.region, DEFAULT_REGION);
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.source_url("menu"), "http://localhost:9000/food-truck/raw/menu/*");

        for var in ["S3_BUCKET", "S3_PREFIX", "S3_ENDPOINT_URL"] {
            std::env::remove_var(var);
        }
    }
}

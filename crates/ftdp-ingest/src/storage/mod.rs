//! Object storage access
//!
//! The store reads source files itself, so the pipeline only needs object
//! storage for one thing: seeing whether a table's source prefix holds any
//! objects before asking the store to load it.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    Client,
};
use tracing::{debug, info, instrument};

use crate::error::{IngestError, Result};

pub mod config;

use config::StorageConfig;

/// Lists object keys under a prefix
#[async_trait]
pub trait ObjectLister: Send + Sync {
    /// Every object key below `prefix`, excluding directory markers
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;
}

/// S3 (or S3-compatible) bucket client
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        debug!(?config, "Initializing storage client");

        let region = Region::new(config.region.clone());

        let mut builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials = Credentials::new(access_key, secret_key, None, None, "ftdp-storage");
                aws_sdk_s3::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .credentials_provider(credentials)
                    .region(region)
            },
            _ => {
                // No static keys: fall back to the ambient AWS credential chain.
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        builder = builder.force_path_style(config.path_style());

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        info!(bucket = %config.bucket, "Storage client initialized");

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl ObjectLister for S3Storage {
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| {
                    IngestError::storage(
                        &format!("Failed to list s3://{}/{}", self.bucket, prefix),
                        DisplayErrorContext(&e),
                    )
                })?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key())
                    .filter(|key| !key.ends_with('/'))
                    .map(str::to_string),
            );

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        debug!(count = keys.len(), "Listed source objects");

        Ok(keys)
    }
}

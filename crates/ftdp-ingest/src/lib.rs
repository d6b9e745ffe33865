//! FTDP Ingest Library
//!
//! Batch loading of the food truck dataset from object storage into
//! ClickHouse, followed by the dbt models built on the raw tables.
//!
//! # Stages
//!
//! - **Bootstrap**: create every raw table that does not exist yet
//! - **Ingestion**: per table, truncate and let ClickHouse read the source
//!   files straight from S3, then count the rows loaded for the run's date
//! - **Transformation**: `dbt build`
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ftdp_ingest::{
//!     clickhouse::ClickHouseFactory, config::Settings, pipeline::Pipeline, registry::Registry,
//!     storage::S3Storage, transform::DbtRunner,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let pipeline = Pipeline::new(
//!         Registry::food_truck()?,
//!         settings.storage.clone(),
//!         Arc::new(ClickHouseFactory::new(settings.clickhouse.clone())),
//!         Arc::new(S3Storage::new(&settings.storage).await?),
//!         Arc::new(DbtRunner::new(settings.dbt.clone())),
//!     );
//!     let report = pipeline.run(chrono::Utc::now().date_naive()).await?;
//!     println!("{} rows", report.total_rows());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod bootstrap;
pub mod clickhouse;
pub mod config;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod registry;
pub mod schema;
pub mod storage;
pub mod transform;
pub mod warehouse;

pub use error::{IngestError, Result};
pub use ingest::IngestionResult;
pub use pipeline::{Pipeline, PipelineReport};
pub use registry::{FileFormat, Registry, TableConfig};

//! Per-table ingestion task
//!
//! A run fully refreshes one raw table: truncate, have the store read the
//! source objects straight from object storage, then count the rows stamped
//! with the run's logical date. Nothing is staged locally.
//!
//! Truncate and load are two statements. A failure between them leaves the
//! table empty until the task is retried, and retrying from scratch is always
//! safe.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::clickhouse::sql::{RemoteLoad, S3Credentials};
use crate::error::Result;
use crate::registry::TableConfig;
use crate::storage::config::StorageConfig;
use crate::storage::ObjectLister;
use crate::warehouse::{Warehouse, WarehouseFactory};

/// Outcome of one ingestion task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionResult {
    pub table_name: String,
    /// Rows whose ingestion timestamp falls on `execution_date`
    pub rows_ingested: u64,
    pub execution_date: NaiveDate,
}

/// Which objects a load reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceObjects {
    /// Key prefix listed to decide whether anything is there
    pub list_prefix: String,
    /// URL handed to the store's remote-read function
    pub url: String,
    /// Only a key equal to `list_prefix` counts as a source object
    exact: bool,
}

impl SourceObjects {
    /// Every object under the table's source path
    pub fn for_table(storage: &StorageConfig, table: &TableConfig) -> Self {
        Self {
            list_prefix: storage.source_prefix(table.s3_path),
            url: storage.source_url(table.s3_path),
            exact: false,
        }
    }

    /// One object, addressed by its full key
    pub fn single(storage: &StorageConfig, key: &str) -> Self {
        Self {
            list_prefix: key.to_string(),
            url: storage.object_url(key),
            exact: true,
        }
    }

    /// Whether a listed key is one of the objects the load reads
    pub fn matches(&self, key: &str) -> bool {
        if self.exact {
            key == self.list_prefix
        } else {
            key.starts_with(&self.list_prefix)
        }
    }
}

/// Build the bulk load statement for `table` reading `url`
pub fn remote_load(storage: &StorageConfig, table: &TableConfig, url: String) -> Result<RemoteLoad> {
    let schema = table.parsed_schema()?;

    let credentials = match (&storage.access_key, &storage.secret_key) {
        (Some(access_key), Some(secret_key)) => Some(S3Credentials {
            access_key: access_key.clone(),
            secret_key: secret_key.clone(),
        }),
        _ => None,
    };

    Ok(RemoteLoad {
        table_name: table.table_name.to_string(),
        url,
        format: table.file_format,
        columns: schema.source_column_list(),
        structure: schema.source_structure(),
        credentials,
    })
}

/// Refresh `table` from its source path in object storage
///
/// Opens a dedicated connection, released on success and on failure.
pub async fn ingest_table_from_s3(
    factory: &dyn WarehouseFactory,
    lister: &dyn ObjectLister,
    storage: &StorageConfig,
    table: &TableConfig,
    execution_date: NaiveDate,
) -> Result<IngestionResult> {
    let source = SourceObjects::for_table(storage, table);
    ingest_table(factory, lister, storage, table, &source, execution_date).await
}

/// Refresh `table` from an explicit set of source objects
pub async fn ingest_table(
    factory: &dyn WarehouseFactory,
    lister: &dyn ObjectLister,
    storage: &StorageConfig,
    table: &TableConfig,
    source: &SourceObjects,
    execution_date: NaiveDate,
) -> Result<IngestionResult> {
    let warehouse = factory.connect().await?;
    let result = refresh(warehouse.as_ref(), lister, storage, table, source, execution_date).await;
    warehouse.close().await;
    result
}

#[instrument(
    skip_all,
    fields(table = table.table_name, date = %execution_date, source = %source.url)
)]
async fn refresh(
    warehouse: &dyn Warehouse,
    lister: &dyn ObjectLister,
    storage: &StorageConfig,
    table: &TableConfig,
    source: &SourceObjects,
    execution_date: NaiveDate,
) -> Result<IngestionResult> {
    info!("Truncating table");
    warehouse.truncate(table.table_name).await?;

    let objects = lister
        .list_keys(&source.list_prefix)
        .await?
        .iter()
        .filter(|key| source.matches(key))
        .count();

    if objects == 0 {
        warn!(prefix = %source.list_prefix, "No source objects found, skipping load");
        return Ok(IngestionResult {
            table_name: table.table_name.to_string(),
            rows_ingested: 0,
            execution_date,
        });
    }

    let load = remote_load(storage, table, source.url.clone())?;
    info!(objects, query = %load.to_redacted_sql(), "Loading from object storage");
    warehouse.load_remote(&load).await?;

    let rows_ingested = warehouse
        .count_ingested_on(table.table_name, execution_date)
        .await?;

    info!(rows_ingested, "Ingestion complete");

    Ok(IngestionResult {
        table_name: table.table_name.to_string(),
        rows_ingested,
        execution_date,
    })
}

//! The operations pipeline tasks need from the analytical store
//!
//! Tasks talk to the store only through [`Warehouse`], and obtain one
//! connection per task from a [`WarehouseFactory`]. Connections are never
//! shared between tasks.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::clickhouse::sql::RemoteLoad;
use crate::error::Result;

/// One open connection to the analytical store
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run a DDL statement
    async fn execute_ddl(&self, ddl: &str) -> Result<()>;

    /// Remove every row of `table_name`
    async fn truncate(&self, table_name: &str) -> Result<()>;

    /// Have the store read remote objects and append them to a table
    async fn load_remote(&self, load: &RemoteLoad) -> Result<()>;

    /// Rows of `table_name` whose ingestion timestamp falls on `date`
    async fn count_ingested_on(&self, table_name: &str, date: NaiveDate) -> Result<u64>;

    /// Release the connection
    async fn close(&self) {}
}

/// Opens a fresh [`Warehouse`] connection per call
#[async_trait]
pub trait WarehouseFactory: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Warehouse>>;
}

//! Raw table creation

use tracing::{info, instrument};

use crate::error::Result;
use crate::registry::Registry;
use crate::warehouse::{Warehouse, WarehouseFactory};

/// Task id of the bootstrap stage
pub const BOOTSTRAP_TASK_ID: &str = "create_raw_tables";

/// Create every registry table that does not exist yet
///
/// Opens its own connection and releases it whether or not a statement
/// fails. The first failing statement aborts the task.
#[instrument(skip_all, fields(tables = registry.len()))]
pub async fn create_raw_tables(factory: &dyn WarehouseFactory, registry: &Registry) -> Result<()> {
    let warehouse = factory.connect().await?;
    let result = create_tables(warehouse.as_ref(), registry).await;
    warehouse.close().await;
    result
}

async fn create_tables(warehouse: &dyn Warehouse, registry: &Registry) -> Result<()> {
    for table in registry.tables() {
        info!(table = table.table_name, "Creating table");
        warehouse.execute_ddl(table.schema).await?;
        info!(table = table.table_name, "Table ready");
    }

    info!(count = registry.len(), "All raw tables created");

    Ok(())
}

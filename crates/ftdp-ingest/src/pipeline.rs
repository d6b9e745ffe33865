//! Pipeline definitions and the in-process runner
//!
//! `food_truck_data_pipeline` runs its stages in order:
//!
//! ```text
//! create_raw_tables >> [ingest_<table>, ...] >> dbt_task_group >> end
//! ```
//!
//! A stage starts only once every task of the previous stage succeeded.
//! Ingestion tasks have no ordering among themselves and run concurrently,
//! each on its own store connection. If any of them fails the rest still run
//! to completion, the transformation stage is skipped and the run fails with
//! the ids of the failed tasks.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::bootstrap::create_raw_tables;
use crate::error::{IngestError, Result};
use crate::ingest::{ingest_table, ingest_table_from_s3, IngestionResult, SourceObjects};
use crate::registry::Registry;
use crate::storage::config::StorageConfig;
use crate::storage::ObjectLister;
use crate::transform::Transformer;
use crate::warehouse::WarehouseFactory;

/// Id of the full multi-table pipeline
pub const FOOD_TRUCK_PIPELINE_ID: &str = "food_truck_data_pipeline";

/// Id of the single-object pipeline variant
pub const SINGLE_SOURCE_PIPELINE_ID: &str = "food_truck_single_source_pipeline";

/// Table loaded by the single-source variant
pub const SINGLE_SOURCE_TABLE: &str = "raw_country";

/// Object key (below the bucket root) read by the single-source variant
pub const SINGLE_SOURCE_KEY: &str = "country/country.csv";

/// Terminal marker task
pub const END_TASK_ID: &str = "end";

/// Summary of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub pipeline_id: String,
    pub run_id: Uuid,
    pub execution_date: NaiveDate,
    pub results: Vec<IngestionResult>,
    /// Whether the transformation stage actually ran models
    pub transformed: bool,
}

impl PipelineReport {
    pub fn total_rows(&self) -> u64 {
        self.results.iter().map(|r| r.rows_ingested).sum()
    }
}

/// Everything a run needs, shared across spawned tasks
#[derive(Clone)]
pub struct Pipeline {
    registry: Arc<Registry>,
    storage: Arc<StorageConfig>,
    factory: Arc<dyn WarehouseFactory>,
    lister: Arc<dyn ObjectLister>,
    transformer: Arc<dyn Transformer>,
    max_parallel_tasks: Option<usize>,
}

impl Pipeline {
    pub fn new(
        registry: Registry,
        storage: StorageConfig,
        factory: Arc<dyn WarehouseFactory>,
        lister: Arc<dyn ObjectLister>,
        transformer: Arc<dyn Transformer>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            storage: Arc::new(storage),
            factory,
            lister,
            transformer,
            max_parallel_tasks: None,
        }
    }

    /// Bound concurrent ingestion tasks; `None` means one slot per table
    pub fn with_max_parallel_tasks(mut self, max_parallel_tasks: Option<usize>) -> Self {
        self.max_parallel_tasks = max_parallel_tasks;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run `food_truck_data_pipeline` for `execution_date`
    pub async fn run(&self, execution_date: NaiveDate) -> Result<PipelineReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline", pipeline = FOOD_TRUCK_PIPELINE_ID, %run_id, date = %execution_date);

        async move {
            info!(tables = self.registry.len(), "Pipeline run started");

            create_raw_tables(self.factory.as_ref(), &self.registry).await?;

            let results = self.ingest_all(execution_date).await?;
            let transformed = self.transformer.transform().await?;

            self.finish(FOOD_TRUCK_PIPELINE_ID, run_id, execution_date, results, transformed)
        }
        .instrument(span)
        .await
    }

    /// Run the single-source variant: one fixed object into one fixed table
    pub async fn run_single_source(&self, execution_date: NaiveDate) -> Result<PipelineReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline", pipeline = SINGLE_SOURCE_PIPELINE_ID, %run_id, date = %execution_date);

        async move {
            let table = self.registry.get(SINGLE_SOURCE_TABLE)?;
            let single = Registry::new(vec![*table])?;
            create_raw_tables(self.factory.as_ref(), &single).await?;

            let source = SourceObjects::single(&self.storage, SINGLE_SOURCE_KEY);
            let result = ingest_table(
                self.factory.as_ref(),
                self.lister.as_ref(),
                &self.storage,
                table,
                &source,
                execution_date,
            )
            .await
            .inspect_err(|e| error!(task = %table.task_id(), error = %e, "Task failed"))?;

            let transformed = self.transformer.transform().await?;

            self.finish(SINGLE_SOURCE_PIPELINE_ID, run_id, execution_date, vec![result], transformed)
        }
        .instrument(span)
        .await
    }

    /// Run one ingestion task per registry table, concurrently
    ///
    /// Results come back in registry order. Fails with
    /// [`IngestError::TasksFailed`] after every task has finished if any of
    /// them failed.
    pub async fn ingest_all(&self, execution_date: NaiveDate) -> Result<Vec<IngestionResult>> {
        let slots = self
            .max_parallel_tasks
            .unwrap_or(self.registry.len())
            .max(1);
        let semaphore = Arc::new(Semaphore::new(slots));

        info!(tasks = self.registry.len(), slots, "Spawning ingestion tasks");

        let mut tasks = JoinSet::new();

        for (index, table) in self.registry.tables().iter().copied().enumerate() {
            let pipeline = self.clone();
            let semaphore = semaphore.clone();
            let task_id = table.task_id();
            let span = info_span!("task", task = %task_id);

            tasks.spawn(
                async move {
                    let result = match semaphore.acquire_owned().await {
                        Ok(_permit) => {
                            ingest_table_from_s3(
                                pipeline.factory.as_ref(),
                                pipeline.lister.as_ref(),
                                &pipeline.storage,
                                &table,
                                execution_date,
                            )
                            .await
                        },
                        Err(_) => Err(IngestError::Config("task semaphore closed".to_string())),
                    };
                    (index, task_id, result)
                }
                .instrument(span),
            );
        }

        let mut completed: Vec<(usize, IngestionResult)> = Vec::with_capacity(self.registry.len());
        let mut failed = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, task_id, Ok(result))) => {
                    info!(task = %task_id, rows_ingested = result.rows_ingested, "Task succeeded");
                    completed.push((index, result));
                },
                Ok((_, task_id, Err(e))) => {
                    error!(task = %task_id, error = %e, "Task failed");
                    failed.push(task_id);
                },
                Err(e) => {
                    error!(error = %e, "Task panicked");
                    failed.push(format!("<panicked: {}>", e));
                },
            }
        }

        if !failed.is_empty() {
            failed.sort();
            error!(failed = ?failed, "Ingestion stage failed, skipping transformation");
            return Err(IngestError::TasksFailed(failed));
        }

        completed.sort_by_key(|(index, _)| *index);

        Ok(completed.into_iter().map(|(_, result)| result).collect())
    }

    fn finish(
        &self,
        pipeline_id: &str,
        run_id: Uuid,
        execution_date: NaiveDate,
        results: Vec<IngestionResult>,
        transformed: bool,
    ) -> Result<PipelineReport> {
        let report = PipelineReport {
            pipeline_id: pipeline_id.to_string(),
            run_id,
            execution_date,
            results,
            transformed,
        };

        info!(
            task = END_TASK_ID,
            tables = report.results.len(),
            total_rows = report.total_rows(),
            transformed,
            "Pipeline run finished"
        );

        Ok(report)
    }
}

//! In-memory stand-ins for the store, object storage and dbt
//!
//! [`FakeStore`] behaves like ClickHouse as far as the pipeline can tell:
//! `CREATE TABLE IF NOT EXISTS` is a no-op for existing tables, truncating
//! an unknown table fails, and a bulk load appends one row per source row,
//! stamped with the store's current date.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use chrono::NaiveDate;
use ftdp_ingest::{
    clickhouse::sql::RemoteLoad,
    error::{IngestError, Result},
    schema::TableSchema,
    storage::{config::StorageConfig, ObjectLister},
    transform::Transformer,
    warehouse::{Warehouse, WarehouseFactory},
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const BUCKET: &str = "food-truck";
pub const PREFIX: &str = "raw/";
pub const SECRET_KEY: &str = "wJalrXUtnFEMI-s3cr3t";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Storage config with static keys and the `raw/` prefix
pub fn storage_config() -> StorageConfig {
    StorageConfig {
        prefix: PREFIX.to_string(),
        access_key: Some("AKIAEXAMPLE".to_string()),
        secret_key: Some(SECRET_KEY.to_string()),
        ..StorageConfig::for_bucket(BUCKET)
    }
}

#[derive(Default)]
struct StoreState {
    /// Table name to the ingestion date of each row
    tables: BTreeMap<String, Vec<NaiveDate>>,
    /// Rows the store finds behind each remote-read URL
    remote: HashMap<String, u64>,
    failing_loads: HashSet<String>,
    failing_ddl: HashSet<String>,
    statements: Vec<String>,
    opened: usize,
    closed: usize,
    active: usize,
    max_active: usize,
}

/// Shared in-memory store; each `connect` hands out a new connection to it
#[derive(Clone)]
pub struct FakeStore {
    state: Arc<Mutex<StoreState>>,
    today: NaiveDate,
}

impl FakeStore {
    /// A store whose clock reads `today`
    pub fn new(today: NaiveDate) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            today,
        }
    }

    /// Make `rows` source rows readable at `url`
    pub fn put_remote(&self, url: &str, rows: u64) {
        self.state.lock().unwrap().remote.insert(url.to_string(), rows);
    }

    /// Loads into `table_name` fail as if the files were malformed
    pub fn fail_loads_into(&self, table_name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_loads
            .insert(table_name.to_string());
    }

    /// DDL for `table_name` fails as if the statement were rejected
    pub fn fail_ddl_for(&self, table_name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_ddl
            .insert(table_name.to_string());
    }

    pub fn table_names(&self) -> Vec<String> {
        self.state.lock().unwrap().tables.keys().cloned().collect()
    }

    pub fn row_count(&self, table_name: &str) -> Option<usize> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table_name)
            .map(Vec::len)
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    pub fn loads(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| s.starts_with("INSERT INTO"))
            .collect()
    }

    /// (opened, closed) connection counts
    pub fn connections(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.opened, state.closed)
    }

    pub fn max_concurrent_connections(&self) -> usize {
        self.state.lock().unwrap().max_active
    }
}

#[async_trait]
impl WarehouseFactory for FakeStore {
    async fn connect(&self) -> Result<Box<dyn Warehouse>> {
        {
            let mut state = self.state.lock().unwrap();
            state.opened += 1;
            state.active += 1;
            state.max_active = state.max_active.max(state.active);
        }
        Ok(Box::new(FakeConnection {
            store: self.clone(),
        }))
    }
}

struct FakeConnection {
    store: FakeStore,
}

fn unknown_table(table_name: &str) -> IngestError {
    IngestError::Query {
        status: 404,
        message: format!("Code: 60. DB::Exception: Table default.{} does not exist", table_name),
    }
}

#[async_trait]
impl Warehouse for FakeConnection {
    async fn execute_ddl(&self, ddl: &str) -> Result<()> {
        let schema = TableSchema::parse(ddl)?;
        let mut state = self.store.state.lock().unwrap();
        state.statements.push(ddl.trim().to_string());

        if state.failing_ddl.contains(&schema.name) {
            return Err(IngestError::Query {
                status: 400,
                message: "Code: 62. DB::Exception: Syntax error".to_string(),
            });
        }

        if state.tables.contains_key(&schema.name) {
            if schema.if_not_exists {
                return Ok(());
            }
            return Err(IngestError::Query {
                status: 500,
                message: format!("Code: 57. DB::Exception: Table default.{} already exists", schema.name),
            });
        }

        state.tables.insert(schema.name, Vec::new());
        Ok(())
    }

    async fn truncate(&self, table_name: &str) -> Result<()> {
        let mut state = self.store.state.lock().unwrap();
        state.statements.push(format!("TRUNCATE TABLE {}", table_name));
        state
            .tables
            .get_mut(table_name)
            .map(Vec::clear)
            .ok_or_else(|| unknown_table(table_name))
    }

    async fn load_remote(&self, load: &RemoteLoad) -> Result<()> {
        tokio::task::yield_now().await;

        let today = self.store.today;
        let mut state = self.store.state.lock().unwrap();
        state.statements.push(load.to_sql());

        if state.failing_loads.contains(&load.table_name) {
            return Err(IngestError::Query {
                status: 500,
                message: "Code: 27. DB::Exception: Cannot parse input".to_string(),
            });
        }

        let rows = *state.remote.get(&load.url).ok_or_else(|| IngestError::Query {
            status: 500,
            message: format!("Code: 636. DB::Exception: No files found at {}", load.url),
        })?;

        let table = state
            .tables
            .get_mut(&load.table_name)
            .ok_or_else(|| unknown_table(&load.table_name))?;
        table.extend(std::iter::repeat(today).take(rows as usize));

        Ok(())
    }

    async fn count_ingested_on(&self, table_name: &str, date: NaiveDate) -> Result<u64> {
        let state = self.store.state.lock().unwrap();
        let rows = state
            .tables
            .get(table_name)
            .ok_or_else(|| unknown_table(table_name))?;
        Ok(rows.iter().filter(|d| **d == date).count() as u64)
    }

    async fn close(&self) {
        let mut state = self.store.state.lock().unwrap();
        state.closed += 1;
        state.active -= 1;
    }
}

/// Bucket listing backed by a fixed key set
#[derive(Default, Clone)]
pub struct FakeBucket {
    keys: Arc<Mutex<Vec<String>>>,
}

impl FakeBucket {
    pub fn with_keys(keys: &[&str]) -> Self {
        Self {
            keys: Arc::new(Mutex::new(keys.iter().map(|k| k.to_string()).collect())),
        }
    }
}

#[async_trait]
impl ObjectLister for FakeBucket {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .keys
            .lock()
            .unwrap()
            .iter()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Counts transformation runs
#[derive(Default)]
pub struct RecordingTransformer {
    calls: AtomicUsize,
}

impl RecordingTransformer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transformer for RecordingTransformer {
    async fn transform(&self) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

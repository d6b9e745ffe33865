//! Raw table registry
//!
//! The registry is the deploy-time list of raw tables the pipeline loads:
//! where each table's files live under the storage prefix, what format they
//! are in, and the `CREATE TABLE IF NOT EXISTS` statement that declares it.
//! The DDL is a compatibility contract with the files in object storage:
//! reordering or retyping columns is a breaking schema migration.

use serde::Serialize;
use std::collections::HashSet;

use crate::error::{IngestError, Result};
use crate::schema::TableSchema;

/// Store-populated column stamping when each row was loaded
pub const INGESTION_TIMESTAMP_COLUMN: &str = "_ingestion_timestamp";

/// Source file format, named the way the store's input formats are
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileFormat {
    Csv,
    CsvWithNames,
    TabSeparated,
    Parquet,
    JsonEachRow,
}

impl FileFormat {
    /// Format name understood by the store's remote-read function
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Csv => "CSV",
            FileFormat::CsvWithNames => "CSVWithNames",
            FileFormat::TabSeparated => "TSV",
            FileFormat::Parquet => "Parquet",
            FileFormat::JsonEachRow => "JSONEachRow",
        }
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw table definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableConfig {
    /// Target table in the store
    pub table_name: &'static str,
    /// Path below the configured storage prefix holding the table's files
    pub s3_path: &'static str,
    pub file_format: FileFormat,
    /// Idempotent `CREATE TABLE IF NOT EXISTS` statement
    #[serde(skip)]
    pub schema: &'static str,
}

impl TableConfig {
    /// Parse this table's DDL
    pub fn parsed_schema(&self) -> Result<TableSchema> {
        TableSchema::parse(self.schema)
    }

    /// Check the DDL is create-if-absent and declares `table_name`
    pub fn validate(&self) -> Result<TableSchema> {
        let schema = self.parsed_schema().map_err(|e| {
            IngestError::Registry(format!("{}: {}", self.table_name, e))
        })?;

        if !schema.if_not_exists {
            return Err(IngestError::Registry(format!(
                "{}: DDL must use CREATE TABLE IF NOT EXISTS",
                self.table_name
            )));
        }

        if schema.name != self.table_name {
            return Err(IngestError::Registry(format!(
                "{}: DDL declares table '{}'",
                self.table_name, schema.name
            )));
        }

        let stamped = schema
            .columns
            .iter()
            .any(|c| c.name == INGESTION_TIMESTAMP_COLUMN && c.default_expr().is_some());
        if !stamped {
            return Err(IngestError::Registry(format!(
                "{}: DDL must declare {} with a DEFAULT",
                self.table_name, INGESTION_TIMESTAMP_COLUMN
            )));
        }

        if schema.sourced_columns().next().is_none() {
            return Err(IngestError::Registry(format!(
                "{}: every column has a default, nothing to load",
                self.table_name
            )));
        }

        Ok(schema)
    }

    /// Task id of this table's ingestion task
    pub fn task_id(&self) -> String {
        format!("ingest_{}", self.table_name)
    }
}

/// Validated, immutable, ordered set of tables
#[derive(Debug, Clone)]
pub struct Registry {
    tables: Vec<TableConfig>,
}

impl Registry {
    /// Build a registry, rejecting duplicate names and invalid DDL
    pub fn new(tables: impl Into<Vec<TableConfig>>) -> Result<Self> {
        let registry = Self {
            tables: tables.into(),
        };
        registry.validate()?;
        Ok(registry)
    }

    /// Table names are unique and every table's DDL is valid
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();

        for table in &self.tables {
            if !seen.insert(table.table_name) {
                return Err(IngestError::Registry(format!(
                    "Duplicate table name: {}",
                    table.table_name
                )));
            }
            table.validate()?;
        }

        Ok(())
    }

    /// The food truck raw tables
    pub fn food_truck() -> Result<Self> {
        Self::new(TABLES)
    }

    pub fn tables(&self) -> &[TableConfig] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Look a table up by name
    pub fn get(&self, table_name: &str) -> Result<&TableConfig> {
        self.tables
            .iter()
            .find(|t| t.table_name == table_name)
            .ok_or_else(|| IngestError::UnknownTable(table_name.to_string()))
    }
}

/// Raw tables of the food truck dataset, in bootstrap order
pub static TABLES: &[TableConfig] = &[
    TableConfig {
        table_name: "raw_franchise",
        s3_path: "franchise",
        file_format: FileFormat::Csv,
        schema: r#"
    CREATE TABLE IF NOT EXISTS raw_franchise (
        franchise_id UInt64,
        first_name String,
        last_name String,
        city String,
        country String,
        e_mail String,
        phone_number String,
        _ingestion_timestamp DateTime DEFAULT now()
    ) ENGINE = MergeTree()
    ORDER BY (franchise_id)
    PARTITION BY intDiv(franchise_id, 1000)
"#,
    },
    TableConfig {
        table_name: "raw_country",
        s3_path: "country",
        file_format: FileFormat::Csv,
        schema: r#"
    CREATE TABLE IF NOT EXISTS raw_country (
        country_id UInt64,
        country String,
        iso_currency String,
        iso_country String,
        city_id UInt64,
        city String,
        city_population UInt64,
        _ingestion_timestamp DateTime DEFAULT now()
    ) ENGINE = MergeTree()
    ORDER BY (country_id)
    PARTITION BY intDiv(country_id, 1000)
"#,
    },
    TableConfig {
        table_name: "raw_customer_loyalty",
        s3_path: "customer_loyalty",
        file_format: FileFormat::Csv,
        schema: r#"
    CREATE TABLE IF NOT EXISTS raw_customer_loyalty (
        customer_id UInt64,
        first_name String,
        last_name String,
        city String,
        country String,
        postal_code String,
        preferred_language String,
        gender LowCardinality(String),
        favourite_brand String,
        marital_status LowCardinality(String),
        children_count UInt8,
        sign_up_date Date,
        birthday_date Date,
        e_mail String,
        phone_number String,
        _ingestion_timestamp DateTime DEFAULT now()
    ) ENGINE = MergeTree()
    ORDER BY (customer_id, sign_up_date)
    PARTITION BY toYYYYMM(sign_up_date)
"#,
    },
    TableConfig {
        table_name: "raw_truck",
        s3_path: "truck",
        file_format: FileFormat::Csv,
        schema: r#"
    CREATE TABLE IF NOT EXISTS raw_truck (
        truck_id UInt64,
        menu_type_id UInt32,
        primary_city String,
        region String,
        iso_region String,
        country String,
        iso_country_code String,
        franchise_flag UInt8,
        year UInt16,
        make String,
        model String,
        ev_flag UInt8,
        franchise_id UInt64,
        truck_opening_date Date,
        _ingestion_timestamp DateTime DEFAULT now()
    ) ENGINE = MergeTree()
    ORDER BY (truck_id, truck_opening_date)
    PARTITION BY toYYYYMM(truck_opening_date)
"#,
    },
    TableConfig {
        table_name: "raw_location",
        s3_path: "location",
        file_format: FileFormat::Csv,
        schema: r#"
    CREATE TABLE IF NOT EXISTS raw_location (
        location_id UInt64,
        placekey String,
        location String,
        city String,
        region String,
        iso_country_code String,
        country String,
        _ingestion_timestamp DateTime DEFAULT now()
    ) ENGINE = MergeTree()
    ORDER BY (location_id)
    PARTITION BY intDiv(location_id, 1000)
"#,
    },
    TableConfig {
        table_name: "raw_menu",
        s3_path: "menu",
        file_format: FileFormat::Csv,
        schema: r#"
    CREATE TABLE IF NOT EXISTS raw_menu (
        menu_id UInt64,
        menu_type_id UInt32,
        menu_type LowCardinality(String),
        truck_brand_name String,
        menu_item_id UInt64,
        menu_item_name String,
        item_category LowCardinality(String),
        item_subcategory LowCardinality(String),
        cost_of_goods_usd Decimal(10,2),
        sale_price_usd Decimal(10,2),
        menu_item_health_metrics_obj JSON,
        _ingestion_timestamp DateTime DEFAULT now()
    ) ENGINE = MergeTree()
    ORDER BY (menu_item_id)
    PARTITION BY intDiv(menu_item_id, 1000)
"#,
    },
    TableConfig {
        table_name: "raw_order_header",
        s3_path: "order_header",
        file_format: FileFormat::Csv,
        schema: r#"
    CREATE TABLE IF NOT EXISTS raw_order_header (
        order_id UInt64,
        truck_id UInt64,
        location_id UInt64,
        customer_id UInt64,
        discount_id String,
        shift_id UInt32,
        shift_start_time String,
        shift_end_time String,
        order_channel LowCardinality(String),
        order_ts DateTime,
        served_ts DateTime,
        order_currency String,
        order_amount Decimal(10,2),
        order_tax_amount Decimal(10,2),
        order_discount_amount Decimal(10,2),
        order_total Decimal(10,2),
        _ingestion_timestamp DateTime DEFAULT now()
    ) ENGINE = MergeTree()
    ORDER BY (order_id, order_ts)
    PARTITION BY toYYYYMM(order_ts)
"#,
    },
    TableConfig {
        table_name: "raw_order_detail",
        s3_path: "order_detail",
        file_format: FileFormat::Csv,
        schema: r#"
    CREATE TABLE IF NOT EXISTS raw_order_detail (
        order_detail_id UInt64,
        order_id UInt64,
        menu_item_id UInt64,
        discount_id String,
        line_number UInt16,
        quantity UInt8,
        unit_price Decimal(10,2),
        price Decimal(10,2),
        order_item_discount_amount Decimal(10,2),
        _ingestion_timestamp DateTime DEFAULT now()
    ) ENGINE = MergeTree()
    ORDER BY (order_detail_id, order_id)
    PARTITION BY intDiv(order_id, 1000)
"#,
    },
];

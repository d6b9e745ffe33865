//! FTDP Ingest - food truck pipeline runner

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use ftdp_common::logging::{init_logging, LogConfig, LogLevel};
use ftdp_ingest::{
    bootstrap::create_raw_tables,
    clickhouse::ClickHouseFactory,
    config::Settings,
    ingest::ingest_table_from_s3,
    pipeline::Pipeline,
    registry::Registry,
    storage::S3Storage,
    transform::DbtRunner,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ftdp-ingest")]
#[command(author, version, about = "Food truck data pipeline: S3 to ClickHouse, then dbt")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the raw tables in the registry
    Tables,

    /// Create every raw table that does not exist yet
    Bootstrap,

    /// Truncate and reload a single table
    Ingest {
        /// Target table, e.g. raw_country
        #[arg(short, long)]
        table: String,

        /// Logical run date (YYYY-MM-DD), defaults to today (UTC)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Run food_truck_data_pipeline
    Run {
        /// Logical run date (YYYY-MM-DD), defaults to today (UTC)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Run the single-source pipeline variant
    RunSingle {
        /// Logical run date (YYYY-MM-DD), defaults to today (UTC)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
}

#[derive(Serialize)]
struct TableRow<'a> {
    table_name: &'a str,
    s3_path: &'a str,
    file_format: &'a str,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("ftdp-ingest")
        .build();

    // Environment variables take precedence over flags
    let log_config = log_config.clone().with_env_overrides().unwrap_or(log_config);

    let _guard = init_logging(&log_config)?;

    let registry = Registry::food_truck()?;

    if let Command::Tables = cli.command {
        let rows: Vec<TableRow> = registry
            .tables()
            .iter()
            .map(|t| TableRow {
                table_name: t.table_name,
                s3_path: t.s3_path,
                file_format: t.file_format.as_str(),
            })
            .collect();
        print_json(&rows)?;
        return Ok(());
    }

    let settings = Settings::load().context("Invalid configuration")?;
    let factory = Arc::new(ClickHouseFactory::new(settings.clickhouse.clone()));

    match cli.command {
        Command::Tables => {},
        Command::Bootstrap => {
            create_raw_tables(factory.as_ref(), &registry).await?;
            info!("Bootstrap complete");
        },
        Command::Ingest { table, date } => {
            let table = registry.get(&table)?;
            let storage = S3Storage::new(&settings.storage).await?;
            let result = ingest_table_from_s3(
                factory.as_ref(),
                &storage,
                &settings.storage,
                table,
                date.unwrap_or_else(today),
            )
            .await?;
            print_json(&result)?;
        },
        Command::Run { date } => {
            let pipeline = build_pipeline(registry, &settings, factory).await?;
            let report = pipeline.run(date.unwrap_or_else(today)).await?;
            print_json(&report)?;
        },
        Command::RunSingle { date } => {
            let pipeline = build_pipeline(registry, &settings, factory).await?;
            let report = pipeline.run_single_source(date.unwrap_or_else(today)).await?;
            print_json(&report)?;
        },
    }

    Ok(())
}

async fn build_pipeline(
    registry: Registry,
    settings: &Settings,
    factory: Arc<ClickHouseFactory>,
) -> Result<Pipeline> {
    let storage = S3Storage::new(&settings.storage).await?;

    Ok(Pipeline::new(
        registry,
        settings.storage.clone(),
        factory,
        Arc::new(storage),
        Arc::new(DbtRunner::new(settings.dbt.clone())),
    )
    .with_max_parallel_tasks(settings.runner.max_parallel_tasks))
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

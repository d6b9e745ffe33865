//! ClickHouse client over the HTTP interface
//!
//! Statements are POSTed as the request body; the database and any session
//! settings travel as query parameters and credentials as
//! `X-ClickHouse-User` / `X-ClickHouse-Key` headers. A non-2xx response body
//! carries the server's exception text, which becomes
//! [`IngestError::Query`].

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::{IngestError, Result};
use crate::warehouse::{Warehouse, WarehouseFactory};

pub mod config;
pub mod sql;

use config::ClickHouseConfig;
use sql::RemoteLoad;

/// Connection to a ClickHouse server
pub struct ClickHouseClient {
    http: Client,
    endpoint: String,
    username: String,
    password: String,
    params: Vec<(String, String)>,
}

impl ClickHouseClient {
    /// Build a client without contacting the server
    pub fn new(config: &ClickHouseConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.query_timeout_secs))
            .build()
            .map_err(|source| IngestError::Connection {
                endpoint: config.endpoint(),
                source,
            })?;

        let mut params = vec![("database".to_string(), config.database.clone())];
        params.extend(config.settings.iter().cloned());

        Ok(Self {
            http,
            endpoint: config.endpoint(),
            username: config.username.clone(),
            password: config.password.clone(),
            params,
        })
    }

    /// Build a client and check the server answers
    pub async fn connect(config: &ClickHouseConfig) -> Result<Self> {
        let client = Self::new(config)?;
        client.ping().await?;
        info!(endpoint = %client.endpoint, database = %config.database, "Connected to ClickHouse");
        Ok(client)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `GET /ping`, which answers `Ok.` without authentication
    pub async fn ping(&self) -> Result<()> {
        let url = format!("{}/ping", self.endpoint);
        let response = self.http.get(&url).send().await.map_err(|e| self.connection_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.connection_error(e))?;

        if status != StatusCode::OK || body.trim() != "Ok." {
            return Err(IngestError::UnexpectedResponse(format!(
                "ping returned HTTP {} '{}'",
                status.as_u16(),
                body.trim()
            )));
        }

        Ok(())
    }

    /// Execute one statement and return the raw response body
    #[instrument(skip(self, statement), fields(endpoint = %self.endpoint))]
    pub async fn command(&self, statement: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/", self.endpoint))
            .query(&self.params)
            .header("X-ClickHouse-User", &self.username)
            .header("X-ClickHouse-Key", &self.password)
            .body(statement.to_string())
            .send()
            .await
            .map_err(|e| self.connection_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.connection_error(e))?;

        if !status.is_success() {
            return Err(IngestError::Query {
                status: status.as_u16(),
                message: body.trim().to_string(),
            });
        }

        debug!(bytes = body.len(), "Statement completed");

        Ok(body)
    }

    /// Execute a query that returns a single unsigned integer
    pub async fn query_u64(&self, statement: &str) -> Result<u64> {
        let body = self.command(statement).await?;
        body.trim().parse().map_err(|_| {
            IngestError::UnexpectedResponse(format!("expected a single count, got '{}'", body.trim()))
        })
    }

    fn connection_error(&self, source: reqwest::Error) -> IngestError {
        IngestError::Connection {
            endpoint: self.endpoint.clone(),
            source,
        }
    }
}

#[async_trait]
impl Warehouse for ClickHouseClient {
    async fn execute_ddl(&self, ddl: &str) -> Result<()> {
        self.command(ddl).await.map(|_| ())
    }

    async fn truncate(&self, table_name: &str) -> Result<()> {
        self.command(&sql::truncate_table(table_name)).await.map(|_| ())
    }

    async fn load_remote(&self, load: &RemoteLoad) -> Result<()> {
        self.command(&load.to_sql()).await.map(|_| ())
    }

    async fn count_ingested_on(&self, table_name: &str, date: NaiveDate) -> Result<u64> {
        self.query_u64(&sql::count_ingested_on(table_name, date)).await
    }

    async fn close(&self) {
        debug!(endpoint = %self.endpoint, "Closing ClickHouse connection");
    }
}

/// Opens a new [`ClickHouseClient`] for every task
#[derive(Debug, Clone)]
pub struct ClickHouseFactory {
    config: ClickHouseConfig,
}

impl ClickHouseFactory {
    pub fn new(config: ClickHouseConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl WarehouseFactory for ClickHouseFactory {
    async fn connect(&self) -> Result<Box<dyn Warehouse>> {
        let client = ClickHouseClient::connect(&self.config).await?;
        Ok(Box::new(client))
    }
}

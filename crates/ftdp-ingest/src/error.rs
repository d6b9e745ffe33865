//! Error types for the ingestion pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Every failure a pipeline task can surface
///
/// None of these are recovered locally: tasks log, release their connection
/// and hand the error to the caller, which fails the run.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Common(#[from] ftdp_common::FtdpError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid table registry: {0}")]
    Registry(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Failed to reach ClickHouse at {endpoint}: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("ClickHouse rejected statement (HTTP {status}): {message}")]
    Query { status: u16, message: String },

    #[error("Unexpected ClickHouse response: {0}")]
    UnexpectedResponse(String),

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("Transformation stage failed: {0}")]
    Transform(String),

    #[error("{} task(s) failed: {}", .0.len(), .0.join(", "))]
    TasksFailed(Vec<String>),
}

impl IngestError {
    /// Build an [`IngestError::Storage`] from any displayable SDK error
    pub fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        IngestError::Storage(format!("{}: {}", context, err))
    }
}

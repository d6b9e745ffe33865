//! FTDP Common Library
//!
//! Shared error handling and logging for the food truck data pipeline.
//!
//! # Overview
//!
//! - **Error Handling**: [`FtdpError`] and the [`Result`] alias
//! - **Logging**: environment-driven `tracing` setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use ftdp_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{FtdpError, Result};

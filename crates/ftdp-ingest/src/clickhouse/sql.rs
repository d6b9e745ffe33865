//! Statement text for the pipeline's handful of ClickHouse operations

use chrono::NaiveDate;

use crate::registry::{FileFormat, INGESTION_TIMESTAMP_COLUMN};

const REDACTED: &str = "***";

/// Quote a string literal for ClickHouse SQL
pub fn quote_literal(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

pub fn truncate_table(table_name: &str) -> String {
    format!("TRUNCATE TABLE {}", table_name)
}

/// Rows whose ingestion timestamp falls on `date`
///
/// Logical dates are UTC, so the timestamp is converted in UTC rather than
/// the server's timezone.
pub fn count_ingested_on(table_name: &str, date: NaiveDate) -> String {
    format!(
        "SELECT count() FROM {} WHERE toDate({}, 'UTC') = {}",
        table_name,
        INGESTION_TIMESTAMP_COLUMN,
        quote_literal(&date.format("%Y-%m-%d").to_string())
    )
}

/// Static key pair handed to the store's `s3()` table function
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key: String,
    pub secret_key: String,
}

/// A bulk load the store performs by reading objects itself
#[derive(Clone)]
pub struct RemoteLoad {
    pub table_name: String,
    /// Object URL or glob, e.g. `s3://bucket/prefix/country/*`
    pub url: String,
    pub format: FileFormat,
    /// Target columns, comma separated, in file order
    pub columns: String,
    /// `name Type, ...` structure of the files
    pub structure: String,
    pub credentials: Option<S3Credentials>,
}

impl RemoteLoad {
    /// `INSERT ... SELECT * FROM s3(...)` with credentials inline
    pub fn to_sql(&self) -> String {
        self.render(false)
    }

    /// Same statement with the secret key masked, safe for logs
    pub fn to_redacted_sql(&self) -> String {
        self.render(true)
    }

    fn render(&self, redact: bool) -> String {
        let mut args = vec![quote_literal(&self.url)];

        if let Some(credentials) = &self.credentials {
            args.push(quote_literal(&credentials.access_key));
            args.push(if redact {
                quote_literal(REDACTED)
            } else {
                quote_literal(&credentials.secret_key)
            });
        }

        args.push(quote_literal(self.format.as_str()));
        args.push(quote_literal(&self.structure));

        format!(
            "INSERT INTO {} ({})\nSELECT *\nFROM s3(\n    {}\n)",
            self.table_name,
            self.columns,
            args.join(",\n    ")
        )
    }
}

impl std::fmt::Debug for RemoteLoad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_redacted_sql())
    }
}

//! Reading table declarations out of registry DDL
//!
//! The registry keeps each table's `CREATE TABLE` statement verbatim. The
//! loader needs two things from it: the declared table name (to check it
//! against the registry entry) and the column list (to bind source file
//! columns while leaving store-populated columns to the store).

use sqlparser::ast::{ColumnDef, ColumnOption, DataType, ExactNumberInfo, Statement};
use sqlparser::dialect::ClickHouseDialect;
use sqlparser::parser::Parser;

use crate::error::{IngestError, Result};

/// How the store fills a column that source files do not carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Populated {
    Default(String),
    Materialized(String),
    Alias(String),
    Ephemeral(Option<String>),
}

/// One column of a declared table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Type as ClickHouse spells it, without column modifiers
    pub data_type: String,
    pub populated: Option<Populated>,
}

impl Column {
    /// Whether source files are expected to carry this column
    pub fn is_sourced(&self) -> bool {
        self.populated.is_none()
    }

    /// The `DEFAULT` expression, if the column has one
    pub fn default_expr(&self) -> Option<&str> {
        match &self.populated {
            Some(Populated::Default(expr)) => Some(expr),
            _ => None,
        }
    }

    fn from_def(def: &ColumnDef) -> Self {
        let populated = def.options.iter().find_map(|option| match &option.option {
            ColumnOption::Default(expr) => Some(Populated::Default(expr.to_string())),
            ColumnOption::Materialized(expr) => Some(Populated::Materialized(expr.to_string())),
            ColumnOption::Alias(expr) => Some(Populated::Alias(expr.to_string())),
            ColumnOption::Ephemeral(expr) => {
                Some(Populated::Ephemeral(expr.as_ref().map(ToString::to_string)))
            },
            _ => None,
        });

        Self {
            name: def.name.value.clone(),
            data_type: clickhouse_type(&def.data_type),
            populated,
        }
    }
}

/// What a `CREATE TABLE` statement declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub if_not_exists: bool,
    pub columns: Vec<Column>,
}

impl TableSchema {
    /// Parse the header and column list of a `CREATE TABLE` statement
    ///
    /// Only the first statement is read. Engine, ordering and partitioning
    /// clauses are left to the store.
    pub fn parse(ddl: &str) -> Result<Self> {
        let dialect = ClickHouseDialect {};

        let statement = Parser::new(&dialect)
            .try_with_sql(ddl)
            .and_then(|mut parser| parser.parse_statement())
            .map_err(|e| IngestError::Registry(format!("Unparseable DDL: {}", e)))?;

        let create = match statement {
            Statement::CreateTable(create) => create,
            _ => {
                return Err(IngestError::Registry(
                    "DDL is not a CREATE TABLE statement".to_string(),
                ))
            },
        };

        let name = create.name.to_string();

        if create.columns.is_empty() {
            return Err(IngestError::Registry(format!("DDL for {} declares no columns", name)));
        }

        Ok(Self {
            name,
            if_not_exists: create.if_not_exists,
            columns: create.columns.iter().map(Column::from_def).collect(),
        })
    }

    /// Columns populated from source files, in declaration order
    pub fn sourced_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_sourced())
    }

    /// `name Type, name Type` structure string for the sourced columns
    pub fn source_structure(&self) -> String {
        self.sourced_columns()
            .map(|c| format!("{} {}", c.name, c.data_type))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Comma separated sourced column names
    pub fn source_column_list(&self) -> String {
        self.sourced_columns()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Render a parsed type with ClickHouse's case-sensitive type names
fn clickhouse_type(data_type: &DataType) -> String {
    match data_type {
        DataType::String(None) => "String".to_string(),
        DataType::Date => "Date".to_string(),
        DataType::Datetime(None) => "DateTime".to_string(),
        DataType::Decimal(ExactNumberInfo::PrecisionAndScale(precision, scale)) => {
            format!("Decimal({},{})", precision, scale)
        },
        DataType::Decimal(ExactNumberInfo::Precision(precision)) => format!("Decimal({})", precision),
        DataType::Decimal(ExactNumberInfo::None) => "Decimal".to_string(),
        DataType::LowCardinality(inner) => format!("LowCardinality({})", clickhouse_type(inner)),
        DataType::Nullable(inner) => format!("Nullable({})", clickhouse_type(inner)),
        other => other.to_string(),
    }
}

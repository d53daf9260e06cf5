//! Foreign key heuristics: `*_id` columns without a constraint or an index.

use crate::catalog::{identifier_binds, postgres};
use crate::db::{DbPool, SandboxedExecutor};
use crate::error::{DbError, DbResult};
use crate::models::{QueryRows, ToolArguments};
use crate::tools::format::OutputFormat;
use crate::validation::validate_identifier;
use schemars::JsonSchema;
use serde::Deserialize;

/// Input for the foreign key tools.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ForeignKeyInput {
    /// Only inspect this table (optionally schema-qualified). Default: all tables
    #[serde(default)]
    pub table_name: Option<String>,
    /// Output format: "json" returns rows, "table" returns ASCII table, "markdown" returns markdown table
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKeyCheck {
    MissingConstraints,
    MissingIndexes,
}

impl ForeignKeyCheck {
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::MissingConstraints => "missing_fk_constraints",
            Self::MissingIndexes => "missing_fk_indexes",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::MissingConstraints => "Shows missing foreign key constraints",
            Self::MissingIndexes => "Shows missing foreign key indexes",
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            Self::MissingConstraints => postgres::MISSING_FK_CONSTRAINTS,
            Self::MissingIndexes => postgres::MISSING_FK_INDEXES,
        }
    }

    pub async fn run(
        &self,
        executor: &SandboxedExecutor,
        pool: &DbPool,
        args: &ToolArguments,
    ) -> DbResult<QueryRows> {
        let DbPool::Postgres(_) = pool else {
            return Err(DbError::invalid_input(format!(
                "{} is only available for PostgreSQL",
                self.tool_name()
            )));
        };

        let table = args
            .get("table_name")
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(validate_identifier)
            .transpose()?;
        let binds = identifier_binds(pool.db_type(), table.as_ref());

        executor.execute_with_args(pool, self.sql(), &binds).await
    }
}

//! Ad-hoc EXPLAIN / EXPLAIN ANALYZE tools.
//!
//! The caller supplies a bare SELECT. It is validated with the EXPLAIN
//! denylist, then the tool adds its own prefix and runs the result through
//! the sandboxed executor.

use crate::db::{DbPool, SandboxedExecutor};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryRows, ToolArguments};
use crate::tools::format::OutputFormat;
use crate::validation::{Denylist, QueryValidator};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

/// Operator opt-in for the ad-hoc SQL tools. Both default off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExplainFlags {
    pub explain: bool,
    pub explain_analyze: bool,
}

impl ExplainFlags {
    pub fn modes(&self) -> Vec<ExplainMode> {
        let mut modes = Vec::new();
        if self.explain {
            modes.push(ExplainMode::Explain);
        }
        if self.explain_analyze {
            modes.push(ExplainMode::Analyze);
        }
        modes
    }
}

/// Which EXPLAIN tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplainMode {
    Explain,
    Analyze,
}

impl ExplainMode {
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Explain => "explain",
            Self::Analyze => "explain_analyze",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Explain => {
                "EXPLAIN a query. It must be an SQL string, without the EXPLAIN prefix.\n\
                 Runs in a transaction that is always rolled back."
            }
            Self::Analyze => {
                "EXPLAIN ANALYZE a query. It must be an SQL string, without the EXPLAIN ANALYZE prefix.\n\
                 The query is executed inside a transaction that is always rolled back. Functions \
                 with effects outside the transaction (e.g. pg_terminate_backend) still take effect."
            }
        }
    }

    /// Statement prefix for `db_type`; `None` when the database has no equivalent.
    pub fn prefix(&self, db_type: DatabaseType) -> Option<&'static str> {
        match (self, db_type) {
            (Self::Explain, DatabaseType::PostgreSQL) => Some("EXPLAIN "),
            (Self::Analyze, DatabaseType::PostgreSQL) => Some("EXPLAIN ANALYZE "),
            (Self::Explain, DatabaseType::SQLite) => Some("EXPLAIN QUERY PLAN "),
            (Self::Analyze, DatabaseType::SQLite) => None,
        }
    }
}

/// Input for the explain tools.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExplainInput {
    /// The query to debug
    pub query: String,
    /// Output format: "json" returns rows, "table" returns ASCII table, "markdown" returns markdown table
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

/// One registered EXPLAIN tool.
#[derive(Debug, Clone)]
pub struct ExplainTool {
    mode: ExplainMode,
    prefix: &'static str,
    validator: QueryValidator,
}

impl ExplainTool {
    /// Build the tool for `db_type`, or `None` if the database cannot run this mode.
    pub fn new(mode: ExplainMode, db_type: DatabaseType) -> Option<Self> {
        let prefix = mode.prefix(db_type)?;
        Some(Self {
            mode,
            prefix,
            validator: QueryValidator::for_database(db_type, Denylist::for_explain()),
        })
    }

    pub fn mode(&self) -> ExplainMode {
        self.mode
    }

    /// Validate `query`, prefix it and run it in the sandbox.
    pub async fn run(
        &self,
        executor: &SandboxedExecutor,
        pool: &DbPool,
        args: &ToolArguments,
    ) -> DbResult<QueryRows> {
        // Blank text is left to the validator, which reports it as an empty query.
        let raw = args
            .get("query")
            .ok_or_else(|| DbError::invalid_input("Argument 'query' is required"))?;
        let query = self.validator.validate(raw).into_result()?;
        debug!(tool = self.mode.tool_name(), query = %query, "Query accepted");

        let prefix = self.prefix;
        executor
            .execute_transformed(pool, &query, |sql| format!("{}{}", prefix, sql))
            .await
    }
}

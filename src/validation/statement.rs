//! Structural SQL parsing behind a parser seam.
//!
//! [`StatementParser`] turns SQL text into a [`StatementTree`]: one entry per
//! top-level statement, each tagged with a [`StatementKind`]. The production
//! implementation, [`SqlParser`], uses [sqlparser](https://docs.rs/sqlparser/) with
//! the dialect of the target database.

use crate::models::DatabaseType;
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::{Dialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

/// Statement families the validator distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// A query made only of SELECT / VALUES / TABLE branches
    Select,
    /// `SELECT ... INTO new_table`, which creates a table
    SelectInto,
    /// INSERT, UPDATE, DELETE, MERGE, COPY, or a query containing one
    Dml,
    /// CREATE, ALTER, DROP, TRUNCATE, COMMENT
    Ddl,
    /// BEGIN, COMMIT, ROLLBACK, SAVEPOINT
    Transaction,
    /// EXPLAIN wrapping another statement
    Explain,
    Other,
}

/// One top-level statement of a parsed input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStatement {
    pub kind: StatementKind,
    /// Human-readable statement name used in rejection messages
    pub label: &'static str,
}

/// Parse result: the top-level statements in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementTree {
    pub statements: Vec<ParsedStatement>,
}

impl StatementTree {
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Parser failure, carrying the parser's own message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Anything that can turn SQL text into a statement tree.
pub trait StatementParser: Send + Sync {
    fn parse(&self, sql: &str) -> Result<StatementTree, ParseError>;
}

/// `sqlparser`-backed parser for one database dialect.
#[derive(Debug, Clone, Copy)]
pub struct SqlParser {
    db_type: DatabaseType,
}

impl SqlParser {
    pub fn new(db_type: DatabaseType) -> Self {
        Self { db_type }
    }

    fn dialect(&self) -> Box<dyn Dialect> {
        dialect_for(self.db_type)
    }
}

/// The `sqlparser` dialect for a target database.
pub(crate) fn dialect_for(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

impl StatementParser for SqlParser {
    fn parse(&self, sql: &str) -> Result<StatementTree, ParseError> {
        let dialect = self.dialect();
        let statements = Parser::parse_sql(dialect.as_ref(), sql)
            .map_err(|e| ParseError::new(e.to_string()))?;

        // PostgreSqlDialect accepts an empty select list, which lets
        // `SELECT FROM WHERE` through as a scan of a table named WHERE.
        if statements.iter().any(statement_has_empty_projection) {
            return Err(ParseError::new("SELECT list is empty"));
        }

        Ok(StatementTree {
            statements: statements.iter().map(classify_statement).collect(),
        })
    }
}

/// Classify a parsed statement into a statement kind.
fn classify_statement(stmt: &Statement) -> ParsedStatement {
    let (kind, label) = match stmt {
        Statement::Query(query) => match classify_query(query) {
            StatementKind::Select => (StatementKind::Select, "SELECT"),
            StatementKind::SelectInto => (StatementKind::SelectInto, "SELECT INTO"),
            kind => (kind, "data-modifying query"),
        },
        Statement::Explain { .. } | Statement::ExplainTable { .. } => {
            (StatementKind::Explain, "EXPLAIN")
        }

        Statement::Insert { .. } => (StatementKind::Dml, "INSERT"),
        Statement::Update { .. } => (StatementKind::Dml, "UPDATE"),
        Statement::Delete { .. } => (StatementKind::Dml, "DELETE"),
        Statement::Merge { .. } => (StatementKind::Dml, "MERGE"),
        Statement::Copy { .. } => (StatementKind::Dml, "COPY"),

        Statement::CreateTable { .. } => (StatementKind::Ddl, "CREATE TABLE"),
        Statement::CreateView { .. } => (StatementKind::Ddl, "CREATE VIEW"),
        Statement::CreateIndex { .. } => (StatementKind::Ddl, "CREATE INDEX"),
        Statement::CreateSchema { .. } => (StatementKind::Ddl, "CREATE SCHEMA"),
        Statement::CreateDatabase { .. } => (StatementKind::Ddl, "CREATE DATABASE"),
        Statement::CreateFunction { .. } => (StatementKind::Ddl, "CREATE FUNCTION"),
        Statement::AlterTable { .. } => (StatementKind::Ddl, "ALTER TABLE"),
        Statement::AlterIndex { .. } => (StatementKind::Ddl, "ALTER INDEX"),
        Statement::Drop { .. } => (StatementKind::Ddl, "DROP"),
        Statement::Truncate { .. } => (StatementKind::Ddl, "TRUNCATE"),
        Statement::Comment { .. } => (StatementKind::Ddl, "COMMENT"),

        Statement::StartTransaction { .. } => (StatementKind::Transaction, "BEGIN"),
        Statement::Commit { .. } => (StatementKind::Transaction, "COMMIT"),
        Statement::Rollback { .. } => (StatementKind::Transaction, "ROLLBACK"),
        Statement::Savepoint { .. } => (StatementKind::Transaction, "SAVEPOINT"),

        Statement::Grant { .. } => (StatementKind::Other, "GRANT"),
        Statement::Revoke { .. } => (StatementKind::Other, "REVOKE"),
        Statement::Analyze { .. } => (StatementKind::Other, "ANALYZE"),
        _ => (StatementKind::Other, "non-SELECT statement"),
    };
    ParsedStatement { kind, label }
}

/// A query is a SELECT only if its CTEs and every set-operation branch are.
fn classify_query(query: &Query) -> StatementKind {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            let kind = classify_query(&cte.query);
            if kind != StatementKind::Select {
                return kind;
            }
        }
    }
    classify_set_expr(&query.body)
}

fn classify_set_expr(expr: &SetExpr) -> StatementKind {
    match expr {
        SetExpr::Select(select) if select.into.is_some() => StatementKind::SelectInto,
        SetExpr::Select(_) | SetExpr::Values(_) | SetExpr::Table(_) => StatementKind::Select,
        SetExpr::Query(query) => classify_query(query),
        SetExpr::SetOperation { left, right, .. } => match classify_set_expr(left) {
            StatementKind::Select => classify_set_expr(right),
            kind => kind,
        },
        // INSERT / UPDATE / DELETE / MERGE bodies (e.g. inside a CTE)
        _ => StatementKind::Dml,
    }
}

fn statement_has_empty_projection(stmt: &Statement) -> bool {
    match stmt {
        Statement::Query(query) => query_has_empty_projection(query),
        _ => false,
    }
}

fn query_has_empty_projection(query: &Query) -> bool {
    let in_ctes = query
        .with
        .as_ref()
        .is_some_and(|with| with.cte_tables.iter().any(|cte| query_has_empty_projection(&cte.query)));
    in_ctes || set_expr_has_empty_projection(&query.body)
}

fn set_expr_has_empty_projection(expr: &SetExpr) -> bool {
    match expr {
        SetExpr::Select(select) => select.projection.is_empty(),
        SetExpr::Query(query) => query_has_empty_projection(query),
        SetExpr::SetOperation { left, right, .. } => {
            set_expr_has_empty_projection(left) || set_expr_has_empty_projection(right)
        }
        _ => false,
    }
}

//! Catalog of predefined introspection queries.
//!
//! SQL lives in the per-database submodules as trusted static text; arguments
//! never reach it as text, only as bound parameters after validation.

pub mod postgres;
pub mod sqlite;

use crate::db::{DbPool, SandboxedExecutor};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryRows, ToolArguments};
use crate::validation::{Identifier, validate_identifier};

/// Catalog entries that exist but are never exposed as tools: they change
/// server state, or are not diagnostics at all.
pub const SKIPPED_QUERIES: &[&str] = &[
    "add_extensions",
    "pg_stat_statements_reset",
    "kill_pid",
    "kill_all",
    "mandelbrot",
];

/// How a catalog argument is validated and bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// `name` or `schema.name`; binds two parameters (name, schema).
    Identifier,
    /// Signed integer; binds one parameter.
    Integer,
}

#[derive(Debug, Clone, Copy)]
pub struct CatalogArg {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ArgKind,
    pub required: bool,
}

const TABLE_NAME_ARG: CatalogArg = CatalogArg {
    name: "table_name",
    description: "Table name, optionally schema-qualified (e.g. users or public.users)",
    kind: ArgKind::Identifier,
    required: true,
};

const PID_ARG: CatalogArg = CatalogArg {
    name: "pid",
    description: "Backend process id",
    kind: ArgKind::Integer,
    required: true,
};

/// One introspection query, with per-database SQL.
#[derive(Debug)]
pub struct CatalogQuery {
    pub name: &'static str,
    pub description: &'static str,
    pub args: &'static [CatalogArg],
    pub postgres: Option<&'static str>,
    pub sqlite: Option<&'static str>,
}

impl CatalogQuery {
    pub fn sql_for(&self, db_type: DatabaseType) -> Option<&'static str> {
        match db_type {
            DatabaseType::PostgreSQL => self.postgres,
            DatabaseType::SQLite => self.sqlite,
        }
    }

    pub fn supports(&self, db_type: DatabaseType) -> bool {
        self.sql_for(db_type).is_some()
    }

    pub fn is_skipped(&self) -> bool {
        SKIPPED_QUERIES.contains(&self.name)
    }
}

macro_rules! pg {
    ($name:literal, $desc:literal, $sql:expr) => {
        CatalogQuery {
            name: $name,
            description: $desc,
            args: &[],
            postgres: Some($sql),
            sqlite: None,
        }
    };
}

static CATALOG: &[CatalogQuery] = &[
    pg!("cache_hit", "Index and table hit rate", postgres::CACHE_HIT),
    pg!("index_cache_hit", "Calculates your cache hit rate for reading indexes", postgres::INDEX_CACHE_HIT),
    pg!("table_cache_hit", "Calculates your cache hit rate for reading tables", postgres::TABLE_CACHE_HIT),
    pg!("index_usage", "Index hit rate (effective databases are at 99% and up)", postgres::INDEX_USAGE),
    pg!("locks", "Queries with active exclusive locks", postgres::LOCKS),
    pg!("all_locks", "Queries with active locks", postgres::ALL_LOCKS),
    pg!("outliers", "Queries that have longest execution time in aggregate", postgres::OUTLIERS),
    pg!("calls", "Queries that have the highest frequency of execution", postgres::CALLS),
    pg!("blocking", "Queries holding locks other queries are waiting to be released", postgres::BLOCKING),
    pg!("total_index_size", "Total size of all indexes in MB", postgres::TOTAL_INDEX_SIZE),
    pg!("index_size", "The size of indexes, descending by size", postgres::INDEX_SIZE),
    pg!("table_size", "Size of the tables (excluding indexes), descending by size", postgres::TABLE_SIZE),
    pg!("table_indexes_size", "Total size of all the indexes on each table, descending by size", postgres::TABLE_INDEXES_SIZE),
    pg!("total_table_size", "Size of the tables (including indexes), descending by size", postgres::TOTAL_TABLE_SIZE),
    pg!("unused_indexes", "Unused and almost unused indexes", postgres::UNUSED_INDEXES),
    pg!("duplicate_indexes", "Multiple indexes that have the same set of columns, same opclass, expression and predicate", postgres::DUPLICATE_INDEXES),
    pg!("null_indexes", "Find indexes with a high ratio of NULL values", postgres::NULL_INDEXES),
    pg!("seq_scans", "Count of sequential scans by table descending by order", postgres::SEQ_SCANS),
    pg!("long_running_queries", "All queries longer than five minutes by descending duration", postgres::LONG_RUNNING_QUERIES),
    pg!("records_rank", "All tables and the number of rows in each ordered by number of rows descending", postgres::RECORDS_RANK),
    pg!("bloat", "Table bloat estimated from pg_stats", postgres::BLOAT),
    pg!("vacuum_stats", "Dead rows and whether an automatic vacuum is expected to be triggered", postgres::VACUUM_STATS),
    pg!("extensions", "Available and installed extensions", postgres::EXTENSIONS),
    pg!("connections", "Returns the list of all active database connections", postgres::CONNECTIONS),
    CatalogQuery {
        name: "db_settings",
        description: "Values of selected configuration settings",
        args: &[],
        postgres: Some(postgres::DB_SETTINGS),
        sqlite: Some(sqlite::DB_SETTINGS),
    },
    pg!("ssl_used", "Check if SSL connection is used", postgres::SSL_USED),
    pg!("buffercache_stats", "Calculates percentages of relations buffered in database share buffer (requires pg_buffercache)", postgres::BUFFERCACHE_STATS),
    pg!("buffercache_usage", "Calculate how many blocks from which table are currently cached (requires pg_buffercache)", postgres::BUFFERCACHE_USAGE),
    CatalogQuery {
        name: "tables",
        description: "Tables and views in the database",
        args: &[],
        postgres: None,
        sqlite: Some(sqlite::TABLES),
    },
    CatalogQuery {
        name: "indexes",
        description: "Indexes in the database with their tables",
        args: &[],
        postgres: None,
        sqlite: Some(sqlite::INDEXES),
    },
    CatalogQuery {
        name: "table_schema",
        description: "Columns of a table with their types, nullability and defaults",
        args: &[TABLE_NAME_ARG],
        postgres: Some(postgres::TABLE_SCHEMA),
        sqlite: Some(sqlite::TABLE_SCHEMA),
    },
    CatalogQuery {
        name: "table_foreign_keys",
        description: "Foreign key constraints defined on a table",
        args: &[TABLE_NAME_ARG],
        postgres: Some(postgres::TABLE_FOREIGN_KEYS),
        sqlite: Some(sqlite::TABLE_FOREIGN_KEYS),
    },
    CatalogQuery {
        name: "table_index_info",
        description: "Indexes defined on a table",
        args: &[TABLE_NAME_ARG],
        postgres: Some(postgres::TABLE_INDEX_INFO),
        sqlite: Some(sqlite::TABLE_INDEX_INFO),
    },
    pg!("add_extensions", "Install the extensions needed by the diagnostics", postgres::ADD_EXTENSIONS),
    pg!("pg_stat_statements_reset", "Reset statistics gathered by pg_stat_statements", postgres::PG_STAT_STATEMENTS_RESET),
    CatalogQuery {
        name: "kill_pid",
        description: "Kill a database process by its pid",
        args: &[PID_ARG],
        postgres: Some(postgres::KILL_PID),
        sqlite: None,
    },
    pg!("kill_all", "Kill all the active database connections", postgres::KILL_ALL),
];

/// Read-only view over the static catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryCatalog;

impl QueryCatalog {
    /// All entries with SQL for `db_type`, in catalog order. Includes skipped entries.
    pub fn list_queries(db_type: DatabaseType) -> Vec<&'static CatalogQuery> {
        CATALOG.iter().filter(|q| q.supports(db_type)).collect()
    }

    pub fn get(name: &str) -> Option<&'static CatalogQuery> {
        CATALOG.iter().find(|q| q.name == name)
    }

    /// Run a catalog entry by name through the sandbox.
    pub async fn run(
        executor: &SandboxedExecutor,
        pool: &DbPool,
        name: &str,
        args: &ToolArguments,
    ) -> DbResult<QueryRows> {
        let query = Self::get(name).ok_or_else(|| DbError::tool_not_found(name))?;
        Self::run_query(executor, pool, query, args).await
    }

    pub async fn run_query(
        executor: &SandboxedExecutor,
        pool: &DbPool,
        query: &CatalogQuery,
        args: &ToolArguments,
    ) -> DbResult<QueryRows> {
        let db_type = pool.db_type();
        let sql = query.sql_for(db_type).ok_or_else(|| {
            DbError::invalid_input(format!(
                "Query '{}' is not available for {}",
                query.name, db_type
            ))
        })?;
        let binds = Self::bind_args(query, db_type, args)?;
        executor.execute_with_args(pool, sql, &binds).await
    }

    /// Validate the arguments of `query` and turn them into positional binds.
    pub fn bind_args(
        query: &CatalogQuery,
        db_type: DatabaseType,
        args: &ToolArguments,
    ) -> DbResult<Vec<Option<String>>> {
        let mut binds = Vec::with_capacity(query.args.len() * 2);
        for arg in query.args {
            let value = match args.get(arg.name).map(str::trim) {
                Some(v) if !v.is_empty() => Some(v),
                _ if arg.required => {
                    return Err(DbError::invalid_input(format!(
                        "Argument '{}' is required",
                        arg.name
                    )));
                }
                _ => None,
            };

            match arg.kind {
                ArgKind::Identifier => {
                    let ident = value.map(validate_identifier).transpose()?;
                    binds.extend(identifier_binds(db_type, ident.as_ref()));
                }
                ArgKind::Integer => {
                    let number = value
                        .map(|v| {
                            v.parse::<i64>().map_err(|_| {
                                DbError::invalid_input(format!(
                                    "Argument '{}' must be an integer",
                                    arg.name
                                ))
                            })
                        })
                        .transpose()?;
                    binds.push(number.map(|n| n.to_string()));
                }
            }
        }
        Ok(binds)
    }
}

/// Positional binds for an optional identifier: (name, schema).
///
/// SQLite pragma functions need a schema, so an unqualified name binds `main`.
pub fn identifier_binds(
    db_type: DatabaseType,
    ident: Option<&Identifier>,
) -> Vec<Option<String>> {
    match (db_type, ident) {
        (_, None) => vec![None, None],
        (DatabaseType::PostgreSQL, Some(ident)) => ident.bind_values(),
        (DatabaseType::SQLite, Some(ident)) => vec![
            Some(ident.name.clone()),
            Some(ident.schema.clone().unwrap_or_else(|| "main".to_string())),
        ],
    }
}

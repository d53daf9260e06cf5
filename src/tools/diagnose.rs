//! Database health check.
//!
//! Each check is one sandboxed query plus a verdict function. A failing query
//! turns into a failed check rather than failing the tool.

use crate::catalog::{postgres, sqlite};
use crate::db::{DbPool, SandboxedExecutor};
use crate::models::{DatabaseType, QueryRows, Row};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

pub const TOOL_NAME: &str = "diagnose";
pub const DESCRIPTION: &str = "Performs a health check of the database";

/// Cache hit ratio below which a warning is raised.
pub const MIN_CACHE_HIT_RATIO: f64 = 0.985;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub check: String,
    pub ok: bool,
    pub message: String,
}

struct HealthCheck {
    name: &'static str,
    sql: &'static str,
    evaluate: fn(&QueryRows) -> (bool, String),
}

const TABLE_HIT_RATIO: &str = r#"
SELECT sum(heap_blks_hit)::float8 / nullif(sum(heap_blks_hit) + sum(heap_blks_read), 0)::float8 AS ratio
FROM pg_statio_user_tables
"#;

const INDEX_HIT_RATIO: &str = r#"
SELECT sum(idx_blks_hit)::float8 / nullif(sum(idx_blks_hit) + sum(idx_blks_read), 0)::float8 AS ratio
FROM pg_statio_user_indexes
"#;

const UNUSED_INDEX_COUNT: &str = r#"
SELECT count(*)::int8 AS count
FROM pg_stat_user_indexes ui
JOIN pg_index i ON ui.indexrelid = i.indexrelid
WHERE NOT i.indisunique
  AND ui.idx_scan < 50
  AND pg_relation_size(i.indexrelid) > 1024 * 1024
"#;

const DUPLICATE_INDEX_COUNT: &str = r#"
SELECT count(*)::int8 AS count
FROM (
    SELECT 1
    FROM pg_index
    GROUP BY indrelid::text || E'\n' || indclass::text || E'\n' || indkey::text || E'\n'
        || coalesce(indexprs::text, '') || E'\n' || coalesce(indpred::text, '')
    HAVING count(*) > 1
) duplicates
"#;

const STAT_STATEMENTS_INSTALLED: &str = r#"
SELECT count(*)::int8 AS count FROM pg_extension WHERE extname = 'pg_stat_statements'
"#;

const POSTGRES_CHECKS: &[HealthCheck] = &[
    HealthCheck {
        name: "table_cache_hit",
        sql: TABLE_HIT_RATIO,
        evaluate: |rows| hit_ratio("Table", rows),
    },
    HealthCheck {
        name: "index_cache_hit",
        sql: INDEX_HIT_RATIO,
        evaluate: |rows| hit_ratio("Index", rows),
    },
    HealthCheck {
        name: "ssl_used",
        sql: postgres::SSL_USED,
        evaluate: |rows| match first_value(rows, "ssl_is_used").and_then(JsonValue::as_bool) {
            Some(true) => (true, "Database client is using a secure SSL connection".into()),
            _ => (false, "Database client is using an unencrypted connection".into()),
        },
    },
    HealthCheck {
        name: "unused_indexes",
        sql: UNUSED_INDEX_COUNT,
        evaluate: |rows| match count(rows) {
            0 => (true, "No unused indexes detected".into()),
            n => (
                false,
                format!("{} unused indexes over 1 MB (see unused_indexes)", n),
            ),
        },
    },
    HealthCheck {
        name: "duplicate_indexes",
        sql: DUPLICATE_INDEX_COUNT,
        evaluate: |rows| match count(rows) {
            0 => (true, "No duplicate indexes detected".into()),
            n => (
                false,
                format!("{} sets of duplicate indexes (see duplicate_indexes)", n),
            ),
        },
    },
    HealthCheck {
        name: "pg_stat_statements",
        sql: STAT_STATEMENTS_INSTALLED,
        evaluate: |rows| match count(rows) {
            0 => (
                false,
                "pg_stat_statements is not installed; outliers and calls will fail".into(),
            ),
            _ => (true, "pg_stat_statements is installed".into()),
        },
    },
];

const SQLITE_CHECKS: &[HealthCheck] = &[
    HealthCheck {
        name: "integrity_check",
        sql: sqlite::INTEGRITY_CHECK,
        evaluate: |rows| {
            match first_value(rows, "integrity_check").and_then(JsonValue::as_str) {
                Some("ok") => (true, "Integrity check passed".into()),
                Some(problem) => (false, format!("Integrity check failed: {}", problem)),
                None => (false, "Integrity check returned no result".into()),
            }
        },
    },
    HealthCheck {
        name: "foreign_key_check",
        sql: sqlite::FOREIGN_KEY_CHECK,
        evaluate: |rows| match rows.row_count() {
            0 => (true, "No foreign key violations".into()),
            n => (false, format!("{} rows violate foreign key constraints", n)),
        },
    },
];

fn checks_for(db_type: DatabaseType) -> &'static [HealthCheck] {
    match db_type {
        DatabaseType::PostgreSQL => POSTGRES_CHECKS,
        DatabaseType::SQLite => SQLITE_CHECKS,
    }
}

/// Run every check for the pool's database, sequentially.
pub async fn run(executor: &SandboxedExecutor, pool: &DbPool) -> Vec<CheckResult> {
    let mut results = Vec::new();
    for check in checks_for(pool.db_type()) {
        let (ok, message) = match executor.execute(pool, check.sql).await {
            Ok(rows) => (check.evaluate)(&rows),
            Err(e) => {
                warn!(check = check.name, error = %e, "Health check query failed");
                (false, format!("Check could not run: {}", e))
            }
        };
        debug!(check = check.name, ok, "Health check finished");
        results.push(CheckResult {
            check: check.name.to_string(),
            ok,
            message,
        });
    }
    results
}

/// Shape check results as rows so they format like every other tool.
pub fn into_rows(results: Vec<CheckResult>, execution_time_ms: u64) -> QueryRows {
    let rows = results
        .into_iter()
        .map(|r| {
            let mut row = Row::new();
            row.insert("check".into(), JsonValue::String(r.check));
            row.insert("ok".into(), JsonValue::Bool(r.ok));
            row.insert("message".into(), JsonValue::String(r.message));
            row
        })
        .collect();
    QueryRows {
        columns: vec!["check".into(), "ok".into(), "message".into()],
        rows,
        execution_time_ms,
    }
}

fn first_value<'a>(rows: &'a QueryRows, column: &str) -> Option<&'a JsonValue> {
    rows.rows.first().and_then(|row| row.get(column))
}

fn count(rows: &QueryRows) -> i64 {
    first_value(rows, "count")
        .and_then(JsonValue::as_i64)
        .unwrap_or(0)
}

fn hit_ratio(kind: &str, rows: &QueryRows) -> (bool, String) {
    match first_value(rows, "ratio").and_then(JsonValue::as_f64) {
        None => (true, format!("{} cache hit ratio: no reads recorded yet", kind)),
        Some(ratio) if ratio >= MIN_CACHE_HIT_RATIO => {
            (true, format!("{} cache hit ratio is correct: {:.5}", kind, ratio))
        }
        Some(ratio) => (
            false,
            format!(
                "{} cache hit ratio is too low: {:.5} (expected at least {})",
                kind, ratio, MIN_CACHE_HIT_RATIO
            ),
        ),
    }
}

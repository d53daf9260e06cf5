//! Integration tests for the rolled-back execution sandbox on SQLite.

mod common;

use pg_diag_mcp::db::{DbPool, SandboxedExecutor};
use pg_diag_mcp::error::DbError;
use pg_diag_mcp::models::DatabaseType;
use pg_diag_mcp::validation::{Denylist, QueryValidator, ReasonCode};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

async fn users_checksum(pool: &DbPool) -> String {
    let DbPool::SQLite(p) = pool else {
        panic!("sqlite pool expected");
    };
    sqlx::query_scalar(
        "SELECT group_concat(id || ':' || name || ':' || coalesce(email, '-'), ',') \
         FROM (SELECT * FROM users ORDER BY id)",
    )
    .fetch_one(p)
    .await
    .unwrap()
}

fn executor() -> SandboxedExecutor {
    SandboxedExecutor::new(Duration::from_secs(5))
}

#[tokio::test]
async fn test_select_returns_rows_and_leaves_table_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let pool = common::sqlite_pool(&dir).await;
    let before = users_checksum(&pool).await;

    let validator = QueryValidator::for_database(DatabaseType::SQLite, Denylist::base());
    let query = validator
        .validate("SELECT id, name FROM users ORDER BY id")
        .into_result()
        .unwrap();

    let first = executor()
        .execute_transformed(&pool, &query, str::to_string)
        .await
        .unwrap();
    let second = executor()
        .execute_transformed(&pool, &query, str::to_string)
        .await
        .unwrap();

    assert_eq!(first.columns, vec!["id", "name"]);
    assert_eq!(first.row_count(), 2);
    assert_eq!(first.rows, second.rows);
    assert_eq!(first.rows[0]["name"], "alice");
    assert_eq!(users_checksum(&pool).await, before);
}

#[tokio::test]
async fn test_write_inside_sandbox_is_rolled_back() {
    let dir = tempfile::tempdir().unwrap();
    let pool = common::sqlite_pool(&dir).await;
    let before = common::count_rows(&pool, "users").await;

    // The executor itself does not validate; the transaction still rolls back.
    executor()
        .execute(&pool, "INSERT INTO users (id, name) VALUES (99, 'mallory')")
        .await
        .unwrap();
    executor()
        .execute(&pool, "DELETE FROM posts")
        .await
        .unwrap();

    assert_eq!(common::count_rows(&pool, "users").await, before);
    assert_eq!(common::count_rows(&pool, "posts").await, 1);
}

#[tokio::test]
async fn test_database_error_leaves_pool_usable() {
    let dir = tempfile::tempdir().unwrap();
    let pool = common::sqlite_pool(&dir).await;

    let err = executor()
        .execute(&pool, "SELECT * FROM no_such_table")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Database { .. }), "{:?}", err);

    // The single pooled connection must have been returned without an open transaction.
    let rows = executor()
        .execute(&pool, "SELECT count(*) AS n FROM users")
        .await
        .unwrap();
    assert_eq!(rows.rows[0]["n"], 2);
}

#[tokio::test]
async fn test_bound_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let pool = common::sqlite_pool(&dir).await;

    let rows = executor()
        .execute_with_args(
            &pool,
            "SELECT name FROM users WHERE name = ?1",
            &[Some("bob".to_string())],
        )
        .await
        .unwrap();
    assert_eq!(rows.row_count(), 1);
    assert_eq!(rows.rows[0]["name"], "bob");

    let rows = executor()
        .execute_with_args(
            &pool,
            "SELECT name FROM users WHERE name = ?1",
            &[Some("x' OR '1'='1".to_string())],
        )
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_explain_prefix_is_applied_after_validation() {
    let dir = tempfile::tempdir().unwrap();
    let pool = common::sqlite_pool(&dir).await;
    let validator = QueryValidator::for_database(DatabaseType::SQLite, Denylist::for_explain());
    let query = validator
        .validate("SELECT * FROM users WHERE email = 'a'")
        .into_result()
        .unwrap();

    let plan = executor()
        .execute_transformed(&pool, &query, |q| format!("EXPLAIN QUERY PLAN {}", q))
        .await
        .unwrap();
    assert!(plan.columns.contains(&"detail".to_string()));
    assert!(!plan.is_empty());
}

/// Writes one row per 100k steps of an unbounded recursive CTE, so it only
/// ends when interrupted.
const ENDLESS_INSERT: &str = "INSERT INTO users (id, name) \
     WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
     SELECT x + 100, 'bulk' FROM c WHERE x % 100000 = 0";

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_multiple_statements_never_reach_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let pool = common::sqlite_pool(&dir).await;

    let err = executor()
        .execute(
            &pool,
            "COMMIT; DELETE FROM posts; CREATE TABLE escaped(id INTEGER); SELECT 1",
        )
        .await
        .unwrap_err();
    assert_eq!(err.reason(), Some(ReasonCode::MultipleStatements), "{:?}", err);

    let err = executor()
        .execute_with_args(
            &pool,
            "SELECT name FROM users WHERE name = ?1; DELETE FROM users",
            &[Some("bob".to_string())],
        )
        .await
        .unwrap_err();
    assert_eq!(err.reason(), Some(ReasonCode::MultipleStatements));

    assert_eq!(common::count_rows(&pool, "posts").await, 1);
    assert_eq!(common::count_rows(&pool, "users").await, 2);
    let DbPool::SQLite(p) = &pool else {
        panic!("sqlite pool expected");
    };
    let escaped: i64 =
        sqlx::query_scalar("SELECT count(*) FROM sqlite_master WHERE name = 'escaped'")
            .fetch_one(p)
            .await
            .unwrap();
    assert_eq!(escaped, 0);
}

#[tokio::test]
async fn test_timeout_interrupts_running_statement() {
    let dir = tempfile::tempdir().unwrap();
    let pool = common::sqlite_pool(&dir).await;
    let executor = SandboxedExecutor::new(Duration::from_secs(1));

    let start = Instant::now();
    let err = executor.execute(&pool, ENDLESS_INSERT).await.unwrap_err();
    assert!(matches!(err, DbError::Timeout { .. }), "{:?}", err);

    // The single connection is free again once the statement is interrupted.
    let rows = executor
        .execute(&pool, "SELECT count(*) AS n FROM users")
        .await
        .unwrap();
    assert_eq!(rows.rows[0]["n"], 2);
    assert!(start.elapsed() < Duration::from_secs(10), "{:?}", start.elapsed());
    assert_eq!(common::count_rows(&pool, "users").await, 2);
}

#[tokio::test]
async fn test_dropped_call_leaves_no_open_transaction() {
    let dir = tempfile::tempdir().unwrap();
    let pool = common::sqlite_pool(&dir).await;
    let executor = SandboxedExecutor::new(Duration::from_secs(1));

    let dropped = tokio::time::timeout(
        Duration::from_millis(200),
        executor.execute(&pool, ENDLESS_INSERT),
    )
    .await;
    assert!(dropped.is_err(), "the call should still have been running");

    // Same connection (the pool holds one): an open transaction would expose
    // the uncommitted rows here.
    let rows = executor
        .execute(&pool, "SELECT count(*) AS n FROM users")
        .await
        .unwrap();
    assert_eq!(rows.rows[0]["n"], 2);
    assert_eq!(common::count_rows(&pool, "users").await, 2);
}

#[tokio::test]
async fn test_rollback_failure_is_logged_and_result_kept() {
    let dir = tempfile::tempdir().unwrap();
    let pool = common::sqlite_pool(&dir).await;

    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    // COMMIT ends the sandbox transaction, so the closing ROLLBACK fails.
    let rows = executor().execute(&pool, "COMMIT").await.unwrap();
    assert!(rows.is_empty());
    assert!(logs.contents().contains("Rollback failed"), "{}", logs.contents());

    // The broken connection was closed; the pool opens a fresh one.
    let rows = executor()
        .execute(&pool, "SELECT count(*) AS n FROM users")
        .await
        .unwrap();
    assert_eq!(rows.rows[0]["n"], 2);
    executor()
        .execute(&pool, "DELETE FROM posts")
        .await
        .unwrap();
    assert_eq!(common::count_rows(&pool, "posts").await, 1);
}

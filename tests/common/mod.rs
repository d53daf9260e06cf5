//! Shared fixtures: a temp-file SQLite database with a small schema.

#![allow(dead_code)]

use pg_diag_mcp::config::PoolOptions;
use pg_diag_mcp::db::{DbPool, SandboxedExecutor};
use pg_diag_mcp::models::ConnectionConfig;
use pg_diag_mcp::tools::{ExplainFlags, ToolDispatcher, ToolRegistry};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const SCHEMA: &[&str] = &[
    "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT)",
    "CREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL REFERENCES users(id), title TEXT)",
    "CREATE INDEX idx_users_email ON users(email)",
    "INSERT INTO users (id, name, email) VALUES (1, 'alice', 'alice@example.com'), (2, 'bob', NULL)",
    "INSERT INTO posts (id, user_id, title) VALUES (1, 1, 'hello')",
];

/// A SQLite pool over a fresh file in `dir`, seeded with [`SCHEMA`].
pub async fn sqlite_pool(dir: &TempDir) -> DbPool {
    let path = dir.path().join("diag.db");
    let config = ConnectionConfig::new(
        format!("sqlite://{}?mode=rwc", path.display()),
        Some("diag".to_string()),
        PoolOptions::default(),
    )
    .expect("valid sqlite config");
    let pool = DbPool::connect(&config, Duration::from_secs(5))
        .await
        .expect("connect to sqlite");

    if let DbPool::SQLite(p) = &pool {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(p)
                .await
                .expect("seed schema");
        }
    }
    pool
}

pub async fn sqlite_dispatcher(dir: &TempDir, flags: ExplainFlags) -> ToolDispatcher {
    let pool = sqlite_pool(dir).await;
    let registry = ToolRegistry::standard(pool.db_type(), flags).expect("registry builds");
    ToolDispatcher::new(
        Arc::new(registry),
        pool,
        SandboxedExecutor::new(Duration::from_secs(5)),
    )
}

/// Row count of `table`, read outside the sandbox.
pub async fn count_rows(pool: &DbPool, table: &str) -> i64 {
    let sql = format!("SELECT count(*) FROM {}", table);
    match pool {
        DbPool::SQLite(p) => sqlx::query_scalar(&sql).fetch_one(p).await,
        DbPool::Postgres(p) => sqlx::query_scalar(&sql).fetch_one(p).await,
    }
    .expect("count rows")
}

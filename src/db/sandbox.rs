//! Sandboxed execution: every statement runs inside a transaction that is
//! always rolled back.
//!
//! The executor accepts exactly one statement per call and refuses text that
//! holds more, so nothing can end the transaction early and run outside it.
//! The transaction lives on a connection acquired for the call. Whatever
//! happens afterwards (success, database error, timeout) the executor issues
//! `ROLLBACK` before returning; if that fails the connection is closed instead
//! of going back to the pool. If the call future itself is dropped, the
//! `sqlx::Transaction` guard rolls back on drop.

use crate::db::pool::DbPool;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryRows};
use crate::validation::statement::dialect_for;
use crate::validation::{NormalizedQuery, ReasonCode};
use sqlparser::tokenizer::{Token, Tokenizer};
use sqlx::pool::PoolConnection;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// SQLSTATE raised by PostgreSQL when `statement_timeout` fires.
const QUERY_CANCELED: &str = "57014";

/// Runs SQL in always-rolled-back transactions.
#[derive(Debug, Clone, Copy)]
pub struct SandboxedExecutor {
    query_timeout: Duration,
}

impl SandboxedExecutor {
    pub fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Execute one statement and roll back.
    pub async fn execute(&self, pool: &DbPool, sql: &str) -> DbResult<QueryRows> {
        self.execute_with_args(pool, sql, &[]).await
    }

    /// Execute one statement with positional text arguments (`None` binds
    /// NULL) and roll back.
    pub async fn execute_with_args(
        &self,
        pool: &DbPool,
        sql: &str,
        args: &[Option<String>],
    ) -> DbResult<QueryRows> {
        ensure_single_statement(pool.db_type(), sql)?;

        let start = Instant::now();
        debug!(
            sql = %sql,
            args = args.len(),
            timeout_secs = self.query_timeout.as_secs(),
            "Executing in rolled-back transaction"
        );

        let (columns, rows) = match pool {
            DbPool::Postgres(p) => postgres::run(p, sql, args, self.query_timeout).await,
            DbPool::SQLite(p) => sqlite::run(p, sql, args, self.query_timeout).await,
        }
        .map_err(|e| self.classify_error(e))?;

        let execution_time_ms = start.elapsed().as_millis() as u64;
        info!(
            rows = rows.len(),
            execution_time_ms, "Sandboxed statement finished"
        );

        Ok(QueryRows {
            columns,
            rows,
            execution_time_ms,
        })
    }

    /// Apply `transform` to a validated query and execute the result.
    ///
    /// The transform only decorates the statement (an EXPLAIN prefix). Its
    /// output is not validated again, but it is still held to one statement.
    pub async fn execute_transformed<F>(
        &self,
        pool: &DbPool,
        query: &NormalizedQuery,
        transform: F,
    ) -> DbResult<QueryRows>
    where
        F: FnOnce(&str) -> String,
    {
        let sql = transform(query.as_str());
        self.execute(pool, &sql).await
    }

    fn classify_error(&self, err: DbError) -> DbError {
        match &err {
            DbError::Database {
                sql_state: Some(state),
                ..
            } if state == QUERY_CANCELED => self.timeout_error(),
            _ => err,
        }
    }

    fn timeout_error(&self) -> DbError {
        DbError::timeout("query execution", self.query_timeout.as_secs() as u32)
    }
}

/// Reject text holding more than one statement. Whitespace and comments may
/// follow the final `;`.
fn ensure_single_statement(db_type: DatabaseType, sql: &str) -> DbResult<()> {
    let dialect = dialect_for(db_type);
    let tokens = Tokenizer::new(dialect.as_ref(), sql)
        .tokenize()
        .map_err(|e| DbError::rejected(ReasonCode::SyntaxError, e.to_string()))?;

    let mut terminated = false;
    for token in tokens {
        match token {
            Token::Whitespace(_) | Token::EOF => {}
            Token::SemiColon => terminated = true,
            _ if terminated => {
                return Err(DbError::rejected(
                    ReasonCode::MultipleStatements,
                    "The sandbox executes exactly one statement per call",
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Roll back, logging (never returning) a rollback failure. Returns whether
/// the rollback succeeded.
async fn rollback<DB: sqlx::Database>(tx: sqlx::Transaction<'_, DB>) -> bool {
    match tx.rollback().await {
        Ok(()) => {
            debug!("Transaction rolled back");
            true
        }
        Err(e) => {
            warn!(error = %e, "Rollback failed; closing the connection");
            false
        }
    }
}

/// Acquire a connection that is not inside a transaction.
///
/// A call dropped mid-statement leaves its rollback to the connection; if
/// that rollback failed the connection still counts as in a transaction and
/// is replaced.
async fn acquire_clean<DB: sqlx::Database>(
    pool: &sqlx::Pool<DB>,
) -> DbResult<PoolConnection<DB>> {
    let conn = pool.acquire().await?;
    if !sqlx::Connection::is_in_transaction(&*conn) {
        return Ok(conn);
    }
    warn!("Pooled connection is still inside a transaction; replacing it");
    discard(conn).await;

    let conn = pool.acquire().await?;
    if sqlx::Connection::is_in_transaction(&*conn) {
        return Err(DbError::internal(
            "No pooled connection outside a transaction is available",
        ));
    }
    Ok(conn)
}

/// Take a connection out of the pool and close it.
async fn discard<DB: sqlx::Database>(conn: PoolConnection<DB>) {
    if let Err(e) = sqlx::Connection::close(conn.detach()).await {
        debug!(error = %e, "Closing discarded connection failed");
    }
}

fn split_rows<R: RowToJson>(rows: Vec<R>) -> (Vec<String>, Vec<crate::models::Row>) {
    let columns = rows.first().map(|r| r.column_names()).unwrap_or_default();
    let rows = rows.iter().map(|r| r.to_json_map()).collect();
    (columns, rows)
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Both modules follow the same sequence: acquire, begin, (guard), statement,
// rollback (or discard).

mod postgres {
    use super::*;
    use sqlx::postgres::PgRow;
    use sqlx::{Executor, PgConnection, PgPool};

    pub async fn run(
        pool: &PgPool,
        sql: &str,
        args: &[Option<String>],
        query_timeout: Duration,
    ) -> DbResult<(Vec<String>, Vec<crate::models::Row>)> {
        let mut conn = acquire_clean(pool).await?;
        let mut tx = sqlx::Connection::begin(&mut *conn).await?;

        let outcome = timeout(query_timeout, async {
            // First statement of the transaction, so it applies to all that follow.
            (&mut *tx).execute("SET TRANSACTION READ ONLY").await?;
            let set_timeout = format!(
                "SET LOCAL statement_timeout = {}",
                query_timeout.as_millis()
            );
            (&mut *tx).execute(set_timeout.as_str()).await?;
            fetch(&mut tx, sql, args).await
        })
        .await;

        if !rollback(tx).await {
            discard(conn).await;
        }

        match outcome {
            Ok(Ok(rows)) => Ok(split_rows(rows)),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(DbError::timeout(
                "query execution",
                query_timeout.as_secs() as u32,
            )),
        }
    }

    async fn fetch(
        conn: &mut PgConnection,
        sql: &str,
        args: &[Option<String>],
    ) -> Result<Vec<PgRow>, sqlx::Error> {
        // Extended protocol: the server refuses more than one command per
        // statement. Unnamed, so ad-hoc text never lands in the statement cache.
        let mut query = sqlx::query(sql).persistent(false);
        for arg in args {
            query = query.bind(arg.as_deref());
        }
        query.fetch_all(conn).await
    }
}

mod sqlite {
    use super::*;
    use sqlx::sqlite::SqliteRow;
    use sqlx::{SqliteConnection, SqlitePool};

    /// Virtual machine instructions between deadline checks.
    const PROGRESS_INTERVAL: i32 = 1000;

    pub async fn run(
        pool: &SqlitePool,
        sql: &str,
        args: &[Option<String>],
        query_timeout: Duration,
    ) -> DbResult<(Vec<String>, Vec<crate::models::Row>)> {
        let mut conn = acquire_clean(pool).await?;

        // The statement runs on the connection's worker thread and outlives a
        // fired `tokio` timeout; the progress handler interrupts it at the
        // deadline so the rollback below does not queue behind it.
        let deadline = Instant::now() + query_timeout;
        conn.lock_handle()
            .await?
            .set_progress_handler(PROGRESS_INTERVAL, move || Instant::now() < deadline);

        let mut tx = sqlx::Connection::begin(&mut *conn).await?;
        let outcome = timeout(query_timeout, fetch(&mut tx, sql, args)).await;
        let rolled_back = rollback(tx).await;

        if let Ok(mut handle) = conn.lock_handle().await {
            handle.remove_progress_handler();
        }
        if !rolled_back {
            discard(conn).await;
        }

        match outcome {
            Ok(Ok(rows)) => Ok(split_rows(rows)),
            // SQLITE_INTERRUPT from the progress handler
            Ok(Err(_)) if Instant::now() >= deadline => Err(DbError::timeout(
                "query execution",
                query_timeout.as_secs() as u32,
            )),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(DbError::timeout(
                "query execution",
                query_timeout.as_secs() as u32,
            )),
        }
    }

    async fn fetch(
        conn: &mut SqliteConnection,
        sql: &str,
        args: &[Option<String>],
    ) -> Result<Vec<SqliteRow>, sqlx::Error> {
        let mut query = sqlx::query(sql).persistent(false);
        for arg in args {
            query = query.bind(arg.as_deref());
        }
        query.fetch_all(conn).await
    }
}

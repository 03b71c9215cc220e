//! Read-only query execution against the target database.
//!
//! [`SqliteExecutor`] implements the core [`QueryExecutor`] trait. Each
//! statement is wrapped as `SELECT * FROM (<sql>) LIMIT cap + 1`, so the
//! database never produces more than one row past the cap and truncation
//! can be detected without counting.
//!
//! The timeout is enforced inside SQLite with a progress handler, so a
//! runaway statement is interrupted and its pooled connection comes back
//! idle instead of staying busy after the caller gives up.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Row, SqlitePool, TypeInfo, ValueRef};
use tracing::{debug, warn};

use sql_copilot_core::error::ExecutionError;
use sql_copilot_core::synthesis::{QueryExecutor, QueryRows};

pub struct SqliteExecutor {
    pool: SqlitePool,
}

impl SqliteExecutor {
    /// `pool` should be opened read-only (see [`crate::db::connect_target`]).
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    async fn execute(
        &self,
        sql: &str,
        timeout: Duration,
        row_cap: usize,
    ) -> Result<QueryRows, ExecutionError> {
        let wrapped = wrap_with_limit(sql, row_cap);
        debug!(sql = %wrapped, "executing");

        let deadline = Instant::now() + timeout;
        let mut conn = tokio::time::timeout(timeout, self.pool.acquire())
            .await
            .map_err(|_| ExecutionError::Timeout(timeout))?
            .map_err(|e| ExecutionError::Runtime(describe_error(&e)))?;
        conn.lock_handle()
            .await
            .map_err(|e| ExecutionError::Runtime(describe_error(&e)))?
            .set_progress_handler(PROGRESS_INTERVAL, move || Instant::now() < deadline);

        let fetch = sqlx::query(&wrapped).fetch_all(&mut *conn);
        let result = tokio::time::timeout(timeout + INTERRUPT_GRACE, fetch).await;

        let rows = match result {
            Err(_) => {
                // The statement never yielded to the handler; do not hand the
                // connection back to the pool.
                warn!(?timeout, "statement ignored interrupt, closing connection");
                let _ = conn.detach().close_hard().await;
                return Err(ExecutionError::Timeout(timeout));
            }
            Ok(Err(_)) if Instant::now() >= deadline => {
                clear_progress_handler(&mut conn).await;
                return Err(ExecutionError::Timeout(timeout));
            }
            Ok(Err(e)) => {
                clear_progress_handler(&mut conn).await;
                return Err(ExecutionError::Runtime(describe_error(&e)));
            }
            Ok(Ok(rows)) => rows,
        };
        clear_progress_handler(&mut conn).await;

        Ok(to_query_rows(rows, row_cap))
    }
}

/// SQLite virtual-machine steps between deadline checks.
const PROGRESS_INTERVAL: i32 = 1_000;

/// How long past the deadline to wait for an interrupted statement to unwind.
const INTERRUPT_GRACE: Duration = Duration::from_secs(2);

async fn clear_progress_handler(conn: &mut SqliteConnection) {
    if let Ok(mut handle) = conn.lock_handle().await {
        handle.remove_progress_handler();
    }
}

pub(crate) fn wrap_with_limit(sql: &str, row_cap: usize) -> String {
    let trimmed = sql.trim().trim_end_matches(';').trim_end();
    format!("SELECT * FROM (\n{}\n) LIMIT {}", trimmed, row_cap.saturating_add(1))
}

fn describe_error(e: &sqlx::Error) -> String {
    match e {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    }
}

fn to_query_rows(rows: Vec<SqliteRow>, row_cap: usize) -> QueryRows {
    let columns: Vec<String> = rows
        .first()
        .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let truncated = rows.len() > row_cap;
    let values: Vec<Vec<Value>> = rows
        .iter()
        .take(row_cap)
        .map(|row| (0..row.len()).map(|i| decode_value(row, i)).collect())
        .collect();

    QueryRows {
        columns,
        rows: values,
        truncated,
    }
}

/// Decode by the value's storage class rather than the declared column type.
fn decode_value(row: &SqliteRow, idx: usize) -> Value {
    let raw = match row.try_get_raw(idx) {
        Ok(raw) => raw,
        Err(_) => return Value::Null,
    };
    if raw.is_null() {
        return Value::Null;
    }
    let storage = raw.type_info().name().to_ascii_uppercase();

    match storage.as_str() {
        "INTEGER" | "BOOLEAN" => row
            .try_get::<i64, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "REAL" | "NUMERIC" => row
            .try_get::<f64, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(idx)
            .map(|b| Value::String(format!("<blob {} bytes>", b.len())))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(idx)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::TempDir;

    async fn executor(dir: &TempDir) -> SqliteExecutor {
        let path = dir.path().join("target.db");
        let pool = db::connect_writable(&path).await.unwrap();
        for stmt in [
            "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT, price REAL, data BLOB)",
            "INSERT INTO items (name, price, data) VALUES ('pen', 1.5, x'0102'), ('ink', NULL, NULL), ('pad', 3.0, NULL)",
        ] {
            sqlx::query(stmt).execute(&pool).await.unwrap();
        }
        SqliteExecutor::new(pool)
    }

    #[test]
    fn test_wrap_with_limit() {
        assert_eq!(
            wrap_with_limit("SELECT 1;", 10),
            "SELECT * FROM (\nSELECT 1\n) LIMIT 11"
        );
    }

    #[tokio::test]
    async fn test_values_are_decoded() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir).await;
        let rows = exec
            .execute(
                "SELECT id, name, price, data FROM items ORDER BY id",
                Duration::from_secs(5),
                100,
            )
            .await
            .unwrap();
        assert_eq!(rows.columns, vec!["id", "name", "price", "data"]);
        assert_eq!(rows.rows.len(), 3);
        assert!(!rows.truncated);
        assert_eq!(rows.rows[0][0], Value::from(1));
        assert_eq!(rows.rows[0][1], Value::from("pen"));
        assert_eq!(rows.rows[0][2], Value::from(1.5));
        assert_eq!(rows.rows[0][3], Value::from("<blob 2 bytes>"));
        assert_eq!(rows.rows[1][2], Value::Null);
    }

    #[tokio::test]
    async fn test_row_cap_truncates() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir).await;
        let rows = exec
            .execute("SELECT name FROM items", Duration::from_secs(5), 2)
            .await
            .unwrap();
        assert_eq!(rows.rows.len(), 2);
        assert!(rows.truncated);
    }

    const RUNAWAY: &str = "WITH RECURSIVE r(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM r) \
                           SELECT COUNT(*) FROM r";

    #[tokio::test]
    async fn test_timeout_interrupts_statement() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir).await;

        let started = Instant::now();
        let err = exec
            .execute(RUNAWAY, Duration::from_millis(200), 10)
            .await
            .unwrap_err();
        assert_eq!(err, ExecutionError::Timeout(Duration::from_millis(200)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_timed_out_statements_release_connections() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir).await;

        // More runaway statements than the pool has connections.
        for _ in 0..7 {
            let err = exec
                .execute(RUNAWAY, Duration::from_millis(100), 10)
                .await
                .unwrap_err();
            assert!(matches!(err, ExecutionError::Timeout(_)));
        }

        let rows = tokio::time::timeout(
            Duration::from_secs(5),
            exec.execute("SELECT COUNT(*) AS n FROM items", Duration::from_secs(5), 10),
        )
        .await
        .expect("pool exhausted by timed-out statements")
        .unwrap();
        assert_eq!(rows.rows[0][0], Value::from(3));
    }

    #[tokio::test]
    async fn test_runtime_error_carries_message() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir).await;
        let err = exec
            .execute("SELECT nope FROM items", Duration::from_secs(5), 10)
            .await
            .unwrap_err();
        match err {
            ExecutionError::Runtime(msg) => assert!(msg.contains("nope"), "got: {msg}"),
            other => panic!("expected runtime error, got {other:?}"),
        }
    }
}

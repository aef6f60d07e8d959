//! SQLite-backed metrics store

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::metrics::MetricsError;
use crate::metrics::store::{Aggregate, MetricsStore};
use crate::types::MetricSample;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    function_name TEXT NOT NULL,
    duration REAL NOT NULL,
    cpu_percent REAL NOT NULL,
    memory_mb REAL NOT NULL,
    error TEXT,
    timestamp TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS metrics_function_name ON metrics(function_name);";

/// Metrics persisted to a SQLite database, one row per invocation
#[derive(Debug, Clone)]
pub struct SqliteMetricsStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMetricsStore {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MetricsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).ok();
        }

        debug!(path = %path.display(), "opening metrics database");
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, MetricsError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, MetricsError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, MetricsError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| MetricsError::Poisoned)?;
            f(&conn).map_err(MetricsError::from)
        })
        .await
        .map_err(|e| MetricsError::Task(e.to_string()))?
    }
}

#[async_trait]
impl MetricsStore for SqliteMetricsStore {
    async fn insert(&self, sample: &MetricSample) -> Result<(), MetricsError> {
        let sample = sample.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO metrics (function_name, duration, cpu_percent, memory_mb, error, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    sample.function_name,
                    sample.duration,
                    sample.cpu_percent,
                    sample.memory_mb,
                    sample.error,
                    sample.timestamp.to_rfc3339(),
                ],
            )
            .map(|_| ())
        })
        .await
    }

    async fn aggregate(&self, function_name: &str) -> Result<Aggregate, MetricsError> {
        let name = function_name.to_owned();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT AVG(duration), COUNT(*) FROM metrics WHERE function_name = ?1",
                    params![name],
                    |row| Ok((row.get::<_, Option<f64>>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()?;

            Ok(match row {
                Some((avg_duration, count)) => Aggregate {
                    avg_duration,
                    count: count.max(0) as u64,
                },
                None => Aggregate::default(),
            })
        })
        .await
    }
}

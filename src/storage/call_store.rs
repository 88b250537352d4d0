use crate::models::{CallFilter, CallRecord, Headers};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use rusqlite::types::{Type, Value};
use rusqlite::{params, Connection, Row};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use super::{change_channel, CallStore};

const DB_FILE_NAME: &str = "http_monitor.sqlite";

const CALL_COLUMNS: &str = "id, request_timestamp, method, url, protocol,
    request_headers, request_content_type, request_body,
    is_request_body_truncated, request_content_length,
    response_timestamp, response_code, response_content_type, response_headers,
    response_body, is_response_body_truncated, response_content_length, error";

/// SQLite-backed call store
pub struct SqliteCallStore {
    db: Arc<Mutex<Connection>>,
    db_path: PathBuf,
    changes: broadcast::Sender<()>,
}

impl SqliteCallStore {
    /// Open (or create) the database inside `base_path`
    pub fn open(base_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = base_path.as_ref();
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating storage directory {:?}", dir))?;
        }
        let db_path = dir.join(DB_FILE_NAME);
        let conn = Connection::open(&db_path)
            .with_context(|| format!("opening database at {:?}", db_path))?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS calls (
                id TEXT PRIMARY KEY,
                request_timestamp INTEGER NOT NULL,
                method TEXT NOT NULL,
                url TEXT NOT NULL,
                protocol TEXT,
                request_headers TEXT NOT NULL,
                request_content_type TEXT,
                request_body BLOB,
                is_request_body_truncated INTEGER NOT NULL DEFAULT 0,
                request_content_length INTEGER NOT NULL DEFAULT 0,
                response_timestamp INTEGER,
                response_code INTEGER,
                response_content_type TEXT,
                response_headers TEXT,
                response_body BLOB,
                is_response_body_truncated INTEGER,
                response_content_length INTEGER,
                error TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_calls_request_timestamp
                ON calls(request_timestamp DESC);
            ",
        )
        .context("creating calls schema")?;

        let changes = change_channel();
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            db_path,
            changes,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run blocking SQLite work off the async runtime
    async fn with_conn<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|e| anyhow!("db mutex poisoned: {}", e))?;
            f(&conn)
        })
        .await?
    }

    fn notify(&self) {
        // No subscribers is fine
        let _ = self.changes.send(());
    }

    fn build_where_clause(filter: &CallFilter) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        let query = filter.search_query.trim();
        if !query.is_empty() {
            clauses.push("instr(LOWER(url), ?) > 0".to_string());
            params.push(Value::from(query.to_ascii_lowercase()));
        }
        if filter.only_errors {
            clauses.push(
                "((error IS NOT NULL AND error != '')
                  OR (response_code IS NOT NULL
                      AND (response_code < 100 OR response_code >= 400)))"
                    .to_string(),
            );
        }

        let clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        (clause, params)
    }
}

#[async_trait]
impl CallStore for SqliteCallStore {
    async fn insert(&self, call: &CallRecord) -> anyhow::Result<()> {
        let call = call.clone();
        let request_headers = serde_json::to_string(&call.request_headers)?;
        let response_headers = call
            .response_headers
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO calls ({})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                             ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                    CALL_COLUMNS
                ),
                params![
                    call.id,
                    call.request_timestamp,
                    call.method,
                    call.url,
                    call.protocol,
                    request_headers,
                    call.request_content_type,
                    call.request_body,
                    call.is_request_body_truncated,
                    call.request_content_length as i64,
                    call.response_timestamp,
                    call.response_code,
                    call.response_content_type,
                    response_headers,
                    call.response_body,
                    call.is_response_body_truncated,
                    call.response_content_length.map(|l| l as i64),
                    call.error,
                ],
            )
            .with_context(|| format!("inserting call {}", call.id))?;
            Ok(())
        })
        .await?;

        self.notify();
        Ok(())
    }

    async fn update(&self, call: &CallRecord) -> anyhow::Result<bool> {
        let call = call.clone();
        let response_headers = call
            .response_headers
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let updated = self
            .with_conn(move |conn| {
                let count = conn
                    .execute(
                        "UPDATE calls SET
                            protocol = ?2,
                            response_timestamp = ?3,
                            response_code = ?4,
                            response_content_type = ?5,
                            response_headers = ?6,
                            response_body = ?7,
                            is_response_body_truncated = ?8,
                            response_content_length = ?9,
                            error = ?10
                         WHERE id = ?1 AND response_code IS NULL AND error IS NULL",
                        params![
                            call.id,
                            call.protocol,
                            call.response_timestamp,
                            call.response_code,
                            call.response_content_type,
                            response_headers,
                            call.response_body,
                            call.is_response_body_truncated,
                            call.response_content_length.map(|l| l as i64),
                            call.error,
                        ],
                    )
                    .with_context(|| format!("updating call {}", call.id))?;
                Ok(count > 0)
            })
            .await?;

        if updated {
            self.notify();
        }
        Ok(updated)
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<CallRecord>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM calls WHERE id = ?", CALL_COLUMNS))?;
            let mut rows = stmt.query(params![id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_call(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn list(&self, filter: &CallFilter) -> anyhow::Result<Vec<CallRecord>> {
        let (clause, params) = Self::build_where_clause(filter);
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM calls {} ORDER BY request_timestamp DESC, rowid DESC",
                CALL_COLUMNS, clause
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(row_to_call(row)?);
            }
            Ok(out)
        })
        .await
    }

    async fn delete_older_than(&self, threshold_ms: i64) -> anyhow::Result<u64> {
        let deleted = self
            .with_conn(move |conn| {
                let count = conn.execute(
                    "DELETE FROM calls WHERE request_timestamp < ?1",
                    params![threshold_ms],
                )?;
                if count > 0 {
                    // Reclaim disk space after deleting rows
                    conn.execute_batch("VACUUM")?;
                }
                Ok(count as u64)
            })
            .await?;

        if deleted > 0 {
            self.notify();
        }
        Ok(deleted)
    }

    async fn delete_all(&self) -> anyhow::Result<u64> {
        let deleted = self
            .with_conn(|conn| {
                let count = conn.execute("DELETE FROM calls", [])?;
                conn.execute_batch("VACUUM")?;
                Ok(count as u64)
            })
            .await?;

        tracing::info!("Cleared {} calls from database", deleted);
        self.notify();
        Ok(deleted)
    }

    async fn count(&self) -> anyhow::Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM calls", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

fn parse_headers(idx: usize, raw: &str) -> rusqlite::Result<Headers> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_call(row: &Row<'_>) -> rusqlite::Result<CallRecord> {
    let request_headers: String = row.get(5)?;
    let response_headers: Option<String> = row.get(13)?;
    let request_content_length: i64 = row.get(9)?;
    let response_content_length: Option<i64> = row.get(16)?;

    Ok(CallRecord {
        id: row.get(0)?,
        request_timestamp: row.get(1)?,
        method: row.get(2)?,
        url: row.get(3)?,
        protocol: row.get(4)?,
        request_headers: parse_headers(5, &request_headers)?,
        request_content_type: row.get(6)?,
        request_body: row.get(7)?,
        is_request_body_truncated: row.get(8)?,
        request_content_length: request_content_length.max(0) as u64,
        response_timestamp: row.get(10)?,
        response_code: row.get(11)?,
        response_content_type: row.get(12)?,
        response_headers: response_headers
            .as_deref()
            .map(|raw| parse_headers(13, raw))
            .transpose()?,
        response_body: row.get(14)?,
        is_response_body_truncated: row.get(15)?,
        response_content_length: response_content_length.map(|l| l.max(0) as u64),
        error: row.get(17)?,
    })
}

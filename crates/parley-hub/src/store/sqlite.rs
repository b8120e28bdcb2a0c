//! SQLite-backed session records and event log.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use parley_core::error::{ParleyError, Result};
use parley_core::event::{Event, EventType};
use parley_core::store::{EventSink, SessionRecord, SessionStore};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        start_time TEXT NOT NULL,
        end_time TEXT,
        updated_at TEXT NOT NULL,
        duration_seconds INTEGER NOT NULL DEFAULT 0,
        message_count INTEGER NOT NULL DEFAULT 0,
        summary TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

    CREATE TABLE IF NOT EXISTS session_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        content TEXT NOT NULL,
        timestamp TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_events_session ON session_events(session_id, timestamp);";

/// SQLite store: one file, no external services.
///
/// Async methods run their statements on the blocking pool.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

fn db_err(e: rusqlite::Error) -> ParleyError {
    ParleyError::StoreUnavailable(format!("SQLite error: {}", e))
}

/// Fixed-width UTC timestamps so text order is time order.
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn lock_conn(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| ParleyError::StoreUnavailable("SQLite connection lock poisoned".into()))
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let end_time: Option<String> = row.get(3)?;
    Ok(SessionRecord {
        session_id: row.get(0)?,
        user_id: row.get(1)?,
        start_time: parse_ts(&row.get::<_, String>(2)?)?,
        end_time: end_time.as_deref().map(parse_ts).transpose()?,
        updated_at: parse_ts(&row.get::<_, String>(4)?)?,
        duration_seconds: row.get(5)?,
        message_count: row.get(6)?,
        summary: row.get(7)?,
    })
}

impl SqliteStore {
    /// Open or create a database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        Self::init(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        lock_conn(&self.conn)
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || f(&*lock_conn(&conn)?))
            .await
            .map_err(|e| ParleyError::StoreUnavailable(format!("SQLite task failed: {}", e)))?
    }

    fn load(conn: &Connection, session_id: &str) -> Result<Option<SessionRecord>> {
        conn.query_row(
            "SELECT session_id, user_id, start_time, end_time, updated_at,
                    duration_seconds, message_count, summary
             FROM sessions WHERE session_id = ?1",
            params![session_id],
            record_from_row,
        )
        .optional()
        .map_err(db_err)
    }

    /// Read-modify-write a session record under the connection lock.
    fn update<F>(conn: &Connection, session_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut SessionRecord),
    {
        let mut record = Self::load(conn, session_id)?
            .ok_or_else(|| ParleyError::StoreUnavailable(format!("no session record: {}", session_id)))?;
        f(&mut record);
        conn.execute(
            "UPDATE sessions SET end_time = ?2, updated_at = ?3, duration_seconds = ?4,
                    message_count = ?5, summary = ?6
             WHERE session_id = ?1",
            params![
                record.session_id,
                record.end_time.map(ts),
                ts(record.updated_at),
                record.duration_seconds,
                record.message_count,
                record.summary,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Session records of one user, newest first.
    pub fn list_sessions(&self, user_id: &str, limit: usize) -> Result<Vec<SessionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT session_id, user_id, start_time, end_time, updated_at,
                        duration_seconds, message_count, summary
                 FROM sessions WHERE user_id = ?1
                 ORDER BY start_time DESC LIMIT ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], record_from_row)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }
}

#[async_trait]
impl EventSink for SqliteStore {
    async fn append(&self, session_id: &str, event_type: EventType, payload: Value) -> Result<()> {
        let session_id = session_id.to_string();
        let timestamp = ts(Utc::now());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO session_events (session_id, event_type, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![session_id, event_type.as_str(), payload.to_string(), timestamp],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn create(&self, user_id: &str, session_id: &str) -> Result<()> {
        let record = SessionRecord::new(user_id, session_id, Utc::now());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sessions (session_id, user_id, start_time, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.session_id,
                    record.user_id,
                    ts(record.start_time),
                    ts(record.updated_at)
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| Self::load(conn, &session_id)).await
    }

    async fn fetch_events(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<Event>> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT session_id, event_type, content, timestamp
                     FROM session_events WHERE session_id = ?1
                     ORDER BY timestamp ASC, id ASC LIMIT ?2",
                )
                .map_err(db_err)?;

            // SQLite treats a negative LIMIT as unbounded.
            let limit = limit.map(|n| n as i64).unwrap_or(-1);
            let rows = stmt
                .query_map(params![session_id, limit], |row| {
                    let event_type: String = row.get(1)?;
                    let content: String = row.get(2)?;
                    Ok((row.get::<_, String>(0)?, event_type, content, row.get::<_, String>(3)?))
                })
                .map_err(db_err)?;

            let mut events = Vec::new();
            for row in rows {
                let (session_id, event_type, content, timestamp) = row.map_err(db_err)?;
                events.push(Event {
                    session_id,
                    event_type: event_type.parse().map_err(ParleyError::StoreUnavailable)?,
                    content: serde_json::from_str(&content)?,
                    timestamp: parse_ts(&timestamp).map_err(db_err)?,
                });
            }
            Ok(events)
        })
        .await
    }

    async fn record_activity(&self, session_id: &str, messages_added: u32) -> Result<()> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            Self::update(conn, &session_id, |r| r.record_activity(messages_added, Utc::now()))
        })
        .await
    }

    async fn update_summary(&self, session_id: &str, summary: &str) -> Result<()> {
        let session_id = session_id.to_string();
        let summary = summary.to_string();
        self.with_conn(move |conn| {
            Self::update(conn, &session_id, |r| r.finish(&summary, Utc::now()))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::event;
    use serde_json::json;

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = SqliteStore::in_memory().unwrap();
        store.create("alice", "s1").await.unwrap();

        let record = store.get("s1").await.unwrap().unwrap();
        assert_eq!(record.user_id, "alice");
        assert_eq!(record.message_count, 0);
        assert!(record.end_time.is_none());

        store.record_activity("s1", 1).await.unwrap();
        store.record_activity("s1", 1).await.unwrap();
        store.update_summary("s1", "Talked about rain.").await.unwrap();

        let record = store.get("s1").await.unwrap().unwrap();
        assert_eq!(record.message_count, 2);
        assert_eq!(record.summary.as_deref(), Some("Talked about rain."));
        assert!(record.end_time.is_some());
        assert!(record.duration_seconds >= 0);
    }

    #[tokio::test]
    async fn test_duplicate_create_fails() {
        let store = SqliteStore::in_memory().unwrap();
        store.create("alice", "s1").await.unwrap();
        let err = store.create("bob", "s1").await.unwrap_err();
        assert!(matches!(err, ParleyError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_activity_on_missing_session_fails() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.record_activity("nope", 1).await.is_err());
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_events_are_ordered_and_scoped() {
        let store = SqliteStore::in_memory().unwrap();
        store.create("u", "a").await.unwrap();
        store.create("u", "b").await.unwrap();

        store
            .append("a", EventType::UserMessage, event::user_message("first"))
            .await
            .unwrap();
        store
            .append("b", EventType::UserMessage, event::user_message("other"))
            .await
            .unwrap();
        store
            .append(
                "a",
                EventType::FunctionCall,
                event::function_call("get_weather", &json!({"location": "Oslo"}), "first"),
            )
            .await
            .unwrap();
        store
            .append("a", EventType::AiResponse, event::ai_response("done", "first"))
            .await
            .unwrap();

        let events = store.fetch_events("a", None).await.unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.session_id == "a"));
        assert_eq!(events[0].event_type, EventType::UserMessage);
        assert_eq!(events[1].content["args"]["location"], "Oslo");
        assert_eq!(events[2].event_type, EventType::AiResponse);
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let limited = store.fetch_events("a", Some(2)).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].event_type, EventType::UserMessage);

        assert!(store.fetch_events("missing", None).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_appends_from_tasks() {
        let store = std::sync::Arc::new(SqliteStore::in_memory().unwrap());
        store.create("u", "s1").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append("s1", EventType::UserMessage, event::user_message(&format!("m{}", i)))
                    .await
                    .unwrap();
                store.record_activity("s1", 1).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.fetch_events("s1", None).await.unwrap().len(), 20);
        assert_eq!(store.get("s1").await.unwrap().unwrap().message_count, 20);
    }

    #[tokio::test]
    async fn test_list_sessions_by_user() {
        let store = SqliteStore::in_memory().unwrap();
        store.create("alice", "s1").await.unwrap();
        store.create("alice", "s2").await.unwrap();
        store.create("bob", "s3").await.unwrap();

        let alice = store.list_sessions("alice", 10).unwrap();
        assert_eq!(alice.len(), 2);
        assert!(alice.iter().all(|r| r.user_id == "alice"));
        assert_eq!(store.list_sessions("carol", 10).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_reopen_file_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("parley.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.create("alice", "s1").await.unwrap();
            store
                .append("s1", EventType::UserMessage, event::user_message("hi"))
                .await
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.get("s1").await.unwrap().is_some());
        assert_eq!(store.fetch_events("s1", None).await.unwrap().len(), 1);
    }
}

//! Store traits for the durable event log and session records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{ParleyError, Result};
use crate::event::{Event, EventType};

/// Append-only, session-scoped event log.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn append(&self, session_id: &str, event_type: EventType, payload: Value) -> Result<()>;
}

/// Persisted bookkeeping for one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub message_count: u32,
    pub summary: Option<String>,
}

impl SessionRecord {
    pub fn new(user_id: &str, session_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            start_time: now,
            end_time: None,
            updated_at: now,
            duration_seconds: 0,
            message_count: 0,
            summary: None,
        }
    }

    /// Count `added` turns and refresh the duration.
    pub fn record_activity(&mut self, added: u32, now: DateTime<Utc>) {
        self.message_count += added;
        self.touch(now);
    }

    /// Store the summary, stamp the end time and refresh the duration.
    pub fn finish(&mut self, summary: &str, now: DateTime<Utc>) {
        self.summary = Some(summary.to_string());
        self.end_time = Some(now);
        self.touch(now);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.duration_seconds = (now - self.start_time).num_seconds().max(0);
    }
}

/// Session record store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a fresh session record.
    async fn create(&self, user_id: &str, session_id: &str) -> Result<()>;

    /// Look up a session record.
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// Events of a session in timestamp order, optionally capped.
    async fn fetch_events(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<Event>>;

    /// Count turns added to a session.
    async fn record_activity(&self, session_id: &str, messages_added: u32) -> Result<()>;

    /// Store the post-session summary.
    async fn update_summary(&self, session_id: &str, summary: &str) -> Result<()>;
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory store for testing and `--memory` runs.
#[derive(Default)]
pub struct InMemoryStore {
    sessions: Mutex<HashMap<String, SessionRecord>>,
    events: Mutex<Vec<Event>>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// All events of all sessions, in append order.
    pub fn all_events(&self) -> Vec<Event> {
        lock(&self.events).clone()
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(ParleyError::StoreUnavailable("in-memory store offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn with_record<F>(&self, session_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut SessionRecord),
    {
        self.check()?;
        let mut sessions = lock(&self.sessions);
        let record = sessions
            .get_mut(session_id)
            .ok_or_else(|| ParleyError::StoreUnavailable(format!("no session record: {}", session_id)))?;
        f(record);
        Ok(())
    }
}

#[async_trait]
impl EventSink for InMemoryStore {
    async fn append(&self, session_id: &str, event_type: EventType, payload: Value) -> Result<()> {
        self.check()?;
        lock(&self.events).push(Event {
            session_id: session_id.to_string(),
            event_type,
            content: payload,
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn create(&self, user_id: &str, session_id: &str) -> Result<()> {
        self.check()?;
        lock(&self.sessions).insert(
            session_id.to_string(),
            SessionRecord::new(user_id, session_id, Utc::now()),
        );
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        self.check()?;
        Ok(lock(&self.sessions).get(session_id).cloned())
    }

    async fn fetch_events(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<Event>> {
        self.check()?;
        let events = lock(&self.events);
        let matching = events.iter().filter(|e| e.session_id == session_id).cloned();
        Ok(match limit {
            Some(n) => matching.take(n).collect(),
            None => matching.collect(),
        })
    }

    async fn record_activity(&self, session_id: &str, messages_added: u32) -> Result<()> {
        self.with_record(session_id, |r| r.record_activity(messages_added, Utc::now()))
    }

    async fn update_summary(&self, session_id: &str, summary: &str) -> Result<()> {
        self.with_record(session_id, |r| r.finish(summary, Utc::now()))
    }
}

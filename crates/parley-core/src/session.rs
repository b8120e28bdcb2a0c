//! Sessions and the registry of live sessions.
//!
//! The registry keeps two indexes (by session id and by user id) behind a
//! single lock. Every mutation updates both inside one critical section and
//! never awaits while holding it, so no caller can observe one index without
//! the other.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ParleyError, Result};
use crate::message::{ChatMessage, Role};
use crate::router::Route;
use crate::store::SessionStore;

/// State for a single conversation.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    user_id: String,
    created_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    history: Vec<ChatMessage>,
    route: Route,
}

impl Session {
    pub fn new(id: &str, user_id: &str) -> Self {
        Self::with_created_at(id, user_id, Utc::now())
    }

    pub fn with_created_at(id: &str, user_id: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            user_id: user_id.to_string(),
            created_at,
            ended_at: None,
            history: Vec::new(),
            route: Route::General,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Append a user or assistant turn.
    pub fn add_message(&mut self, role: Role, content: &str) -> Result<()> {
        if content.is_empty() {
            return Err(ParleyError::MalformedClientInput("empty message".to_string()));
        }
        if !matches!(role, Role::User | Role::Assistant) {
            return Err(ParleyError::Other(format!("history does not hold {} turns", role)));
        }
        self.history.push(ChatMessage::new(role, content));
        Ok(())
    }

    /// The last `max_messages` turns, oldest first.
    pub fn recent_context(&self, max_messages: usize) -> Vec<ChatMessage> {
        let start = self.history.len().saturating_sub(max_messages);
        self.history[start..].to_vec()
    }

    /// True once more than `timeout_secs` have passed since creation.
    pub fn is_expired(&self, timeout_secs: u64) -> bool {
        self.is_expired_at(timeout_secs, Utc::now())
    }

    pub fn is_expired_at(&self, timeout_secs: u64, now: DateTime<Utc>) -> bool {
        let elapsed = now - self.created_at;
        elapsed > chrono::Duration::seconds(timeout_secs as i64)
    }

    pub fn set_route(&mut self, route: Route) {
        self.route = route;
        debug!(session_id = %self.id, %route, "Intent route updated");
    }

    /// Stamp the end time. Returns false if it was already set.
    pub fn close(&mut self, now: DateTime<Utc>) -> bool {
        if self.ended_at.is_some() {
            return false;
        }
        self.ended_at = Some(now);
        true
    }

    pub fn message_count(&self) -> usize {
        self.history.len()
    }

    pub fn exchange_count(&self) -> usize {
        self.history.len() / 2
    }
}

/// A session shared between the registry and its message loop.
pub type SharedSession = Arc<Mutex<Session>>;

/// Lock a shared session, recovering the data if a holder panicked.
pub fn lock_session(session: &SharedSession) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Indexes {
    by_id: HashMap<String, SharedSession>,
    by_user: HashMap<String, HashSet<String>>,
}

/// Registry of live sessions.
pub struct SessionRegistry {
    indexes: Mutex<Indexes>,
    store: Arc<dyn SessionStore>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            indexes: Mutex::new(Indexes::default()),
            store,
        }
    }

    fn indexes(&self) -> MutexGuard<'_, Indexes> {
        self.indexes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a session for `user_id` and return its id.
    ///
    /// The store record is written first; the session only becomes visible
    /// once that succeeded, so a failed write leaves nothing behind.
    pub async fn create_session(&self, user_id: &str) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();

        self.store
            .create(user_id, &session_id)
            .await
            .map_err(|e| match e {
                ParleyError::StoreUnavailable(msg) => ParleyError::StoreUnavailable(msg),
                other => ParleyError::StoreUnavailable(other.to_string()),
            })?;

        self.insert(Session::new(&session_id, user_id));
        info!(session_id = %session_id, user_id = %user_id, "Session created");
        Ok(session_id)
    }

    fn insert(&self, session: Session) {
        let id = session.id().to_string();
        let user_id = session.user_id().to_string();
        let mut idx = self.indexes();
        idx.by_id.insert(id.clone(), Arc::new(Mutex::new(session)));
        idx.by_user.entry(user_id).or_default().insert(id);
    }

    /// Look up a live session.
    pub fn get_session(&self, session_id: &str) -> Option<SharedSession> {
        self.indexes().by_id.get(session_id).cloned()
    }

    /// Mark a session as ended. Later calls keep the first end time.
    pub fn close_session(&self, session_id: &str) {
        let Some(session) = self.get_session(session_id) else {
            return;
        };
        if lock_session(&session).close(Utc::now()) {
            info!(session_id = %session_id, "Session closed");
        }
    }

    /// Drop a session from both indexes. Absent ids are ignored.
    pub fn remove_session(&self, session_id: &str) -> Option<SharedSession> {
        let mut idx = self.indexes();
        let session = idx.by_id.remove(session_id)?;
        let user_id = lock_session(&session).user_id().to_string();
        if let Some(ids) = idx.by_user.get_mut(&user_id) {
            ids.remove(session_id);
            if ids.is_empty() {
                idx.by_user.remove(&user_id);
            }
        }
        drop(idx);
        info!(session_id = %session_id, "Session removed");
        Some(session)
    }

    /// Snapshot of a user's live session ids.
    pub fn list_user_sessions(&self, user_id: &str) -> HashSet<String> {
        self.indexes().by_user.get(user_id).cloned().unwrap_or_default()
    }

    /// Total number of live sessions.
    pub fn len(&self) -> usize {
        self.indexes().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes().by_id.is_empty()
    }

    /// Check that both indexes describe the same set of sessions.
    pub fn is_consistent(&self) -> bool {
        let idx = self.indexes();
        let indexed: usize = idx.by_user.values().map(HashSet::len).sum();
        indexed == idx.by_id.len()
            && idx.by_user.iter().all(|(user, ids)| {
                !ids.is_empty()
                    && ids.iter().all(|id| {
                        idx.by_id
                            .get(id)
                            .is_some_and(|s| lock_session(s).user_id() == user)
                    })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::Duration;

    fn registry() -> (SessionRegistry, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (SessionRegistry::new(store.clone()), store)
    }

    #[test]
    fn test_recent_context_bounds() {
        let mut s = Session::new("s", "u");
        for i in 0..7 {
            s.add_message(Role::User, &format!("m{}", i)).unwrap();
        }
        for k in [0, 1, 3, 7, 20] {
            let ctx = s.recent_context(k);
            assert_eq!(ctx.len(), k.min(7));
            let expected: Vec<String> = (7 - k.min(7)..7).map(|i| format!("m{}", i)).collect();
            let got: Vec<String> = ctx.into_iter().map(|m| m.content).collect();
            assert_eq!(got, expected);
        }
        assert_eq!(s.history().len(), 7);
    }

    #[test]
    fn test_add_message_rejects_empty_and_foreign_roles() {
        let mut s = Session::new("s", "u");
        assert!(s.add_message(Role::User, "").is_err());
        assert!(s.add_message(Role::Tool, "x").is_err());
        s.add_message(Role::User, "hi").unwrap();
        s.add_message(Role::Assistant, "hello").unwrap();
        assert_eq!(s.message_count(), 2);
        assert_eq!(s.exchange_count(), 1);
    }

    #[test]
    fn test_expiry_boundary_is_strict() {
        let created = Utc::now();
        let s = Session::with_created_at("s", "u", created);
        assert!(!s.is_expired_at(1800, created + Duration::seconds(1800)));
        assert!(s.is_expired_at(1800, created + Duration::seconds(1801)));
        assert!(!s.is_expired_at(1800, created));
        assert!(!s.is_expired(1800));
    }

    #[test]
    fn test_close_keeps_first_end_time() {
        let mut s = Session::new("s", "u");
        let first = Utc::now();
        assert!(s.close(first));
        assert!(!s.close(first + Duration::seconds(10)));
        assert_eq!(s.ended_at(), Some(first));
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let (reg, store) = registry();
        let id = reg.create_session("alice").await.unwrap();
        let session = reg.get_session(&id).unwrap();
        assert_eq!(lock_session(&session).user_id(), "alice");
        assert_eq!(lock_session(&session).route(), Route::General);
        assert!(reg.list_user_sessions("alice").contains(&id));
        assert!(store.get(&id).await.unwrap().is_some());
        assert!(reg.is_consistent());
    }

    #[tokio::test]
    async fn test_create_fails_cleanly_when_store_down() {
        let (reg, store) = registry();
        store.set_unavailable(true);
        let err = reg.create_session("alice").await.unwrap_err();
        assert!(matches!(err, ParleyError::StoreUnavailable(_)));
        assert!(reg.is_empty());
        assert!(reg.list_user_sessions("alice").is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (reg, _) = registry();
        let id = reg.create_session("bob").await.unwrap();
        reg.close_session(&id);
        let first = lock_session(&reg.get_session(&id).unwrap()).ended_at();
        assert!(first.is_some());
        reg.close_session(&id);
        assert_eq!(lock_session(&reg.get_session(&id).unwrap()).ended_at(), first);
        reg.close_session("missing");
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (reg, _) = registry();
        let id = reg.create_session("bob").await.unwrap();
        assert!(reg.remove_session(&id).is_some());
        assert!(reg.remove_session(&id).is_none());
        assert!(reg.get_session(&id).is_none());
        assert!(reg.list_user_sessions("bob").is_empty());
        assert!(reg.is_consistent());
    }

    #[tokio::test]
    async fn test_invariant_over_mixed_sequence() {
        let (reg, _) = registry();
        let users = ["u1", "u2", "u3"];
        let mut ids = Vec::new();
        for round in 0..12 {
            let user = users[round % users.len()];
            ids.push((user, reg.create_session(user).await.unwrap()));
            if round % 3 == 2 {
                let (_, victim) = ids.remove(round % ids.len());
                reg.remove_session(&victim);
            }
            assert!(reg.is_consistent());
        }
        assert_eq!(reg.len(), ids.len());
        for user in users {
            let expected: HashSet<String> = ids
                .iter()
                .filter(|(u, _)| *u == user)
                .map(|(_, id)| id.clone())
                .collect();
            assert_eq!(reg.list_user_sessions(user), expected);
        }
    }

    #[tokio::test]
    async fn test_concurrent_create_and_remove() {
        let (reg, _) = registry();
        let reg = Arc::new(reg);
        let mut handles = Vec::new();
        for i in 0..32 {
            let reg = reg.clone();
            handles.push(tokio::spawn(async move {
                let user = format!("user{}", i % 4);
                let id = reg.create_session(&user).await.unwrap();
                if i % 2 == 0 {
                    reg.close_session(&id);
                    reg.remove_session(&id);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(reg.len(), 16);
        assert!(reg.is_consistent());
    }
}

//! In-process store of streaming chat sessions.
//!
//! A session is written only by the consumer task of its stream and read by
//! polls. Once terminal (completed or errored) it is never written again and
//! the next poll removes it.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

pub const SESSION_NOT_FOUND: &str = "Session not found";

/// Millisecond wall clock. Injected so tests control session ages.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

pub trait SessionIdGenerator: Send + Sync {
    fn next_id(&self, now_millis: u64) -> String;
}

/// Decimal timestamp followed by nine random base36 characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampRandomIds;

impl SessionIdGenerator for TimestampRandomIds {
    fn next_id(&self, now_millis: u64) -> String {
        const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut rng = rand::thread_rng();
        let suffix: String = (0..9)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        format!("{now_millis}{suffix}")
    }
}

#[derive(Debug)]
struct ChatSession {
    content: String,
    completed: bool,
    error: Option<String>,
    last_seen: u64,
    cancel: CancellationToken,
}

impl ChatSession {
    fn is_terminal(&self) -> bool {
        self.completed || self.error.is_some()
    }

    fn snapshot(&self) -> PollResponse {
        PollResponse::Snapshot {
            content: self.content.clone(),
            has_more: !self.completed,
            is_stream: true,
            error: self.error.clone(),
        }
    }
}

/// Result of polling one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PollResponse {
    #[serde(rename_all = "camelCase")]
    Snapshot {
        content: String,
        has_more: bool,
        is_stream: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    NotFound { error: String },
}

impl PollResponse {
    pub fn not_found() -> Self {
        Self::NotFound {
            error: SESSION_NOT_FOUND.to_string(),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Snapshot { content, .. } => content,
            Self::NotFound { .. } => "",
        }
    }

    pub fn has_more(&self) -> bool {
        matches!(self, Self::Snapshot { has_more: true, .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Snapshot { error, .. } => error.as_deref(),
            Self::NotFound { error } => Some(error),
        }
    }
}

/// Process-wide map from session id to session state.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, ChatSession>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn SessionIdGenerator>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(TimestampRandomIds))
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl SessionStore {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn SessionIdGenerator>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            clock,
            ids,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Register a fresh session and return its id with the token that cancels its stream.
    pub fn create(&self) -> (String, CancellationToken) {
        let now = self.clock.now_millis();
        let cancel = CancellationToken::new();
        loop {
            let id = self.ids.next_id(now);
            match self.sessions.entry(id.clone()) {
                Entry::Occupied(_) => {
                    tracing::warn!(session = %id, "session id collision, regenerating");
                }
                Entry::Vacant(slot) => {
                    slot.insert(ChatSession {
                        content: String::new(),
                        completed: false,
                        error: None,
                        last_seen: now,
                        cancel: cancel.clone(),
                    });
                    tracing::debug!(session = %id, "session created");
                    return (id, cancel);
                }
            }
        }
    }

    /// Apply `f` to a live session. Returns false when the session is gone or terminal.
    fn mutate(&self, id: &str, f: impl FnOnce(&mut ChatSession)) -> bool {
        let Some(mut session) = self.sessions.get_mut(id) else {
            return false;
        };
        if session.is_terminal() {
            return false;
        }
        f(session.value_mut());
        true
    }

    pub fn append(&self, id: &str, delta: &str) -> bool {
        let now = self.clock.now_millis();
        self.mutate(id, |s| {
            s.content.push_str(delta);
            s.last_seen = now;
        })
    }

    pub fn complete(&self, id: &str) -> bool {
        let applied = self.mutate(id, |s| s.completed = true);
        if applied {
            tracing::debug!(session = %id, "session completed");
        }
        applied
    }

    /// Record a stream failure. An error always implies completion.
    pub fn fail(&self, id: &str, message: impl Into<String>) -> bool {
        let message = message.into();
        let applied = self.mutate(id, |s| {
            s.error = Some(message.clone());
            s.completed = true;
        });
        if applied {
            tracing::debug!(session = %id, error = %message, "session failed");
        }
        applied
    }

    /// Snapshot a session, removing it if it has reached a terminal state.
    ///
    /// Check and removal happen under the shard lock, so a terminal session is
    /// reported to exactly one poll.
    pub fn poll(&self, id: &str) -> PollResponse {
        let now = self.clock.now_millis();
        match self.sessions.entry(id.to_string()) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_terminal() {
                    let session = slot.remove();
                    tracing::debug!(session = %id, "session consumed");
                    return session.snapshot();
                }
                slot.get_mut().last_seen = now;
                slot.get().snapshot()
            }
            Entry::Vacant(_) => PollResponse::not_found(),
        }
    }

    /// Stop a session's stream and drop it. Returns false for unknown ids.
    pub fn cancel(&self, id: &str) -> bool {
        match self.sessions.remove(id) {
            Some((_, session)) => {
                session.cancel.cancel();
                tracing::debug!(session = %id, "session cancelled");
                true
            }
            None => false,
        }
    }

    /// Drop every session nobody has polled or fed for longer than `max_idle`.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = self.clock.now_millis();
        let max_idle = max_idle.as_millis() as u64;
        let mut evicted = 0;
        self.sessions.retain(|id, session| {
            let keep = now.saturating_sub(session.last_seen) <= max_idle;
            if !keep {
                session.cancel.cancel();
                tracing::info!(session = %id, "evicting idle session");
                evicted += 1;
            }
            keep
        });
        evicted
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Clock that only moves when told to.
    #[derive(Debug, Default)]
    pub(crate) struct ManualClock(AtomicU64);

    impl ManualClock {
        pub(crate) fn advance(&self, by: Duration) {
            self.0.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_millis(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// Hands out `s0`, `s1`, ... in order.
    #[derive(Debug, Default)]
    pub(crate) struct SequentialIds(AtomicU64);

    impl SessionIdGenerator for SequentialIds {
        fn next_id(&self, _now_millis: u64) -> String {
            format!("s{}", self.0.fetch_add(1, Ordering::SeqCst))
        }
    }

    fn store() -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let store = SessionStore::new(clock.clone(), Arc::new(SequentialIds::default()));
        (store, clock)
    }

    #[test]
    fn poll_unknown_session() {
        let (store, _) = store();
        let res = store.poll("missing");
        assert_eq!(res, PollResponse::not_found());
        assert_eq!(res.error(), Some(SESSION_NOT_FOUND));
    }

    #[test]
    fn live_session_survives_polls() {
        let (store, _) = store();
        let (id, _) = store.create();
        assert!(store.append(&id, "he"));
        assert!(store.append(&id, "llo"));

        for _ in 0..2 {
            let res = store.poll(&id);
            assert_eq!(res.content(), "hello");
            assert!(res.has_more());
            assert_eq!(res.error(), None);
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn terminal_session_is_consumed_once() {
        let (store, _) = store();
        let (id, _) = store.create();
        store.append(&id, "done");
        assert!(store.complete(&id));

        let res = store.poll(&id);
        assert_eq!(
            res,
            PollResponse::Snapshot {
                content: "done".into(),
                has_more: false,
                is_stream: true,
                error: None,
            }
        );
        assert!(store.is_empty());
        assert_eq!(store.poll(&id), PollResponse::not_found());
    }

    #[test]
    fn error_is_reported_and_implies_completion() {
        let (store, _) = store();
        let (id, _) = store.create();
        store.append(&id, "partial");
        assert!(store.fail(&id, "connection reset"));

        let res = store.poll(&id);
        assert_eq!(res.content(), "partial");
        assert!(!res.has_more());
        assert_eq!(res.error(), Some("connection reset"));
        assert_eq!(store.poll(&id), PollResponse::not_found());
    }

    #[test]
    fn terminal_sessions_reject_mutation() {
        let (store, _) = store();
        let (id, _) = store.create();
        store.append(&id, "a");
        store.complete(&id);

        assert!(!store.append(&id, "b"));
        assert!(!store.fail(&id, "late"));
        assert!(!store.complete(&id));

        let res = store.poll(&id);
        assert_eq!(res.content(), "a");
        assert_eq!(res.error(), None);
    }

    #[test]
    fn mutation_of_missing_session_is_rejected() {
        let (store, _) = store();
        assert!(!store.append("nope", "x"));
        assert!(!store.complete("nope"));
        assert!(!store.fail("nope", "x"));
    }

    #[test]
    fn cancel_removes_and_signals() {
        let (store, _) = store();
        let (id, token) = store.create();
        assert!(store.cancel(&id));
        assert!(token.is_cancelled());
        assert!(!store.cancel(&id));
        assert_eq!(store.poll(&id), PollResponse::not_found());
    }

    #[test]
    fn evicts_only_idle_sessions() {
        let (store, clock) = store();
        let (stale, stale_token) = store.create();
        clock.advance(Duration::from_secs(60));
        let (fresh, fresh_token) = store.create();
        clock.advance(Duration::from_secs(30));

        assert_eq!(store.evict_idle(Duration::from_secs(45)), 1);
        assert!(stale_token.is_cancelled());
        assert!(!fresh_token.is_cancelled());
        assert_eq!(store.poll(&stale), PollResponse::not_found());
        assert!(store.poll(&fresh).has_more());
    }

    #[test]
    fn polling_refreshes_idle_timer() {
        let (store, clock) = store();
        let (id, _) = store.create();
        clock.advance(Duration::from_secs(40));
        store.poll(&id);
        clock.advance(Duration::from_secs(40));
        assert_eq!(store.evict_idle(Duration::from_secs(45)), 0);
    }

    #[test]
    fn appending_refreshes_idle_timer() {
        let (store, clock) = store();
        let (id, token) = store.create();
        clock.advance(Duration::from_secs(40));
        assert!(store.append(&id, "still streaming"));
        clock.advance(Duration::from_secs(40));
        assert_eq!(store.evict_idle(Duration::from_secs(45)), 0);
        assert!(!token.is_cancelled());
        assert_eq!(store.poll(&id).content(), "still streaming");
    }

    #[test]
    fn default_ids_are_timestamp_plus_random() {
        let ids = TimestampRandomIds;
        let a = ids.next_id(1_700_000_000_000);
        let b = ids.next_id(1_700_000_000_000);
        assert!(a.starts_with("1700000000000"));
        assert_eq!(a.len(), 13 + 9);
        assert!(a[13..].chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_ne!(a, b);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let res = PollResponse::Snapshot {
            content: "x".into(),
            has_more: true,
            is_stream: true,
            error: None,
        };
        assert_eq!(
            serde_json::to_value(&res).unwrap(),
            serde_json::json!({"content": "x", "hasMore": true, "isStream": true})
        );
        assert_eq!(
            serde_json::to_value(PollResponse::not_found()).unwrap(),
            serde_json::json!({"error": "Session not found"})
        );
    }
}

//! Wizard session store
//!
//! Holds at most one conversation per (user, chat). Each conversation has
//! its own async lock so its events are processed one at a time while
//! other conversations progress independently.

use super::state::{ConversationState, SessionKey};
use crate::error::{RideError, RideResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub type SharedSession = Arc<tokio::sync::Mutex<ConversationState>>;

pub struct SessionStore {
    sessions: Mutex<HashMap<SessionKey, SharedSession>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<SessionKey, SharedSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new conversation; a second start for the same key is rejected
    pub fn start(&self, state: ConversationState) -> RideResult<SharedSession> {
        let mut sessions = self.map();
        if sessions.contains_key(&state.key) {
            return Err(RideError::SessionActive);
        }
        let key = state.key;
        let session = Arc::new(tokio::sync::Mutex::new(state));
        sessions.insert(key, session.clone());
        tracing::debug!(%key, active = sessions.len(), "Wizard session started");
        Ok(session)
    }

    pub fn get(&self, key: SessionKey) -> Option<SharedSession> {
        self.map().get(&key).cloned()
    }

    pub fn contains(&self, key: SessionKey) -> bool {
        self.map().contains_key(&key)
    }

    /// Whether `session` is still the live conversation for `key`
    pub fn is_current(&self, key: SessionKey, session: &SharedSession) -> bool {
        self.map()
            .get(&key)
            .is_some_and(|live| Arc::ptr_eq(live, session))
    }

    pub fn remove(&self, key: SessionKey) {
        if self.map().remove(&key).is_some() {
            tracing::debug!(%key, "Wizard session ended");
        }
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    /// Drop conversations idle for longer than the ttl.
    ///
    /// Sessions currently being processed are left alone.
    pub fn evict_idle(&self, now: Instant) -> Vec<ConversationState> {
        let mut evicted = Vec::new();
        self.map().retain(|_, session| {
            let Ok(state) = session.try_lock() else {
                return true;
            };
            if now.saturating_duration_since(state.last_activity) <= self.ttl {
                return true;
            }
            evicted.push(state.clone());
            false
        });
        if !evicted.is_empty() {
            tracing::info!(evicted = evicted.len(), "Evicted idle wizard sessions");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ride::RideDraft;
    use crate::wizard::state::WizardMode;

    fn state(user_id: i64, chat_id: i64) -> ConversationState {
        ConversationState::new(
            SessionKey::new(user_id, chat_id),
            WizardMode::Create,
            RideDraft::default(),
            None,
        )
    }

    #[test]
    fn test_second_start_is_rejected() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.start(state(1, 10)).unwrap();
        assert!(matches!(
            store.start(state(1, 10)),
            Err(RideError::SessionActive)
        ));
        // Same user in another chat is a different conversation
        store.start(state(1, 11)).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_removed_session_is_no_longer_current() {
        let store = SessionStore::new(Duration::from_secs(60));
        let key = SessionKey::new(1, 10);
        let first = store.start(state(1, 10)).unwrap();
        assert!(store.is_current(key, &first));

        store.remove(key);
        let second = store.start(state(1, 10)).unwrap();
        assert!(!store.is_current(key, &first));
        assert!(store.is_current(key, &second));
    }

    #[tokio::test]
    async fn test_evict_idle_skips_busy_and_fresh_sessions() {
        let store = SessionStore::new(Duration::from_secs(60));
        let idle = store.start(state(1, 10)).unwrap();
        let busy = store.start(state(2, 10)).unwrap();
        store.start(state(3, 10)).unwrap();

        let later = Instant::now() + Duration::from_secs(120);
        idle.lock().await.last_activity = Instant::now();
        let _guard = busy.lock().await;
        {
            let fresh = store.get(SessionKey::new(3, 10)).unwrap();
            fresh.lock().await.last_activity = later;
        }

        let evicted = store.evict_idle(later);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].key, SessionKey::new(1, 10));
        assert!(!store.contains(SessionKey::new(1, 10)));
        assert!(store.contains(SessionKey::new(2, 10)));
        assert!(store.contains(SessionKey::new(3, 10)));
    }
}

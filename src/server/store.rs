use crate::session::Session;
use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

struct Entry {
    session: Session,
    last_seen: Instant,
}

/// Live sessions with idle expiry and a cap on how many are kept.
pub struct SessionStore {
    sessions: HashMap<Uuid, Entry>,
    ttl: Duration,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        SessionStore {
            sessions: HashMap::new(),
            ttl,
            max_sessions,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Opens a session, making room for it first.
    pub fn create(&mut self, session: Session, now: Instant) -> Uuid {
        self.prune(now);
        if self.max_sessions > 0 {
            let excess = (self.sessions.len() + 1).saturating_sub(self.max_sessions);
            self.evict_oldest(excess);
        }
        let id = Uuid::new_v4();
        self.sessions.insert(id, Entry { session, last_seen: now });
        id
    }

    /// Looks a session up and marks it as used. Expired sessions are not returned.
    pub fn get_mut(&mut self, id: Uuid, now: Instant) -> Option<&mut Session> {
        self.prune(now);
        let entry = self.sessions.get_mut(&id)?;
        entry.last_seen = now;
        Some(&mut entry.session)
    }

    pub fn remove(&mut self, id: Uuid) -> bool {
        self.sessions.remove(&id).is_some()
    }

    /// Drops sessions idle for longer than the time to live. Returns how many went.
    pub fn prune(&mut self, now: Instant) -> usize {
        if self.ttl.is_zero() {
            return 0;
        }
        let before = self.sessions.len();
        let ttl = self.ttl;
        self.sessions
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= ttl);
        let removed = before - self.sessions.len();
        if removed > 0 {
            info!(removed, "expired idle sessions");
        }
        removed
    }

    fn evict_oldest(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        let mut ids: Vec<(Uuid, Instant)> = self
            .sessions
            .iter()
            .map(|(id, entry)| (*id, entry.last_seen))
            .collect();
        ids.sort_by_key(|(_, last_seen)| *last_seen);
        for (id, _) in ids.into_iter().take(count) {
            self.sessions.remove(&id);
        }
        info!(evicted = count, "session limit reached");
    }
}

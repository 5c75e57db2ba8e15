//! SessionRegistry: the in-memory table of active sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::session::Session;

/// Internal entry in the registry. Tracks last use for idle expiry.
struct SessionEntry {
    session: Arc<Session>,
    /// Milliseconds since `SessionRegistry::epoch`
    last_seen_ms: AtomicU64,
}

/// Maps session ids to sessions.
///
/// Uses parking_lot::RwLock (sync): lookups share the read lock and may run
/// concurrently, while add/remove/clear take the write lock so readers never
/// observe a half-inserted entry. Last-use stamps are atomics so `touch`
/// never needs the write lock.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    epoch: Instant,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            epoch: Instant::now(),
        }
    }

    /// Register a session and return its id.
    ///
    /// The id is re-rolled until it is unique in the table.
    pub fn add(&self, mut session: Session) -> String {
        let mut sessions = self.sessions.write();
        while sessions.contains_key(session.id()) {
            session.reroll_id();
        }
        let id = session.id().to_string();
        sessions.insert(
            id.clone(),
            SessionEntry {
                session: Arc::new(session),
                last_seen_ms: AtomicU64::new(self.now_ms()),
            },
        );
        info!(session_id = %id, total = sessions.len(), "Added new http session handler");
        id
    }

    /// Remove a session. Returns whether it was present.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().remove(id).is_some();
        if removed {
            debug!(session_id = %id, "Removed http session handler");
        }
        removed
    }

    /// Look a session up without touching its idle timer.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).map(|entry| entry.session.clone())
    }

    /// Stamp a session as used. Returns whether it was present.
    pub fn touch(&self, id: &str) -> bool {
        let sessions = self.sessions.read();
        let Some(entry) = sessions.get(id) else {
            return false;
        };
        entry.last_seen_ms.store(self.now_ms(), Ordering::Relaxed);
        true
    }

    /// Remove every session. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut sessions = self.sessions.write();
        let count = sessions.len();
        sessions.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Drop sessions that have not been looked up for longer than `ttl`.
    /// Returns the ids that were removed.
    pub fn expire_idle(&self, ttl: Duration) -> Vec<String> {
        let ttl_ms = ttl.as_millis() as u64;
        let now = self.now_ms();
        let is_idle = |entry: &SessionEntry| {
            now.saturating_sub(entry.last_seen_ms.load(Ordering::Relaxed)) > ttl_ms
        };

        // Scan under the read lock; most sweeps find nothing to remove
        let candidates: Vec<String> = {
            let sessions = self.sessions.read();
            sessions
                .iter()
                .filter(|(_, entry)| is_idle(entry))
                .map(|(id, _)| id.clone())
                .collect()
        };
        if candidates.is_empty() {
            return candidates;
        }

        // Re-check under the write lock: a touch may have refreshed an entry
        let mut sessions = self.sessions.write();
        let mut expired = Vec::new();
        for id in candidates {
            if sessions.get(&id).is_some_and(|entry| is_idle(entry)) {
                sessions.remove(&id);
                expired.push(id);
            }
        }
        if !expired.is_empty() {
            info!("Expired {} idle session(s) (remaining: {})", expired.len(), sessions.len());
        }
        expired
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Per-user conversational session state.
//!
//! Sessions hold the short-lived "what are we asking this user" step that a
//! host needs after a flow completes. They live in memory only and expire
//! after a fixed TTL measured against the injected [`Clock`].

use crate::clock::Clock;
use crate::model::UserKey;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Step a user's conversation is parked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStep {
    /// A yes/no prompt to record a new weight was sent after a confirm.
    WeightUpdateOffered,
    /// The user accepted and the host should read a weight next.
    AwaitingWeight,
}

#[derive(Debug, Clone)]
struct SessionEntry {
    step: SessionStep,
    expires_at: DateTime<Utc>,
}

/// TTL-evicted map of user sessions.
pub struct SessionStore {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    sessions: Mutex<HashMap<UserKey, SessionEntry>>,
}

impl SessionStore {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            clock,
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Park `user` on `step`, replacing any previous step and restarting the TTL.
    pub fn set(&self, user: &UserKey, step: SessionStep) {
        let expires_at = self.clock.now() + self.ttl;
        self.lock().insert(user.clone(), SessionEntry { step, expires_at });
    }

    /// Current step, if any and not expired. Expired entries are dropped.
    pub fn get(&self, user: &UserKey) -> Option<SessionStep> {
        let now = self.clock.now();
        let mut sessions = self.lock();
        match sessions.get(user) {
            Some(entry) if entry.expires_at > now => Some(entry.step),
            Some(_) => {
                sessions.remove(user);
                debug!(%user, "session expired");
                None
            }
            None => None,
        }
    }

    /// Drop the user's session. Returns the step that was active.
    pub fn clear(&self, user: &UserKey) -> Option<SessionStep> {
        self.lock().remove(user).map(|e| e.step)
    }

    /// Remove every expired session, returning how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, e| e.expires_at > now);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserKey, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

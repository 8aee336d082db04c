//! User profile as seen by the reminder core.

use super::{Inventory, Reminder, UserTimezone};
use serde::{Deserialize, Serialize};

/// Opaque user identity (chat id, account id, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserKey(pub String);

impl UserKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user record held by the profile store.
///
/// `medications` and `pending_reminders` are owned by this crate. Every
/// other profile field (onboarding answers, weight log, ...) rides along in
/// `profile` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub key: UserKey,
    /// Stored zone identifier, e.g. `Etc/GMT-3`.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub subscribed: bool,
    #[serde(default)]
    pub medications: Inventory,
    #[serde(default)]
    pub pending_reminders: Vec<Reminder>,
    #[serde(flatten)]
    pub profile: serde_json::Map<String, serde_json::Value>,
}

impl User {
    /// A subscribed user with an empty inventory.
    pub fn new(key: UserKey) -> Self {
        Self {
            key,
            timezone: None,
            subscribed: true,
            medications: Inventory::default(),
            pending_reminders: Vec::new(),
            profile: serde_json::Map::new(),
        }
    }

    pub fn with_timezone(mut self, zone: UserTimezone) -> Self {
        self.timezone = Some(zone.canonical_name());
        self
    }

    /// Effective timezone, using `fallback` when none or an invalid one is stored.
    pub fn zone(&self, fallback: UserTimezone) -> UserTimezone {
        UserTimezone::resolve(self.timezone.as_deref(), fallback)
    }

    /// `true` when a reminder is waiting to be (re)delivered.
    pub fn has_undelivered_reminders(&self) -> bool {
        self.pending_reminders.iter().any(|r| !r.is_delivered())
    }
}

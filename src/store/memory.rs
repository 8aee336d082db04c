//! In-memory profile store.

use crate::error::{DosekeeperError, Result};
use crate::model::{Inventory, Reminder, User, UserKey};
use crate::store::ProfileStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Keeps users in a map. Writes can be made to fail for fault testing.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    users: RwLock<BTreeMap<UserKey, User>>,
    fail_writes: AtomicBool,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with `users`.
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let map = users.into_iter().map(|u| (u.key.clone(), u)).collect();
        Self {
            users: RwLock::new(map),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent write fail with a persistence error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DosekeeperError::Persistence(
                "store is rejecting writes".to_owned(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn find(&self, key: &UserKey) -> Result<Option<User>> {
        Ok(self.users.read().await.get(key).cloned())
    }

    async fn save(&self, user: &User) -> Result<()> {
        self.check_writable()?;
        self.users
            .write()
            .await
            .insert(user.key.clone(), user.clone());
        Ok(())
    }

    async fn save_tracking(
        &self,
        key: &UserKey,
        medications: &Inventory,
        pending_reminders: &[Reminder],
    ) -> Result<()> {
        self.check_writable()?;
        let mut users = self.users.write().await;
        let user = users
            .get_mut(key)
            .ok_or_else(|| DosekeeperError::UnknownUser(key.to_string()))?;
        user.medications = medications.clone();
        user.pending_reminders = pending_reminders.to_vec();
        Ok(())
    }

    async fn find_all_subscribed(&self) -> Result<Vec<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .filter(|u| u.subscribed)
            .cloned()
            .collect())
    }
}

//! JSON file backed profile store.
//!
//! All users live in a single versioned document. Every write replaces the
//! file through a temp file and rename so a crash never leaves a torn file.

use crate::error::{DosekeeperError, Result};
use crate::model::{Inventory, Reminder, User, UserKey};
use crate::store::ProfileStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

const STATE_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    users: BTreeMap<UserKey, User>,
}

fn default_version() -> u32 {
    STATE_VERSION
}

/// Profile store persisted as one JSON document.
#[derive(Debug)]
pub struct JsonFileProfileStore {
    path: PathBuf,
    users: Mutex<BTreeMap<UserKey, User>>,
}

impl JsonFileProfileStore {
    /// Open the store at `path`. A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let users = load_document(&path).await?.users;
        debug!(path = %path.display(), users = users.len(), "opened profile store");
        Ok(Self {
            path,
            users: Mutex::new(users),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, users: &BTreeMap<UserKey, User>) -> Result<()> {
        let doc = StoreDocument {
            version: STATE_VERSION,
            users: users.clone(),
        };
        let json = serde_json::to_vec_pretty(&doc)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DosekeeperError::Persistence(format!("cannot create store dir: {e}")))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| DosekeeperError::Persistence(format!("cannot write store: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| DosekeeperError::Persistence(format!("cannot replace store: {e}")))?;
        Ok(())
    }
}

async fn load_document(path: &Path) -> Result<StoreDocument> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(StoreDocument::default());
        }
        Err(e) => {
            return Err(DosekeeperError::Persistence(format!(
                "cannot read store: {e}"
            )));
        }
    };
    serde_json::from_slice(&bytes)
        .map_err(|e| DosekeeperError::Persistence(format!("cannot parse store: {e}")))
}

#[async_trait]
impl ProfileStore for JsonFileProfileStore {
    async fn find(&self, key: &UserKey) -> Result<Option<User>> {
        Ok(self.users.lock().await.get(key).cloned())
    }

    async fn save(&self, user: &User) -> Result<()> {
        let mut users = self.users.lock().await;
        let mut next = users.clone();
        next.insert(user.key.clone(), user.clone());
        self.persist(&next).await?;
        *users = next;
        Ok(())
    }

    async fn save_tracking(
        &self,
        key: &UserKey,
        medications: &Inventory,
        pending_reminders: &[Reminder],
    ) -> Result<()> {
        let mut users = self.users.lock().await;
        let mut next = users.clone();
        let user = next
            .get_mut(key)
            .ok_or_else(|| DosekeeperError::UnknownUser(key.to_string()))?;
        user.medications = medications.clone();
        user.pending_reminders = pending_reminders.to_vec();
        self.persist(&next).await?;
        *users = next;
        Ok(())
    }

    async fn find_all_subscribed(&self) -> Result<Vec<User>> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .filter(|u| u.subscribed)
            .cloned()
            .collect())
    }
}

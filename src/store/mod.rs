//! User profile persistence.
//!
//! The reminder core reads whole users but only ever writes the fields it
//! owns (`medications`, `pending_reminders`) through
//! [`ProfileStore::save_tracking`], so concurrent writers of unrelated
//! profile fields are never clobbered.

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileProfileStore;
pub use memory::InMemoryProfileStore;

use crate::error::Result;
use crate::model::{Inventory, Reminder, User, UserKey};
use async_trait::async_trait;

/// Profile store contract.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find(&self, key: &UserKey) -> Result<Option<User>>;

    /// Insert or replace a whole user.
    async fn save(&self, user: &User) -> Result<()>;

    /// Replace inventory and reminder ledger of an existing user in one write.
    async fn save_tracking(
        &self,
        key: &UserKey,
        medications: &Inventory,
        pending_reminders: &[Reminder],
    ) -> Result<()>;

    async fn find_all_subscribed(&self) -> Result<Vec<User>>;
}

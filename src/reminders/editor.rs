//! Provisional status edits on ledger entries.
//!
//! Edits never touch inventory; they only take effect on confirm.

use crate::error::{DosekeeperError, Result};
use crate::model::{DoseKey, DoseStatus, Reminder, User};
use crate::reminders::ledger::DoseLedger;

/// Record `status` on the ledger entry for `key`.
///
/// An entry can be decided once: a second edit fails with
/// [`DosekeeperError::AlreadySet`] and leaves the entry untouched. Returns
/// the updated reminder so the caller can re-render it.
pub fn set_status(user: &mut User, key: DoseKey, status: DoseStatus) -> Result<Reminder> {
    if !status.is_set() {
        return Err(DosekeeperError::InvalidToken(format!(
            "cannot reset {key} to {status}"
        )));
    }

    let mut ledger = DoseLedger::new(&mut user.pending_reminders);
    let (position, entry) = ledger.find_entry_mut(key).ok_or(DosekeeperError::NotFound)?;
    if entry.status.is_set() {
        return Err(DosekeeperError::AlreadySet(entry.status));
    }
    entry.status = status;

    Ok(ledger.reminders()[position].clone())
}

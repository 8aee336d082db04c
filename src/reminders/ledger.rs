//! Per-user ledger of pending dose decisions.
//!
//! The ledger is the user's `pending_reminders` list. A dose key appears in
//! at most one entry across all reminders; lookups are linear because a
//! user only ever has a handful of pending doses.

use crate::model::{DoseKey, MedicationKind, MessageRef, PendingEdit, Reminder};
use crate::reminders::matcher::DueDose;
use std::collections::HashSet;

/// Mutable view over a user's pending reminders.
pub struct DoseLedger<'a> {
    reminders: &'a mut Vec<Reminder>,
}

impl<'a> DoseLedger<'a> {
    pub fn new(reminders: &'a mut Vec<Reminder>) -> Self {
        Self { reminders }
    }

    pub fn reminders(&self) -> &[Reminder] {
        self.reminders.as_slice()
    }

    pub fn is_empty(&self) -> bool {
        self.reminders.is_empty()
    }

    /// First entry with `key` across all reminders.
    pub fn find_entry(&self, key: DoseKey) -> Option<&PendingEdit> {
        self.reminders
            .iter()
            .flat_map(|r| r.entries.iter())
            .find(|e| e.key() == key)
    }

    /// Mutable entry with `key` plus the position of its reminder.
    pub fn find_entry_mut(&mut self, key: DoseKey) -> Option<(usize, &mut PendingEdit)> {
        self.reminders
            .iter_mut()
            .enumerate()
            .find_map(|(pos, r)| {
                r.entries
                    .iter_mut()
                    .find(|e| e.key() == key)
                    .map(|e| (pos, e))
            })
    }

    /// Position of the reminder delivered as `message_ref`.
    pub fn position_of(&self, message_ref: &MessageRef) -> Option<usize> {
        self.reminders.iter().position(|r| r.refers_to(message_ref))
    }

    /// Filter `due` down to keys not yet in the ledger, whatever their status.
    ///
    /// Duplicates inside `due` itself are collapsed too.
    pub fn merge_new(&self, due: Vec<DueDose>) -> Vec<DueDose> {
        let mut seen: HashSet<DoseKey> = self
            .reminders
            .iter()
            .flat_map(|r| r.entries.iter().map(PendingEdit::key))
            .collect();
        due.into_iter().filter(|d| seen.insert(d.key)).collect()
    }

    /// Every entry of every reminder, in ledger order.
    pub fn all_entries(&self) -> Vec<PendingEdit> {
        self.reminders
            .iter()
            .flat_map(|r| r.entries.iter().cloned())
            .collect()
    }

    /// Empty the ledger, returning the removed reminders.
    pub fn take_all(&mut self) -> Vec<Reminder> {
        std::mem::take(self.reminders)
    }

    pub fn push(&mut self, reminder: Reminder) {
        self.reminders.push(reminder);
    }

    pub fn remove(&mut self, position: usize) -> Reminder {
        self.reminders.remove(position)
    }

    /// Drop entries for a removed record and shift later indices down.
    ///
    /// Reminders left without entries are removed as well.
    pub fn forget_medication(&mut self, kind: MedicationKind, index: usize) {
        for reminder in self.reminders.iter_mut() {
            reminder
                .entries
                .retain(|e| !(e.kind == kind && e.index == index));
            for entry in reminder.entries.iter_mut() {
                if entry.kind == kind && entry.index > index {
                    entry.index -= 1;
                }
            }
        }
        self.reminders.retain(|r| !r.entries.is_empty());
    }
}

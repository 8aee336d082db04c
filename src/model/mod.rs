//! Domain model: users, medication inventories, doses and the reminder ledger.
//!
//! Everything here is plain serde data. Behaviour that spans several types
//! (due-matching, consolidation, commit) lives in [`crate::reminders`].

pub mod medication;
pub mod reminder;
pub mod timezone;
pub mod user;

pub use medication::{Dose, Inventory, MedicationKind, MedicationRecord, Schedule, ScheduleKind};
pub use reminder::{DoseKey, DoseStatus, MessageRef, PendingEdit, Reminder};
pub use timezone::UserTimezone;
pub use user::{User, UserKey};

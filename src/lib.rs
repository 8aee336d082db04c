//! Dosekeeper: medication dose reminders with a consolidated, editable ledger.
//!
//! The crate polls users once a minute, merges newly due doses into a single
//! reminder per user and applies the user's confirmed decisions to their
//! medication inventory.
//!
//! # Architecture
//!
//! - **Poller** ([`scheduler::Poller`]): fixed-interval tick over subscribed users
//! - **Matcher** ([`reminders::TimeMatcher`]): minute-resolution due check in the user's zone
//! - **Ledger** ([`reminders::DoseLedger`]): pending decisions, one entry per dose
//! - **Consolidator** ([`reminders::ReminderConsolidator`]): delete-then-send of the merged reminder
//! - **Editor / Commit** ([`reminders::editor`], [`reminders::CommitEngine`]): provisional edits, then per-kind resupply
//! - **Service** ([`reminders::ReminderService`]): per-user locking around all of the above
//!
//! Persistence and delivery sit behind the [`store::ProfileStore`] and
//! [`channels::MessageChannel`] traits.

pub mod channels;
pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod reminders;
pub mod scheduler;
pub mod session;
pub mod store;

pub use config::DosekeeperConfig;
pub use error::{DosekeeperError, Result};
pub use reminders::{ActionResponse, ReminderService, ServiceSettings};
pub use scheduler::{Poller, PollerSettings};

//! The dose reminder core.
//!
//! Doses found due by [`TimeMatcher`] are merged into the user's
//! [`DoseLedger`] and delivered as one consolidated notification by the
//! [`ReminderConsolidator`]. The user marks entries through
//! [`editor::set_status`] and commits them with [`CommitEngine`], which
//! applies the per-kind [`ResupplyPolicy`]. [`ReminderService`] wraps all of
//! it behind per-user locking.

pub mod commit;
pub mod consolidate;
pub mod editor;
pub mod ledger;
pub mod matcher;
pub mod policy;
pub mod render;
pub mod service;
pub mod token;

pub use commit::{CommitEngine, CommitSummary, SummaryLine};
pub use consolidate::{ConsolidationOutcome, ReminderConsolidator};
pub use ledger::DoseLedger;
pub use matcher::{DueDose, TimeMatcher, is_due};
pub use policy::{PenPolicy, Remaining, ResupplyPolicy, TakenOutcome, UnitPolicy, policy_for};
pub use service::{ActionResponse, ReminderService, ServiceSettings};
pub use token::ActionToken;

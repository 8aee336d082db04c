//! Periodic poller and per-user locking.
//!
//! The poller wakes once a minute, finds users with due or undelivered
//! doses and hands them to the reminder service.

pub mod locks;
pub mod runner;

pub use locks::UserLocks;
pub use runner::{Poller, PollerSettings, PollerState, TickReport};

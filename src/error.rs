//! Error types for the dose reminder core.

use crate::model::DoseStatus;

/// Top-level error type for scheduling, ledger and commit operations.
#[derive(Debug, thiserror::Error)]
pub enum DosekeeperError {
    /// The referenced dose entry is not in any pending reminder.
    #[error("dose entry not found in pending reminders")]
    NotFound,

    /// The dose entry already carries a decision.
    #[error("dose already marked as {0}")]
    AlreadySet(DoseStatus),

    /// No pending reminder matches the notification reference.
    #[error("no active reminder for this notification")]
    NoActiveReminder,

    /// The reminder has no entry with a decision yet.
    #[error("nothing to confirm")]
    NothingToConfirm,

    /// Message channel send/edit/delete failure.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Profile store read or write failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A follow-up answer arrived after its session expired.
    #[error("no open session for this answer")]
    SessionExpired,

    /// Action token could not be decoded.
    #[error("invalid action token: {0}")]
    InvalidToken(String),

    /// The user key is unknown to the profile store.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Timezone identifier could not be parsed.
    #[error("timezone error: {0}")]
    Timezone(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DosekeeperError {
    /// Short status line shown to the user when an action fails.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound => "Dose not found or already processed.".to_owned(),
            Self::AlreadySet(status) => format!("Dose already marked as {status}."),
            Self::NoActiveReminder | Self::NothingToConfirm => {
                "Nothing to confirm.".to_owned()
            }
            Self::SessionExpired => "This question has expired.".to_owned(),
            Self::InvalidToken(_) => "Invalid action.".to_owned(),
            Self::UnknownUser(_) => "User not found.".to_owned(),
            Self::Delivery(_)
            | Self::Persistence(_)
            | Self::Config(_)
            | Self::Timezone(_)
            | Self::Io(_)
            | Self::Json(_) => "Something went wrong, please try again.".to_owned(),
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, DosekeeperError>;

//! Reminder ledger entries.

use super::MedicationKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Decision recorded against one pending dose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseStatus {
    #[default]
    Unset,
    Taken,
    Delayed,
}

impl DoseStatus {
    pub fn is_set(self) -> bool {
        self != Self::Unset
    }
}

impl std::fmt::Display for DoseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unset => f.write_str("not selected"),
            Self::Taken => f.write_str("taken"),
            Self::Delayed => f.write_str("delayed"),
        }
    }
}

/// Identity of a dose across a user's inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DoseKey {
    pub kind: MedicationKind,
    /// Position of the record within its kind's collection.
    pub index: usize,
    pub dose_number: u32,
}

impl DoseKey {
    pub fn new(kind: MedicationKind, index: usize, dose_number: u32) -> Self {
        Self {
            kind,
            index,
            dose_number,
        }
    }
}

impl std::fmt::Display for DoseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}/dose {}", self.kind, self.index, self.dose_number)
    }
}

/// One dose awaiting the user's decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEdit {
    pub kind: MedicationKind,
    pub index: usize,
    pub dose_number: u32,
    pub medication_name: String,
    #[serde(default)]
    pub status: DoseStatus,
}

impl PendingEdit {
    /// A freshly due entry with no decision.
    pub fn unset(key: DoseKey, medication_name: impl Into<String>) -> Self {
        Self {
            kind: key.kind,
            index: key.index,
            dose_number: key.dose_number,
            medication_name: medication_name.into(),
            status: DoseStatus::Unset,
        }
    }

    pub fn key(&self) -> DoseKey {
        DoseKey::new(self.kind, self.index, self.dose_number)
    }
}

/// Opaque reference to a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageRef(pub String);

impl MessageRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One consolidated notification and the entries it lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    /// `None` when delivery failed; the entries are re-sent on the next tick.
    #[serde(default)]
    pub notification_ref: Option<MessageRef>,
    #[serde(default)]
    pub entries: Vec<PendingEdit>,
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    pub fn delivered(
        notification_ref: MessageRef,
        entries: Vec<PendingEdit>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            notification_ref: Some(notification_ref),
            entries,
            created_at,
        }
    }

    pub fn undelivered(entries: Vec<PendingEdit>, created_at: DateTime<Utc>) -> Self {
        Self {
            notification_ref: None,
            entries,
            created_at,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.notification_ref.is_some()
    }

    pub fn refers_to(&self, message_ref: &MessageRef) -> bool {
        self.notification_ref.as_ref() == Some(message_ref)
    }
}

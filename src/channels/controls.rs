//! Platform-neutral action controls attached to a message.

use serde::{Deserialize, Serialize};

/// One pressable control: a label and the opaque token it reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub label: String,
    pub token: String,
}

impl Control {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
        }
    }
}

/// Controls arranged in rows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlLayout {
    pub rows: Vec<Vec<Control>>,
}

impl ControlLayout {
    pub fn push_row(&mut self, row: Vec<Control>) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }

    /// All controls in reading order.
    pub fn iter(&self) -> impl Iterator<Item = &Control> {
        self.rows.iter().flatten()
    }
}

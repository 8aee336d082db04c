//! Action tokens carried by notification controls.
//!
//! `status_<kind>_<index>_<dose>_<taken|delay>` sets one entry,
//! `confirm_changes` commits the notification it was pressed on, and
//! `weight_update_yes` / `weight_update_no` answer the follow-up prompt.

use crate::error::{DosekeeperError, Result};
use crate::model::{DoseKey, DoseStatus, MedicationKind};

const CONFIRM_TOKEN: &str = "confirm_changes";
const STATUS_PREFIX: &str = "status";
const WEIGHT_YES_TOKEN: &str = "weight_update_yes";
const WEIGHT_NO_TOKEN: &str = "weight_update_no";

/// Decoded control action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionToken {
    SetStatus { key: DoseKey, status: DoseStatus },
    Confirm,
    /// Answer to the post-confirm weight prompt.
    WeightUpdate { accept: bool },
}

impl ActionToken {
    /// Token for a status control. `status` must not be [`DoseStatus::Unset`].
    pub fn set_status(key: DoseKey, status: DoseStatus) -> Self {
        Self::SetStatus { key, status }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        match raw {
            CONFIRM_TOKEN => return Ok(Self::Confirm),
            WEIGHT_YES_TOKEN => return Ok(Self::WeightUpdate { accept: true }),
            WEIGHT_NO_TOKEN => return Ok(Self::WeightUpdate { accept: false }),
            _ => {}
        }

        let invalid = || DosekeeperError::InvalidToken(raw.to_owned());
        let parts: Vec<&str> = raw.split('_').collect();
        let [prefix, kind, index, dose, action] = parts.as_slice() else {
            return Err(invalid());
        };
        if *prefix != STATUS_PREFIX {
            return Err(invalid());
        }

        let kind = MedicationKind::from_code(kind).ok_or_else(invalid)?;
        let index: usize = index.parse().map_err(|_| invalid())?;
        let dose_number: u32 = dose.parse().map_err(|_| invalid())?;
        let status = match *action {
            "taken" => DoseStatus::Taken,
            "delay" => DoseStatus::Delayed,
            _ => return Err(invalid()),
        };

        Ok(Self::SetStatus {
            key: DoseKey::new(kind, index, dose_number),
            status,
        })
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Confirm => CONFIRM_TOKEN.to_owned(),
            Self::WeightUpdate { accept: true } => WEIGHT_YES_TOKEN.to_owned(),
            Self::WeightUpdate { accept: false } => WEIGHT_NO_TOKEN.to_owned(),
            Self::SetStatus { key, status } => {
                let action = match status {
                    DoseStatus::Delayed => "delay",
                    DoseStatus::Taken | DoseStatus::Unset => "taken",
                };
                format!(
                    "{STATUS_PREFIX}_{}_{}_{}_{action}",
                    key.kind.code(),
                    key.index,
                    key.dose_number
                )
            }
        }
    }
}

impl std::str::FromStr for ActionToken {
    type Err = DosekeeperError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ActionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

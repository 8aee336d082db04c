//! Due-time matching at minute resolution.
//!
//! A dose is due when its scheduled instant and the poll instant fall in the
//! same wall-clock minute of the user's zone. Buckets carry their UTC offset,
//! so a local minute repeated by a DST fall-back is two distinct buckets.
//! The poller runs once a minute, so a dose matches exactly one poll.

use crate::model::{Dose, DoseKey, Inventory, MedicationKind, UserTimezone};
use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};

/// A dose found due by a poll, before it is merged into the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueDose {
    pub key: DoseKey,
    pub medication_name: String,
}

/// `true` if `dose` is untaken and due in the same minute as `now`.
pub fn is_due(dose: &Dose, now: DateTime<Utc>, zone: UserTimezone) -> bool {
    if dose.taken {
        return false;
    }
    let Some(scheduled_at) = dose.scheduled_at else {
        return false;
    };
    minute_bucket(scheduled_at, zone) == minute_bucket(now, zone)
}

/// Truncate `at` to the whole minute on the user's wall clock.
fn minute_bucket(at: DateTime<Utc>, zone: UserTimezone) -> DateTime<FixedOffset> {
    let local = zone.localize(at);
    local
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(local)
}

/// Scans inventories for due doses.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeMatcher {
    /// Extra minutes looked back to recover polls that never ran.
    catch_up_minutes: u32,
}

impl TimeMatcher {
    pub fn new(catch_up_minutes: u32) -> Self {
        Self { catch_up_minutes }
    }

    /// `true` if `dose` is due at `now`, widened by the catch-up window.
    pub fn matches(&self, dose: &Dose, now: DateTime<Utc>, zone: UserTimezone) -> bool {
        if self.catch_up_minutes == 0 {
            return is_due(dose, now, zone);
        }
        if dose.taken {
            return false;
        }
        let Some(scheduled_at) = dose.scheduled_at else {
            return false;
        };
        let current = minute_bucket(now, zone);
        let earliest = current - Duration::minutes(i64::from(self.catch_up_minutes));
        let bucket = minute_bucket(scheduled_at, zone);
        earliest <= bucket && bucket <= current
    }

    /// All due doses of an inventory, pens first, then bottles, then tablets.
    pub fn due_doses(
        &self,
        inventory: &Inventory,
        now: DateTime<Utc>,
        zone: UserTimezone,
    ) -> Vec<DueDose> {
        let mut due = Vec::new();
        for kind in MedicationKind::ALL {
            for (index, record) in inventory.records(kind).iter().enumerate() {
                for dose in &record.doses {
                    if self.matches(dose, now, zone) {
                        due.push(DueDose {
                            key: DoseKey::new(kind, index, dose.dose_number),
                            medication_name: record.name.clone(),
                        });
                    }
                }
            }
        }
        due
    }
}

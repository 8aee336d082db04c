//! Applying confirmed decisions to inventory.
//!
//! Every decided entry of the confirmed reminder is applied through its
//! kind's [`ResupplyPolicy`]; the reminder then leaves the ledger. The
//! caller persists inventory and ledger in one write, so a confirm is saved
//! whole or not at all. Re-applying an entry whose dose is already in the
//! target state never spends supply twice.

use crate::error::{DosekeeperError, Result};
use crate::model::{
    DoseStatus, MedicationKind, MedicationRecord, MessageRef, PendingEdit, User, UserTimezone,
};
use crate::reminders::ledger::DoseLedger;
use crate::reminders::policy::{Remaining, TakenOutcome, policy_for};
use crate::reminders::render::escape_markdown;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// What happened to one confirmed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryLine {
    pub kind: MedicationKind,
    pub medication_name: String,
    pub dose_number: u32,
    pub status: DoseStatus,
    /// `None` when the record no longer exists.
    pub remaining: Option<Remaining>,
}

impl std::fmt::Display for SummaryLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self.status {
            DoseStatus::Taken => "taken",
            DoseStatus::Delayed => "delayed",
            DoseStatus::Unset => "left unchanged",
        };
        let container = if self.kind == MedicationKind::Pen {
            "pen "
        } else {
            ""
        };
        write!(
            f,
            "*Dose {}* of {container}*{}* {verb}. ",
            self.dose_number,
            escape_markdown(&self.medication_name)
        )?;
        match self.remaining {
            Some(Remaining::PenDoses { remaining, total }) => {
                write!(f, "Remaining: *{remaining}/{total}* doses.")
            }
            Some(Remaining::Units { remaining, total }) => {
                write!(f, "Remaining: *{remaining}* of *{total}* doses.")
            }
            Some(Remaining::Exhausted) => f.write_str("Supply finished, medication removed."),
            None => f.write_str("Medication is no longer registered."),
        }
    }
}

/// Human-readable result of a confirm.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommitSummary {
    pub lines: Vec<SummaryLine>,
}

impl std::fmt::Display for CommitSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("✅ *Changes applied:*\n\n")?;
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Commits decided ledger entries.
#[derive(Debug, Clone, Copy)]
pub struct CommitEngine {
    delay: Duration,
}

impl CommitEngine {
    /// `delay` is how far a delayed dose is pushed from the confirm time.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Apply the reminder delivered as `message_ref` to `user`'s inventory.
    ///
    /// Fails with [`DosekeeperError::NoActiveReminder`] when no reminder has
    /// that reference and [`DosekeeperError::NothingToConfirm`] when none of
    /// its entries carries a decision. Only mutates `user` in memory.
    pub fn confirm(
        &self,
        user: &mut User,
        message_ref: &MessageRef,
        now: DateTime<Utc>,
        zone: UserTimezone,
    ) -> Result<CommitSummary> {
        let mut ledger = DoseLedger::new(&mut user.pending_reminders);
        let position = ledger
            .position_of(message_ref)
            .ok_or(DosekeeperError::NoActiveReminder)?;

        let changed: Vec<PendingEdit> = ledger.reminders()[position]
            .entries
            .iter()
            .filter(|e| e.status.is_set())
            .cloned()
            .collect();
        if changed.is_empty() {
            return Err(DosekeeperError::NothingToConfirm);
        }
        ledger.remove(position);

        let mut exhausted: BTreeSet<(MedicationKind, usize)> = BTreeSet::new();
        for entry in &changed {
            let Some(record) = user.medications.get_mut(entry.kind, entry.index) else {
                warn!(key = %entry.key(), "confirmed dose refers to a missing record");
                continue;
            };
            match entry.status {
                DoseStatus::Taken => {
                    let outcome = policy_for(entry.kind).apply_taken(
                        record,
                        entry.dose_number,
                        now,
                        zone,
                    );
                    match outcome {
                        TakenOutcome::Exhausted => {
                            exhausted.insert((entry.kind, entry.index));
                        }
                        TakenOutcome::AlreadyApplied => {
                            debug!(key = %entry.key(), "dose already taken, supply untouched");
                        }
                        TakenOutcome::MissingDose => {
                            warn!(key = %entry.key(), "confirmed dose is not in the record");
                        }
                        TakenOutcome::RolledOver => {
                            info!(key = %entry.key(), left = record.quantity, "pen finished, next pen started");
                        }
                        TakenOutcome::Recorded => {
                            debug!(key = %entry.key(), left = record.quantity, "dose taken");
                        }
                    }
                }
                DoseStatus::Delayed => self.delay_dose(record, entry, now),
                DoseStatus::Unset => {}
            }
        }

        let lines = changed
            .iter()
            .map(|entry| {
                let remaining = if exhausted.contains(&(entry.kind, entry.index)) {
                    Some(Remaining::Exhausted)
                } else {
                    user.medications
                        .get(entry.kind, entry.index)
                        .map(|record| policy_for(entry.kind).remaining(record))
                };
                SummaryLine {
                    kind: entry.kind,
                    medication_name: entry.medication_name.clone(),
                    dose_number: entry.dose_number,
                    status: entry.status,
                    remaining,
                }
            })
            .collect();

        // Highest index first so earlier removals do not shift later ones.
        for &(kind, index) in exhausted.iter().rev() {
            let removed = user.medications.records_mut(kind).remove(index);
            ledger.forget_medication(kind, index);
            info!(%kind, index, name = %removed.name, "supply finished, medication removed");
        }

        Ok(CommitSummary { lines })
    }

    fn delay_dose(&self, record: &mut MedicationRecord, entry: &PendingEdit, now: DateTime<Utc>) {
        let Some(dose) = record.dose_mut(entry.dose_number) else {
            warn!(key = %entry.key(), "delayed dose is not in the record");
            return;
        };
        if dose.taken {
            debug!(key = %entry.key(), "dose already taken, delay ignored");
            return;
        }
        dose.scheduled_at = Some(now + self.delay);
        debug!(key = %entry.key(), until = %(now + self.delay), "dose delayed");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::model::{Dose, DoseKey, Reminder, Schedule, ScheduleKind, UserKey};
    use chrono::TimeZone;

    fn t(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
    }

    fn zone() -> UserTimezone {
        UserTimezone::from_hours(3).unwrap()
    }

    fn engine() -> CommitEngine {
        CommitEngine::new(Duration::hours(3))
    }

    fn entry(kind: MedicationKind, index: usize, dose: u32, status: DoseStatus) -> PendingEdit {
        let mut e = PendingEdit::unset(DoseKey::new(kind, index, dose), format!("{kind}{index}"));
        e.status = status;
        e
    }

    fn user_with(entries: Vec<PendingEdit>) -> User {
        let mut user = User::new(UserKey::new("u"));
        let start = t(1, 5);
        for name in ["T0", "T1"] {
            user.medications.tablets.push(
                MedicationRecord::new(name, 3, Schedule::new(ScheduleKind::Daily, start))
                    .with_doses(vec![Dose::new(1, Some(start)), Dose::new(2, Some(t(2, 5)))]),
            );
        }
        user.medications.pens.push(
            MedicationRecord::new("P0", 2, Schedule::new(ScheduleKind::Weekly, start))
                .with_doses_per_pen(2)
                .with_doses(vec![Dose::new(1, Some(start)), Dose::new(2, Some(t(8, 5)))]),
        );
        user.pending_reminders
            .push(Reminder::delivered(MessageRef::new("m1"), entries, start));
        user
    }

    #[test]
    fn taken_tablet_decrements_and_clears_reminder() {
        let mut user = user_with(vec![
            entry(MedicationKind::Tablet, 0, 1, DoseStatus::Taken),
            entry(MedicationKind::Tablet, 1, 1, DoseStatus::Unset),
        ]);
        let summary = engine()
            .confirm(&mut user, &MessageRef::new("m1"), t(1, 6), zone())
            .unwrap();

        assert_eq!(user.medications.tablets[0].quantity, 2);
        assert_eq!(user.medications.tablets[1].quantity, 3);
        assert!(user.pending_reminders.is_empty());
        assert_eq!(summary.lines.len(), 1);
        assert_eq!(
            summary.lines[0].remaining,
            Some(Remaining::Units {
                remaining: 2,
                total: 3
            })
        );
    }

    #[test]
    fn reconfirming_already_applied_state_does_not_decrement_again() {
        let entries = vec![entry(MedicationKind::Tablet, 0, 1, DoseStatus::Taken)];
        let mut user = user_with(entries.clone());
        engine()
            .confirm(&mut user, &MessageRef::new("m1"), t(1, 6), zone())
            .unwrap();

        // The ledger write was lost but the inventory write landed.
        user.pending_reminders
            .push(Reminder::delivered(MessageRef::new("m1"), entries, t(1, 5)));
        engine()
            .confirm(&mut user, &MessageRef::new("m1"), t(1, 7), zone())
            .unwrap();

        assert_eq!(user.medications.tablets[0].quantity, 2);
    }

    #[test]
    fn both_pen_doses_in_one_batch_roll_the_pen() {
        let mut user = user_with(vec![
            entry(MedicationKind::Pen, 0, 1, DoseStatus::Taken),
            entry(MedicationKind::Pen, 0, 2, DoseStatus::Taken),
        ]);
        engine()
            .confirm(&mut user, &MessageRef::new("m1"), t(8, 6), zone())
            .unwrap();

        let pen = &user.medications.pens[0];
        assert_eq!(pen.quantity, 1);
        assert_eq!(pen.doses.len(), 2);
        assert!(pen.doses.iter().all(|d| !d.taken));
        assert_eq!(pen.doses[0].scheduled_at, Some(t(15, 5)));
    }

    #[test]
    fn delayed_dose_moves_without_touching_supply() {
        let mut user = user_with(vec![entry(MedicationKind::Tablet, 0, 1, DoseStatus::Delayed)]);
        let now = t(1, 5);
        let summary = engine()
            .confirm(&mut user, &MessageRef::new("m1"), now, zone())
            .unwrap();

        let dose = user.medications.tablets[0].dose(1).unwrap();
        assert_eq!(dose.scheduled_at, Some(now + Duration::hours(3)));
        assert!(!dose.taken);
        assert_eq!(user.medications.tablets[0].quantity, 3);
        assert!(summary.to_string().contains("delayed"));
    }

    #[test]
    fn exhausted_record_is_removed_and_ledger_reindexed() {
        let mut user = user_with(vec![entry(MedicationKind::Tablet, 0, 1, DoseStatus::Taken)]);
        user.medications.tablets[0].quantity = 1;
        // A second, undelivered reminder points at the record behind it.
        user.pending_reminders.push(Reminder::undelivered(
            vec![entry(MedicationKind::Tablet, 1, 2, DoseStatus::Unset)],
            t(1, 5),
        ));

        let summary = engine()
            .confirm(&mut user, &MessageRef::new("m1"), t(1, 6), zone())
            .unwrap();

        assert_eq!(user.medications.tablets.len(), 1);
        assert_eq!(user.medications.tablets[0].name, "T1");
        assert_eq!(summary.lines[0].remaining, Some(Remaining::Exhausted));
        assert_eq!(user.pending_reminders.len(), 1);
        assert_eq!(user.pending_reminders[0].entries[0].index, 0);
    }

    #[test]
    fn removals_in_one_batch_use_original_indices() {
        let mut user = user_with(vec![
            entry(MedicationKind::Tablet, 0, 1, DoseStatus::Taken),
            entry(MedicationKind::Tablet, 1, 1, DoseStatus::Taken),
        ]);
        user.medications.tablets[0].quantity = 1;
        user.medications.tablets[1].quantity = 1;

        engine()
            .confirm(&mut user, &MessageRef::new("m1"), t(1, 6), zone())
            .unwrap();
        assert!(user.medications.tablets.is_empty());
        assert_eq!(user.medications.pens.len(), 1);
    }

    #[test]
    fn unknown_reference_has_no_active_reminder() {
        let mut user = user_with(vec![entry(MedicationKind::Tablet, 0, 1, DoseStatus::Taken)]);
        let err = engine()
            .confirm(&mut user, &MessageRef::new("other"), t(1, 6), zone())
            .unwrap_err();
        assert!(matches!(err, DosekeeperError::NoActiveReminder));
    }

    #[test]
    fn undecided_reminder_has_nothing_to_confirm() {
        let mut user = user_with(vec![entry(MedicationKind::Tablet, 0, 1, DoseStatus::Unset)]);
        let err = engine()
            .confirm(&mut user, &MessageRef::new("m1"), t(1, 6), zone())
            .unwrap_err();
        assert!(matches!(err, DosekeeperError::NothingToConfirm));
        assert_eq!(user.pending_reminders.len(), 1);
    }

    #[test]
    fn summary_formats_each_kind() {
        let pen = SummaryLine {
            kind: MedicationKind::Pen,
            medication_name: "Insulin".to_owned(),
            dose_number: 1,
            status: DoseStatus::Taken,
            remaining: Some(Remaining::PenDoses {
                remaining: 1,
                total: 2,
            }),
        };
        assert_eq!(
            pen.to_string(),
            "*Dose 1* of pen *Insulin* taken. Remaining: *1/2* doses."
        );

        let tablet = SummaryLine {
            kind: MedicationKind::Tablet,
            medication_name: "Aspirin".to_owned(),
            dose_number: 2,
            status: DoseStatus::Delayed,
            remaining: Some(Remaining::Units {
                remaining: 4,
                total: 5,
            }),
        };
        assert_eq!(
            tablet.to_string(),
            "*Dose 2* of *Aspirin* delayed. Remaining: *4* of *5* doses."
        );

        let removed = SummaryLine {
            kind: MedicationKind::Bottle,
            medication_name: "B_12".to_owned(),
            dose_number: 1,
            status: DoseStatus::Taken,
            remaining: Some(Remaining::Exhausted),
        };
        assert_eq!(
            removed.to_string(),
            r"*Dose 1* of *B\_12* taken. Supply finished, medication removed."
        );
    }
}

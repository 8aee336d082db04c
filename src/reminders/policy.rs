//! Per-kind resupply policies applied when a dose is confirmed as taken.
//!
//! Bottles and tablets spend one unit per dose. A pen spends a unit only
//! once every dose of its cycle is taken, then opens the next pen with a
//! fresh cycle.

use crate::model::{Dose, MedicationKind, MedicationRecord, UserTimezone};
use chrono::{DateTime, Utc};

/// Effect of applying a taken dose to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakenOutcome {
    /// The dose was already taken; nothing changed.
    AlreadyApplied,
    /// The dose is now taken and the record stays.
    Recorded,
    /// A pen was finished and a new cycle started.
    RolledOver,
    /// Supply reached zero; the record must be removed.
    Exhausted,
    /// The record has no dose with this number.
    MissingDose,
}

/// Remaining supply after a commit, as reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    /// Untaken doses of the current pen out of its cycle size.
    PenDoses { remaining: usize, total: usize },
    /// Units left out of units left plus doses taken.
    Units { remaining: u32, total: u32 },
    /// The record was removed.
    Exhausted,
}

/// Resupply strategy for one medication kind.
pub trait ResupplyPolicy: Send + Sync {
    /// Mark `dose_number` taken at `now` and adjust supply.
    fn apply_taken(
        &self,
        record: &mut MedicationRecord,
        dose_number: u32,
        now: DateTime<Utc>,
        zone: UserTimezone,
    ) -> TakenOutcome;

    /// Remaining supply of a record that still exists.
    fn remaining(&self, record: &MedicationRecord) -> Remaining;
}

/// Policy for `kind`.
pub fn policy_for(kind: MedicationKind) -> &'static dyn ResupplyPolicy {
    match kind {
        MedicationKind::Pen => &PenPolicy,
        MedicationKind::Bottle | MedicationKind::Tablet => &UnitPolicy,
    }
}

fn mark_taken(dose: &mut Dose, now: DateTime<Utc>) {
    dose.taken = true;
    dose.taken_at = Some(now);
}

/// One dose, one unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitPolicy;

impl ResupplyPolicy for UnitPolicy {
    fn apply_taken(
        &self,
        record: &mut MedicationRecord,
        dose_number: u32,
        now: DateTime<Utc>,
        _zone: UserTimezone,
    ) -> TakenOutcome {
        let Some(dose) = record.dose_mut(dose_number) else {
            return TakenOutcome::MissingDose;
        };
        if dose.taken {
            return TakenOutcome::AlreadyApplied;
        }
        mark_taken(dose, now);

        record.quantity = record.quantity.saturating_sub(1);
        record.last_updated = Some(now);
        if record.quantity == 0 {
            TakenOutcome::Exhausted
        } else {
            TakenOutcome::Recorded
        }
    }

    fn remaining(&self, record: &MedicationRecord) -> Remaining {
        let taken = u32::try_from(record.taken_doses()).unwrap_or(u32::MAX);
        Remaining::Units {
            remaining: record.quantity,
            total: taken.saturating_add(record.quantity),
        }
    }
}

/// Multi-dose container with a rolling cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct PenPolicy;

impl PenPolicy {
    /// Replace the finished cycle with a fresh one.
    ///
    /// The new cycle continues the old cadence: it steps from the last
    /// scheduled dose of the old cycle (or from `now` if none was scheduled)
    /// until the first dose lies after `now`. Manual schedules get
    /// unscheduled doses.
    fn start_next_pen(record: &mut MedicationRecord, now: DateTime<Utc>, zone: UserTimezone) {
        let step = record.schedule.kind;
        let anchor = record.last_scheduled_at().unwrap_or(now);
        let size = record
            .doses_per_pen
            .filter(|n| *n > 0)
            .unwrap_or_else(|| u32::try_from(record.doses.len()).unwrap_or(1))
            .max(1);

        let mut next = step.advance(anchor, zone);
        while let Some(at) = next.filter(|at| *at <= now) {
            next = step.advance(at, zone).filter(|after| *after > at);
        }
        if let Some(first) = next {
            record.schedule.start_date = first;
        }

        record.doses = (1..=size)
            .map(|dose_number| {
                let dose = Dose::new(dose_number, next);
                next = next.and_then(|at| step.advance(at, zone));
                dose
            })
            .collect();
    }
}

impl ResupplyPolicy for PenPolicy {
    fn apply_taken(
        &self,
        record: &mut MedicationRecord,
        dose_number: u32,
        now: DateTime<Utc>,
        zone: UserTimezone,
    ) -> TakenOutcome {
        let Some(dose) = record.dose_mut(dose_number) else {
            return TakenOutcome::MissingDose;
        };
        if dose.taken {
            return TakenOutcome::AlreadyApplied;
        }
        mark_taken(dose, now);
        record.last_updated = Some(now);

        if !record.doses.iter().all(|d| d.taken) {
            return TakenOutcome::Recorded;
        }

        record.quantity = record.quantity.saturating_sub(1);
        if record.quantity == 0 {
            return TakenOutcome::Exhausted;
        }
        Self::start_next_pen(record, now, zone);
        TakenOutcome::RolledOver
    }

    fn remaining(&self, record: &MedicationRecord) -> Remaining {
        Remaining::PenDoses {
            remaining: record.untaken_doses(),
            total: record.doses.len(),
        }
    }
}

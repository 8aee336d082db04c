//! Medication inventory records and their dose schedules.

use super::UserTimezone;
use chrono::{DateTime, Days, Months, Utc};
use serde::{Deserialize, Serialize};

/// Kind of medication container. Each kind has its own resupply policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedicationKind {
    /// Multi-dose container; a unit is consumed once every dose is taken.
    Pen,
    /// One dose per unit.
    Bottle,
    /// One dose per unit.
    Tablet,
}

impl MedicationKind {
    /// Scan order used by the poller.
    pub const ALL: [Self; 3] = [Self::Pen, Self::Bottle, Self::Tablet];

    /// Stable short code used in action tokens.
    pub fn code(self) -> &'static str {
        match self {
            Self::Pen => "pen",
            Self::Bottle => "bottle",
            Self::Tablet => "tablet",
        }
    }

    /// Parse a short code produced by [`code`](Self::code).
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "pen" => Some(Self::Pen),
            "bottle" => Some(Self::Bottle),
            "tablet" => Some(Self::Tablet),
            _ => None,
        }
    }
}

impl std::fmt::Display for MedicationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Repetition of a medication schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    /// Dose times are entered by hand; there is no step.
    #[default]
    Manual,
    Daily,
    Weekly,
    Monthly,
}

impl ScheduleKind {
    /// Advance `at` by one schedule step, evaluated on the user's wall clock.
    ///
    /// Returns `None` for manual schedules. Steps keep the local time of day
    /// across DST changes; monthly steps clamp to the last day of shorter
    /// months.
    pub fn advance(self, at: DateTime<Utc>, zone: UserTimezone) -> Option<DateTime<Utc>> {
        let local = zone.localize(at).naive_local();
        let next = match self {
            Self::Manual => return None,
            Self::Daily => local.checked_add_days(Days::new(1))?,
            Self::Weekly => local.checked_add_days(Days::new(7))?,
            Self::Monthly => local.checked_add_months(Months::new(1))?,
        };
        zone.to_utc(next)
    }
}

impl std::fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => f.write_str("manual"),
            Self::Daily => f.write_str("daily"),
            Self::Weekly => f.write_str("weekly"),
            Self::Monthly => f.write_str("monthly"),
        }
    }
}

/// Schedule of a medication record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(rename = "type")]
    pub kind: ScheduleKind,
    /// First dose of the current cycle.
    pub start_date: DateTime<Utc>,
}

impl Schedule {
    pub fn new(kind: ScheduleKind, start_date: DateTime<Utc>) -> Self {
        Self { kind, start_date }
    }
}

/// One scheduled administration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dose {
    /// 1-based position within the current cycle.
    pub dose_number: u32,
    #[serde(default)]
    pub taken: bool,
    #[serde(default)]
    pub taken_at: Option<DateTime<Utc>>,
    /// Absolute due instant. `None` while a manual schedule awaits a time.
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl Dose {
    /// A fresh, untaken dose.
    pub fn new(dose_number: u32, scheduled_at: Option<DateTime<Utc>>) -> Self {
        Self {
            dose_number,
            taken: false,
            taken_at: None,
            scheduled_at,
        }
    }
}

/// A registered medication and its current dose cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationRecord {
    pub name: String,
    /// Containers (pens) or units (bottles, tablets) remaining.
    pub quantity: u32,
    /// Doses held by one pen. Ignored for other kinds.
    #[serde(default)]
    pub doses_per_pen: Option<u32>,
    #[serde(default)]
    pub doses: Vec<Dose>,
    pub schedule: Schedule,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl MedicationRecord {
    pub fn new(name: impl Into<String>, quantity: u32, schedule: Schedule) -> Self {
        Self {
            name: name.into(),
            quantity,
            doses_per_pen: None,
            doses: Vec::new(),
            schedule,
            last_updated: None,
        }
    }

    /// Builder-style setter for the dose list.
    pub fn with_doses(mut self, doses: Vec<Dose>) -> Self {
        self.doses = doses;
        self
    }

    /// Builder-style setter for the pen size.
    pub fn with_doses_per_pen(mut self, doses_per_pen: u32) -> Self {
        self.doses_per_pen = Some(doses_per_pen);
        self
    }

    pub fn dose(&self, dose_number: u32) -> Option<&Dose> {
        self.doses.iter().find(|d| d.dose_number == dose_number)
    }

    pub fn dose_mut(&mut self, dose_number: u32) -> Option<&mut Dose> {
        self.doses.iter_mut().find(|d| d.dose_number == dose_number)
    }

    pub fn taken_doses(&self) -> usize {
        self.doses.iter().filter(|d| d.taken).count()
    }

    pub fn untaken_doses(&self) -> usize {
        self.doses.len() - self.taken_doses()
    }

    /// Latest scheduled instant across the current doses.
    pub fn last_scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.doses.iter().filter_map(|d| d.scheduled_at).max()
    }
}

/// The three parallel medication collections of a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Inventory {
    pub pens: Vec<MedicationRecord>,
    pub bottles: Vec<MedicationRecord>,
    pub tablets: Vec<MedicationRecord>,
}

impl Inventory {
    pub fn records(&self, kind: MedicationKind) -> &[MedicationRecord] {
        match kind {
            MedicationKind::Pen => &self.pens,
            MedicationKind::Bottle => &self.bottles,
            MedicationKind::Tablet => &self.tablets,
        }
    }

    pub fn records_mut(&mut self, kind: MedicationKind) -> &mut Vec<MedicationRecord> {
        match kind {
            MedicationKind::Pen => &mut self.pens,
            MedicationKind::Bottle => &mut self.bottles,
            MedicationKind::Tablet => &mut self.tablets,
        }
    }

    pub fn get(&self, kind: MedicationKind, index: usize) -> Option<&MedicationRecord> {
        self.records(kind).get(index)
    }

    pub fn get_mut(&mut self, kind: MedicationKind, index: usize) -> Option<&mut MedicationRecord> {
        self.records_mut(kind).get_mut(index)
    }

    /// Total number of registered records across all kinds.
    pub fn len(&self) -> usize {
        self.pens.len() + self.bottles.len() + self.tablets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! User timezones.
//!
//! Profiles store IANA names (`Europe/Moscow`, `America/New_York`) or the
//! POSIX `Etc/GMT-3` form, whose sign is inverted. Users choose fixed zones
//! as `UTC+3`, which is stored as the matching `Etc/GMT∓N` zone. Offsets
//! that are not whole hours (`+05:30`) have no `Etc` zone and are kept as
//! fixed offsets.

use crate::error::{DosekeeperError, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

/// Zone assumed when a profile carries none.
pub const DEFAULT_TIMEZONE: &str = "Etc/GMT-3";

const MAX_OFFSET_SECS: i32 = 14 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zone {
    Named(Tz),
    Fixed(FixedOffset),
}

/// A parsed user timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserTimezone {
    zone: Zone,
}

impl UserTimezone {
    pub fn named(tz: Tz) -> Self {
        Self {
            zone: Zone::Named(tz),
        }
    }

    /// Build from whole hours east of UTC.
    pub fn from_hours(hours: i32) -> Result<Self> {
        let secs = hours
            .checked_mul(3600)
            .ok_or_else(|| DosekeeperError::Timezone(format!("offset {hours}h is out of range")))?;
        Self::from_seconds(secs)
    }

    fn from_seconds(secs: i32) -> Result<Self> {
        if secs.abs() > MAX_OFFSET_SECS {
            return Err(DosekeeperError::Timezone(format!(
                "offset {secs}s is out of range"
            )));
        }
        if let Some(tz) = (secs % 3600 == 0).then(|| etc_zone(secs / 3600)).flatten() {
            return Ok(Self::named(tz));
        }
        FixedOffset::east_opt(secs)
            .map(|offset| Self {
                zone: Zone::Fixed(offset),
            })
            .ok_or_else(|| DosekeeperError::Timezone(format!("invalid offset {secs}s")))
    }

    /// Parse a stored zone identifier.
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(DosekeeperError::Timezone("empty timezone".to_owned()));
        }

        let upper = raw.to_ascii_uppercase();
        if matches!(upper.as_str(), "UTC" | "GMT" | "Z" | "ETC/UTC" | "ETC/GMT") {
            return Self::from_seconds(0);
        }

        if let Ok(tz) = raw.parse::<Tz>() {
            return Ok(Self::named(tz));
        }

        if let Some(rest) = upper.strip_prefix("ETC/GMT") {
            // POSIX style: Etc/GMT-3 is three hours east of UTC.
            let secs = parse_signed_offset(rest)
                .ok_or_else(|| DosekeeperError::Timezone(format!("unrecognised zone '{raw}'")))?;
            return Self::from_seconds(-secs);
        }

        let rest = upper
            .strip_prefix("UTC")
            .or_else(|| upper.strip_prefix("GMT"))
            .unwrap_or(&upper);
        let secs = parse_signed_offset(rest)
            .ok_or_else(|| DosekeeperError::Timezone(format!("unrecognised zone '{raw}'")))?;
        Self::from_seconds(secs)
    }

    /// Parse `input`, falling back to `fallback` when absent or invalid.
    pub fn resolve(input: Option<&str>, fallback: Self) -> Self {
        match input {
            None => fallback,
            Some(raw) => Self::parse(raw).unwrap_or_else(|e| {
                tracing::warn!(zone = raw, "falling back to default timezone: {e}");
                fallback
            }),
        }
    }

    /// UTC offset in force at `at`.
    pub fn offset_at(&self, at: DateTime<Utc>) -> FixedOffset {
        match self.zone {
            Zone::Named(tz) => tz.offset_from_utc_datetime(&at.naive_utc()).fix(),
            Zone::Fixed(offset) => offset,
        }
    }

    /// `at` on the user's wall clock.
    pub fn localize(&self, at: DateTime<Utc>) -> DateTime<FixedOffset> {
        at.with_timezone(&self.offset_at(at))
    }

    /// Map a wall-clock time back to an instant.
    ///
    /// Ambiguous times take the earlier instant. Times skipped by a DST
    /// jump move forward by an hour.
    pub fn to_utc(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self.zone {
            Zone::Named(tz) => earliest_instant(&tz, local),
            Zone::Fixed(offset) => earliest_instant(&offset, local),
        }
    }

    /// Storage form: the zone name, or `UTC±HH:MM` for fractional offsets.
    pub fn canonical_name(&self) -> String {
        match self.zone {
            Zone::Named(tz) => tz.name().to_owned(),
            Zone::Fixed(_) => self.utc_label(),
        }
    }

    /// Display form offered to users, e.g. `UTC+3`, `UTC+05:30` or the
    /// IANA name for zones with daylight saving.
    pub fn utc_label(&self) -> String {
        match self.zone {
            Zone::Named(tz) if !tz.name().starts_with("Etc/") => tz.name().to_owned(),
            Zone::Named(tz) => {
                format_offset(tz.offset_from_utc_datetime(&NaiveDateTime::default()).fix())
            }
            Zone::Fixed(offset) => format_offset(offset),
        }
    }
}

impl Default for UserTimezone {
    fn default() -> Self {
        Self::named(Tz::Etc__GMTMinus3)
    }
}

impl std::str::FromStr for UserTimezone {
    type Err = DosekeeperError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for UserTimezone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical_name())
    }
}

/// `Etc/GMT` zone for whole hours east of UTC. The family spans -12..=+14.
fn etc_zone(hours: i32) -> Option<Tz> {
    if !(-12..=14).contains(&hours) {
        return None;
    }
    if hours == 0 {
        return "Etc/GMT".parse().ok();
    }
    let sign = if hours > 0 { '-' } else { '+' };
    format!("Etc/GMT{sign}{}", hours.abs()).parse().ok()
}

fn earliest_instant<Z: TimeZone>(zone: &Z, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    zone.from_local_datetime(&local)
        .earliest()
        .or_else(|| {
            zone.from_local_datetime(&(local + Duration::hours(1)))
                .earliest()
        })
        .map(|at| at.with_timezone(&Utc))
}

fn format_offset(offset: FixedOffset) -> String {
    let secs = offset.local_minus_utc();
    let sign = if secs < 0 { '-' } else { '+' };
    let abs = secs.abs();
    if abs % 3600 == 0 {
        format!("UTC{sign}{}", abs / 3600)
    } else {
        format!("UTC{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60)
    }
}

/// Parse `+3`, `-11`, `+05:30`, `+0530` into seconds east of UTC.
fn parse_signed_offset(text: &str) -> Option<i32> {
    let (sign, digits) = match text.chars().next()? {
        '+' => (1, &text[1..]),
        '-' => (-1, &text[1..]),
        _ => return None,
    };
    if digits.is_empty() {
        return None;
    }

    let (hours, minutes) = if let Some((h, m)) = digits.split_once(':') {
        (h, m)
    } else if digits.len() == 4 {
        digits.split_at(2)
    } else {
        (digits, "0")
    };

    if hours.is_empty() || hours.len() > 2 || minutes.len() > 2 {
        return None;
    }
    if !hours.chars().all(|c| c.is_ascii_digit()) || !minutes.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    hours
        .checked_mul(3600)?
        .checked_add(minutes * 60)?
        .checked_mul(sign)
}

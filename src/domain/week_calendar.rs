//! Custom week arithmetic for the weekly reset.
//!
//! A tracker week starts at the reset boundary (Thursday 00:00 UTC) and ends
//! exactly seven days later. Every conversion between dates, week keys and labels
//! goes through this module; week numbers are never added or subtracted directly
//! because they do not advance linearly across year boundaries.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub const EPOCH_WEEKDAY: Weekday = Weekday::Thu;

const DAYS_PER_WEEK: i64 = 7;
const MIN_KEY_YEAR: i32 = 1;
const MAX_KEY_YEAR: i32 = 9999;
const MAX_WEEK_NUMBER: u32 = 53;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeekKeyParseError {
    #[error("week key must not be empty")]
    Empty,
    #[error("week key '{0}' must have the form YYYY-W or YYYY-P-S")]
    Shape(String),
    #[error("week key '{key}' has an invalid {field}")]
    Field { key: String, field: &'static str },
    #[error("week key '{key}' names week {week} but {year} has only {available} reset weeks")]
    OutOfRange {
        key: String,
        year: i32,
        week: u32,
        available: u32,
    },
}

/// Identifier of one reset week.
///
/// Equality, ordering and hashing only look at `(year, primary)`, so a legacy
/// two-field key and the modern key for the same week are interchangeable.
#[derive(Debug, Clone, Copy)]
pub enum WeekKey {
    Legacy { year: i32, week: u32 },
    Modern { year: i32, primary: u32, secondary: u32 },
}

impl WeekKey {
    pub fn parse(value: &str) -> Result<Self, WeekKeyParseError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(WeekKeyParseError::Empty);
        }

        let fields: Vec<&str> = trimmed.split('-').collect();
        let parse_number = |raw: &str, field: &'static str| {
            raw.parse::<u32>()
                .ok()
                .filter(|number| (1..=MAX_WEEK_NUMBER).contains(number))
                .ok_or_else(|| WeekKeyParseError::Field {
                    key: trimmed.to_string(),
                    field,
                })
        };

        let year = fields
            .first()
            .and_then(|raw| raw.parse::<i32>().ok())
            .filter(|year| (MIN_KEY_YEAR..=MAX_KEY_YEAR).contains(year))
            .ok_or_else(|| WeekKeyParseError::Field {
                key: trimmed.to_string(),
                field: "year",
            })?;

        let key = match fields.as_slice() {
            [_, week] => WeekKey::Legacy {
                year,
                week: parse_number(week, "week number")?,
            },
            [_, primary, secondary] => WeekKey::Modern {
                year,
                primary: parse_number(primary, "primary week number")?,
                secondary: parse_number(secondary, "secondary week number")?,
            },
            _ => return Err(WeekKeyParseError::Shape(trimmed.to_string())),
        };

        let available = reset_weeks_in_year(year);
        if key.primary() > available {
            return Err(WeekKeyParseError::OutOfRange {
                key: trimmed.to_string(),
                year,
                week: key.primary(),
                available,
            });
        }
        Ok(key)
    }

    pub fn year(&self) -> i32 {
        match *self {
            WeekKey::Legacy { year, .. } | WeekKey::Modern { year, .. } => year,
        }
    }

    pub fn primary(&self) -> u32 {
        match *self {
            WeekKey::Legacy { week, .. } => week,
            WeekKey::Modern { primary, .. } => primary,
        }
    }

    /// Legacy keys carry a single week number, which doubles as the secondary.
    pub fn secondary(&self) -> u32 {
        match *self {
            WeekKey::Legacy { week, .. } => week,
            WeekKey::Modern { secondary, .. } => secondary,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, WeekKey::Legacy { .. })
    }

    /// First day of the week (the reset day).
    pub fn start_date(&self) -> NaiveDate {
        first_reset_of_year(self.year()) + Duration::days(DAYS_PER_WEEK * (i64::from(self.primary()) - 1))
    }

    /// Re-derives the canonical modern key for the same week.
    pub fn canonical(&self) -> WeekKey {
        week_key_for_naive_date(self.start_date())
    }

    fn ordering_fields(&self) -> (i32, u32) {
        (self.year(), self.primary())
    }
}

impl PartialEq for WeekKey {
    fn eq(&self, other: &Self) -> bool {
        self.ordering_fields() == other.ordering_fields()
    }
}

impl Eq for WeekKey {}

impl Hash for WeekKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ordering_fields().hash(state);
    }
}

impl PartialOrd for WeekKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WeekKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordering_fields().cmp(&other.ordering_fields())
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            WeekKey::Legacy { year, week } => write!(f, "{year}-{week}"),
            WeekKey::Modern {
                year,
                primary,
                secondary,
            } => write!(f, "{year}-{primary}-{secondary}"),
        }
    }
}

impl FromStr for WeekKey {
    type Err = WeekKeyParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        WeekKey::parse(value)
    }
}

impl Serialize for WeekKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WeekKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        WeekKey::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl WeekRange {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }
}

fn reset_on_or_before(date: NaiveDate) -> NaiveDate {
    let back = (date.weekday().num_days_from_monday() + 7 - EPOCH_WEEKDAY.num_days_from_monday()) % 7;
    date - Duration::days(i64::from(back))
}

fn first_reset_of_year(year: i32) -> NaiveDate {
    // Years are range-checked when keys are parsed, and dates always carry a valid year.
    let jan1 = NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(NaiveDate::MIN);
    let forward = (EPOCH_WEEKDAY.num_days_from_monday() + 7 - jan1.weekday().num_days_from_monday()) % 7;
    jan1 + Duration::days(i64::from(forward))
}

/// Number of reset days between January 1 of `date`'s year and `date`, inclusive.
fn resets_through(date: NaiveDate) -> u32 {
    let first = first_reset_of_year(date.year());
    if date < first {
        return 0;
    }
    ((date - first).num_days() / DAYS_PER_WEEK) as u32 + 1
}

fn reset_weeks_in_year(year: i32) -> u32 {
    NaiveDate::from_ymd_opt(year, 12, 31)
        .map(resets_through)
        .unwrap_or(MAX_WEEK_NUMBER)
}

pub fn week_key_for_naive_date(date: NaiveDate) -> WeekKey {
    let start = reset_on_or_before(date);
    let last_day = start + Duration::days(DAYS_PER_WEEK - 1);
    WeekKey::Modern {
        year: start.year(),
        primary: resets_through(start),
        // The last day can sit in the partial period before the next year's first reset.
        secondary: resets_through(last_day).max(1),
    }
}

pub fn week_key_for_date(instant: DateTime<Utc>) -> WeekKey {
    week_key_for_naive_date(instant.date_naive())
}

/// Key of the week `offset` resets after (or before, when negative) `base`.
///
/// Offsets that would leave the representable calendar saturate at `base`.
pub fn week_key_offset(offset: i64, base: &WeekKey) -> WeekKey {
    let start = base.start_date();
    Duration::try_days(offset.saturating_mul(DAYS_PER_WEEK))
        .and_then(|delta| start.checked_add_signed(delta))
        .filter(|date| (MIN_KEY_YEAR..=MAX_KEY_YEAR).contains(&date.year()))
        .map(week_key_for_naive_date)
        .unwrap_or_else(|| base.canonical())
}

pub fn date_range_for_key(key: &WeekKey) -> WeekRange {
    let start = key.start_date().and_time(NaiveTime::MIN).and_utc();
    WeekRange {
        start,
        end: start + Duration::days(DAYS_PER_WEEK) - Duration::milliseconds(1),
    }
}

/// Signed number of resets from `base` to `target`.
pub fn offset_between(target: &WeekKey, base: &WeekKey) -> i64 {
    let days = (target.start_date() - base.start_date()).num_days();
    (days as f64 / DAYS_PER_WEEK as f64).round() as i64
}

pub fn compare(left: &WeekKey, right: &WeekKey) -> Ordering {
    left.cmp(right)
}

pub fn label(key: &WeekKey, current: Option<&WeekKey>) -> String {
    let range = date_range_for_key(key);
    let start = range.start.date_naive();
    let end = range.end.date_naive();
    let span = if start.year() == end.year() {
        format!("{} - {}", start.format("%b %-d"), end.format("%b %-d, %Y"))
    } else {
        format!("{} - {}", start.format("%b %-d, %Y"), end.format("%b %-d, %Y"))
    };

    if current.is_some_and(|current| current == key) {
        format!("Current Week ({span})")
    } else {
        format!("Week {} of {} ({span})", key.primary(), key.year())
    }
}

/// Labels a raw stored key, degrading to a placeholder when it does not parse.
pub fn label_for_raw(raw: &str, current: Option<&WeekKey>) -> String {
    match WeekKey::parse(raw) {
        Ok(key) => label(&key, current),
        Err(error) => {
            log::debug!("cannot label week key: {error}");
            "Unknown Week".to_string()
        }
    }
}

/// Clock-aware entry point for everything relative to "now".
#[derive(Clone)]
pub struct WeekCalendar {
    now_provider: NowProvider,
}

impl Default for WeekCalendar {
    fn default() -> Self {
        Self {
            now_provider: Arc::new(Utc::now),
        }
    }
}

impl fmt::Debug for WeekCalendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeekCalendar").finish_non_exhaustive()
    }
}

impl WeekCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    pub fn now_provider(&self) -> NowProvider {
        Arc::clone(&self.now_provider)
    }

    pub fn current_week_key(&self) -> WeekKey {
        week_key_for_date(self.now())
    }

    pub fn week_key_offset(&self, offset: i64, base: Option<&WeekKey>) -> WeekKey {
        match base {
            Some(base) => week_key_offset(offset, base),
            None => week_key_offset(offset, &self.current_week_key()),
        }
    }

    pub fn offset_between(&self, target: &WeekKey, base: Option<&WeekKey>) -> i64 {
        match base {
            Some(base) => offset_between(target, base),
            None => offset_between(target, &self.current_week_key()),
        }
    }

    /// Zero for the current week, negative for past weeks.
    pub fn offset_from_current(&self, key: &WeekKey) -> i64 {
        offset_between(key, &self.current_week_key())
    }

    pub fn is_current(&self, key: &WeekKey) -> bool {
        *key == self.current_week_key()
    }

    pub fn label(&self, key: &WeekKey) -> String {
        label(key, Some(&self.current_week_key()))
    }
}

//! ISO-8601 week identifier used to key every settlement artifact.
//!
//! Week numbering follows the ISO rule (a week belongs to the year that owns
//! its Thursday), which chrono implements via [`NaiveDate::iso_week`]. The
//! year boundary is where hand-rolled week math usually breaks, so the value
//! type leans on chrono for both directions of the conversion.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An ISO week such as `2026-W07`, with Monday–Sunday bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WeekId {
    year: i32,
    week: u32,
}

impl WeekId {
    pub fn new(year: i32, week: u32) -> Result<Self, WeekIdError> {
        if week == 0 || NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).is_none() {
            return Err(WeekIdError::OutOfRange { year, week });
        }
        Ok(Self { year, week })
    }

    /// The week containing `date` under ISO numbering.
    pub fn from_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn week(&self) -> u32 {
        self.week
    }

    /// Monday of this week.
    pub fn start(&self) -> NaiveDate {
        // `new` validated the (year, week) pair, so this cannot fail.
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon)
            .unwrap_or(NaiveDate::MIN)
    }

    /// Sunday of this week.
    pub fn end(&self) -> NaiveDate {
        self.start() + chrono::Duration::days(6)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start() && date <= self.end()
    }

    pub fn next(&self) -> Self {
        Self::from_date(self.start() + chrono::Duration::days(7))
    }

    /// Whole weeks elapsed since `earlier`. Negative when `earlier` is later.
    pub fn weeks_since(&self, earlier: WeekId) -> i64 {
        (self.start() - earlier.start()).num_days() / 7
    }
}

impl fmt::Display for WeekId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-W{:02}", self.year, self.week)
    }
}

impl FromStr for WeekId {
    type Err = WeekIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (year_part, week_part) = trimmed
            .split_once("-W")
            .ok_or_else(|| WeekIdError::Malformed(trimmed.to_string()))?;
        let year = year_part
            .parse::<i32>()
            .map_err(|_| WeekIdError::Malformed(trimmed.to_string()))?;
        let week = week_part
            .parse::<u32>()
            .map_err(|_| WeekIdError::Malformed(trimmed.to_string()))?;
        Self::new(year, week)
    }
}

impl TryFrom<String> for WeekId {
    type Error = WeekIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WeekId> for String {
    fn from(value: WeekId) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WeekIdError {
    #[error("week identifier '{0}' is not in YYYY-Www form")]
    Malformed(String),
    #[error("{year}-W{week:02} is not a valid ISO week")]
    OutOfRange { year: i32, week: u32 },
}

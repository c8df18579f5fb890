//! Calendar month and quarter values used by timing questions.

use chrono::{DateTime, Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Calendar month, keyed as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    #[must_use]
    pub const fn new(year: i32, month: u32) -> Option<Self> {
        if month >= 1 && month <= 12 {
            Some(Self { year, month })
        } else {
            None
        }
    }

    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Month containing a unix timestamp (UTC).
    #[must_use]
    pub fn from_timestamp(secs: i64) -> Option<Self> {
        DateTime::from_timestamp(secs, 0).map(|dt| Self::from_date(dt.date_naive()))
    }

    /// Parse `YYYY-MM`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let (year, month) = text.trim().split_once('-')?;
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }

    /// Months since year zero, for arithmetic.
    #[must_use]
    pub fn ordinal(self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    #[must_use]
    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        let year = i32::try_from(ordinal.div_euclid(12)).ok()?;
        let month = u32::try_from(ordinal.rem_euclid(12) + 1).ok()?;
        Self::new(year, month)
    }

    #[must_use]
    pub fn offset(self, months: i64) -> Option<Self> {
        Self::from_ordinal(self.ordinal() + months)
    }

    /// Display form used in choices: `June 2024`.
    #[must_use]
    pub fn display(self) -> String {
        let name = usize::try_from(self.month - 1)
            .ok()
            .and_then(|idx| MONTH_NAMES.get(idx))
            .copied()
            .unwrap_or("Unknown");
        format!("{name} {}", self.year)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Calendar quarter, keyed as `YYYY-Qn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct YearQuarter {
    pub year: i32,
    pub quarter: u32,
}

impl YearQuarter {
    #[must_use]
    pub const fn new(year: i32, quarter: u32) -> Option<Self> {
        if quarter >= 1 && quarter <= 4 {
            Some(Self { year, quarter })
        } else {
            None
        }
    }

    #[must_use]
    pub const fn from_month(month: YearMonth) -> Self {
        Self {
            year: month.year,
            quarter: (month.month - 1) / 3 + 1,
        }
    }

    #[must_use]
    pub fn from_timestamp(secs: i64) -> Option<Self> {
        YearMonth::from_timestamp(secs).map(Self::from_month)
    }

    #[must_use]
    pub fn ordinal(self) -> i64 {
        i64::from(self.year) * 4 + i64::from(self.quarter) - 1
    }

    #[must_use]
    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        let year = i32::try_from(ordinal.div_euclid(4)).ok()?;
        let quarter = u32::try_from(ordinal.rem_euclid(4) + 1).ok()?;
        Self::new(year, quarter)
    }

    #[must_use]
    pub fn offset(self, quarters: i64) -> Option<Self> {
        Self::from_ordinal(self.ordinal() + quarters)
    }

    /// Display form used in choices: `Q2 2024`.
    #[must_use]
    pub fn display(self) -> String {
        format!("Q{} {}", self.quarter, self.year)
    }
}

impl fmt::Display for YearQuarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-Q{}", self.year, self.quarter)
    }
}

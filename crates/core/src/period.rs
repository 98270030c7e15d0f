//! Return period (`YYYYMM`) value object.

use core::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Calendar month a statutory return covers, written `YYYYMM` (e.g. `"202412"`).
///
/// Per tenant, a period identifies at most one detailed filing and at most one
/// summary filing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReturnPeriod {
    year: i32,
    month: u32,
}

impl ReturnPeriod {
    pub fn new(year: i32, month: u32) -> DomainResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(DomainError::validation(format!(
                "period month must be 01-12, got {month:02}"
            )));
        }
        if !(1000..=9999).contains(&year) {
            return Err(DomainError::validation(format!(
                "period year must have four digits, got {year}"
            )));
        }
        Ok(Self { year, month })
    }

    /// Period containing `date`.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        let (y, m) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(y, m, 1)
            .and_then(|d| d.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl core::fmt::Display for ReturnPeriod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

impl FromStr for ReturnPeriod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation(format!(
                "period must be six digits YYYYMM, got '{s}'"
            )));
        }
        let year: i32 = s[..4]
            .parse()
            .map_err(|_| DomainError::validation(format!("invalid period year in '{s}'")))?;
        let month: u32 = s[4..]
            .parse()
            .map_err(|_| DomainError::validation(format!("invalid period month in '{s}'")))?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for ReturnPeriod {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReturnPeriod> for String {
    fn from(value: ReturnPeriod) -> Self {
        value.to_string()
    }
}

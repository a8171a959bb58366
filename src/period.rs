use std::{fmt, path::Path};

use chrono::{Datelike, Local, TimeZone};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    config::{Locale, NumericOrder},
    error::{Error, Result},
    strategy::first_some,
};

/// A sortable `YYYYMM` year/month used to rank entries by recency.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(try_from = "u32", into = "u32")]
pub struct Period(u32);

impl Period {
    /// Returned when even the modification time cannot be interpreted.
    pub const EPOCH: Period = Period(197001);

    /// Build a period from a four-digit year and a month in 1..=12.
    pub fn new(year: u32, month: u32) -> Option<Self> {
        ((1000..=9999).contains(&year) && (1..=12).contains(&month))
            .then_some(Period(year * 100 + month))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Period {
    type Error = String;

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        Period::new(value / 100, value % 100)
            .ok_or_else(|| format!("{value} is not a YYYYMM period"))
    }
}

impl From<Period> for u32 {
    fn from(period: Period) -> u32 {
        period.0
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Infers a document's period from its filename, falling back to its
/// modification time.
///
/// Rules, first match wins:
/// 1. a month name followed (after 1-4 separator characters) by a year,
///    e.g. `MARZO 2025 Informe.pdf`
/// 2. a two-digit month directly adjacent to a four-digit year
/// 3. the modification time's local year and month
#[derive(Debug, Clone)]
pub struct DateResolver {
    locale: Locale,
    month_name: Regex,
    numeric: Regex,
    numeric_order: NumericOrder,
}

impl DateResolver {
    pub fn new(locale: Locale, numeric_order: NumericOrder) -> Result<Self> {
        let names = locale.month_names().join("|");
        let month_name = Regex::new(&format!(
            r"(?i)(?:^|[^\p{{L}}])({names})[^\p{{L}}\p{{N}}]{{1,4}}([0-9]{{4}})(?:[^0-9]|$)"
        ))
        .map_err(|e| Error::Config(format!("month-name pattern: {e}")))?;

        let numeric = match numeric_order {
            NumericOrder::MonthYear => {
                r"(?:^|[^0-9])(0[1-9]|1[0-2])([12][0-9]{3})(?:[^0-9]|$)"
            }
            NumericOrder::YearMonth => {
                r"(?:^|[^0-9])([12][0-9]{3})(0[1-9]|1[0-2])(?:[^0-9]|$)"
            }
        };
        let numeric = Regex::new(numeric)
            .map_err(|e| Error::Config(format!("numeric date pattern: {e}")))?;

        Ok(Self {
            locale,
            month_name,
            numeric,
            numeric_order,
        })
    }

    /// Resolve the period for a document. Never fails.
    ///
    /// `document_id` may be a relative path; only its final component is
    /// inspected. `mtime` is seconds since the Unix epoch.
    pub fn resolve(&self, document_id: &str, mtime: u64) -> Period {
        let file_name = Path::new(document_id)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(document_id);

        first_some(&[
            &|| self.from_month_name(file_name),
            &|| self.from_numeric(file_name),
            &|| from_mtime(mtime),
        ])
        .unwrap_or(Period::EPOCH)
    }

    fn from_month_name(&self, file_name: &str) -> Option<Period> {
        let caps = self.month_name.captures(file_name)?;
        let name = caps.get(1)?.as_str().to_lowercase();
        let month = self
            .locale
            .month_names()
            .iter()
            .position(|m| *m == name)?;
        let year = caps.get(2)?.as_str().parse().ok()?;
        Period::new(year, month as u32 + 1)
    }

    fn from_numeric(&self, file_name: &str) -> Option<Period> {
        let caps = self.numeric.captures(file_name)?;
        let (month, year) = match self.numeric_order {
            NumericOrder::MonthYear => (caps.get(1)?, caps.get(2)?),
            NumericOrder::YearMonth => (caps.get(2)?, caps.get(1)?),
        };
        Period::new(year.as_str().parse().ok()?, month.as_str().parse().ok()?)
    }
}

fn from_mtime(mtime: u64) -> Option<Period> {
    let secs = i64::try_from(mtime).ok()?;
    let local = Local.timestamp_opt(secs, 0).single()?;
    Period::new(u32::try_from(local.year()).ok()?, local.month())
}

//! Settlement period grammar: `<positive integer><unit>`, unit ∈ {h, d, w, m}.
//!
//! Parsed once when an admin configures a group; the scheduler only ever
//! sees a valid SettlementPeriod.

use crate::error::{LedgerError, LedgerResult};
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodUnit {
    Hour,
    Day,
    Week,
    Month,
}

impl PeriodUnit {
    fn from_suffix(c: char) -> Option<Self> {
        match c {
            'h' => Some(Self::Hour),
            'd' => Some(Self::Day),
            'w' => Some(Self::Week),
            'm' => Some(Self::Month),
            _ => None,
        }
    }

    fn suffix(self) -> char {
        match self {
            Self::Hour  => 'h',
            Self::Day   => 'd',
            Self::Week  => 'w',
            Self::Month => 'm',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SettlementPeriod {
    pub count: u32,
    pub unit:  PeriodUnit,
}

impl SettlementPeriod {
    /// The first instant after `from` that is one period later.
    /// Months follow the calendar and clamp to the last day of the month.
    pub fn advance(&self, from: DateTime<Utc>) -> LedgerResult<DateTime<Utc>> {
        let next = match self.unit {
            PeriodUnit::Hour  => from.checked_add_signed(Duration::hours(self.count.into())),
            PeriodUnit::Day   => from.checked_add_signed(Duration::days(self.count.into())),
            PeriodUnit::Week  => from.checked_add_signed(Duration::weeks(self.count.into())),
            PeriodUnit::Month => from.checked_add_months(Months::new(self.count)),
        };
        next.ok_or_else(|| LedgerError::validation(format!("period {self} overflows from {from}")))
    }
}

impl FromStr for SettlementPeriod {
    type Err = LedgerError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            LedgerError::validation(format!(
                "invalid settlement period {raw:?}: expected <positive integer><h|d|w|m>"
            ))
        };
        let trimmed = raw.trim();
        let suffix = trimmed.chars().last().ok_or_else(invalid)?;
        let unit = PeriodUnit::from_suffix(suffix).ok_or_else(invalid)?;
        let digits = &trimmed[..trimmed.len() - suffix.len_utf8()];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let count: u32 = digits.parse().map_err(|_| invalid())?;
        if count == 0 {
            return Err(invalid());
        }
        Ok(Self { count, unit })
    }
}

impl TryFrom<String> for SettlementPeriod {
    type Error = LedgerError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<SettlementPeriod> for String {
    fn from(period: SettlementPeriod) -> Self {
        period.to_string()
    }
}

impl fmt::Display for SettlementPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_every_unit() {
        assert_eq!("1h".parse::<SettlementPeriod>().unwrap().unit, PeriodUnit::Hour);
        assert_eq!("3d".parse::<SettlementPeriod>().unwrap().count, 3);
        assert_eq!("2w".parse::<SettlementPeriod>().unwrap().unit, PeriodUnit::Week);
        assert_eq!("12m".parse::<SettlementPeriod>().unwrap().count, 12);
    }

    #[test]
    fn rejects_malformed_periods() {
        for raw in ["0d", "abc", "", "d", "-1d", "1x", "1.5d", "+2w", "10"] {
            let err = raw.parse::<SettlementPeriod>().unwrap_err();
            assert!(
                matches!(err, LedgerError::Validation(_)),
                "{raw:?} should be a validation error, got {err:?}"
            );
        }
    }

    #[test]
    fn display_round_trips_the_grammar() {
        let period: SettlementPeriod = "14d".parse().unwrap();
        assert_eq!(period.to_string(), "14d");
    }

    #[test]
    fn month_advance_clamps_to_month_end() {
        let jan_31 = Utc.with_ymd_and_hms(2026, 1, 31, 9, 0, 0).unwrap();
        let period: SettlementPeriod = "1m".parse().unwrap();
        let next = period.advance(jan_31).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 28, 9, 0, 0).unwrap());
    }

    #[test]
    fn week_advance_is_seven_days() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        let period: SettlementPeriod = "1w".parse().unwrap();
        assert_eq!(period.advance(start).unwrap() - start, Duration::days(7));
    }
}

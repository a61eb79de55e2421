//! Read-side query parameters.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use stockrecon_core::{DomainError, DomainResult};

/// Inclusive range of whole UTC days; either end may be open.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> DomainResult<Self> {
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(DomainError::validation(format!(
                    "date range start {f} is after its end {t}"
                )));
            }
        }
        Ok(Self { from, to })
    }

    /// No filtering at all.
    pub fn all() -> Self {
        Self::default()
    }

    /// Half-open timestamp bounds `[start, end)` covering the whole days.
    pub fn bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let start = self.from.map(|d| d.and_time(NaiveTime::MIN).and_utc());
        let end = self
            .to
            .and_then(|d| d.succ_opt())
            .map(|d| d.and_time(NaiveTime::MIN).and_utc());
        (start, end)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let (start, end) = self.bounds();
        start.is_none_or(|s| at >= s) && end.is_none_or(|e| at < e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(DateRange::new(Some(day(2024, 5, 2)), Some(day(2024, 5, 1))).is_err());
        assert!(DateRange::new(Some(day(2024, 5, 1)), Some(day(2024, 5, 1))).is_ok());
    }

    #[test]
    fn end_day_is_inclusive() {
        let range = DateRange::new(Some(day(2024, 5, 1)), Some(day(2024, 5, 2))).unwrap();
        assert!(range.contains(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()));
        assert!(range.contains(Utc.with_ymd_and_hms(2024, 5, 2, 23, 59, 59).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2024, 5, 3, 0, 0, 0).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2024, 4, 30, 23, 59, 59).unwrap()));
    }

    #[test]
    fn open_range_contains_everything() {
        assert!(DateRange::all().contains(Utc::now()));
        assert_eq!(DateRange::all().bounds(), (None, None));
    }
}

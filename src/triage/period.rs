//! Calendar period arithmetic for the rollup hierarchy.
//!
//! A period is an inclusive date interval fully determined by any date inside
//! it. Weeks are work weeks: Monday through Friday, with Saturday/Sunday
//! dates mapping to the same Monday for grouping purposes.

use chrono::{Datelike, Days, NaiveDate, Weekday};

use crate::triage::naming::Granularity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub granularity: Granularity,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    /// Canonical key for the period: its start date. This is what the naming
    /// codec turns into an output filename.
    pub fn key(&self) -> NaiveDate {
        self.start
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Human label for progress output, e.g. `December 01 - December 05, 2025`.
    pub fn label(&self) -> String {
        match self.granularity {
            Granularity::Daily => long_date(self.start),
            Granularity::Weekly => format!(
                "{} - {}",
                self.start.format("%B %d"),
                self.end.format("%B %d, %Y")
            ),
            Granularity::Monthly => self.start.format("%B %Y").to_string(),
            Granularity::Annual => self.start.format("%Y").to_string(),
        }
    }
}

/// Bounds of the period of `granularity` containing `date`. Pure: periods of
/// one granularity never overlap.
pub fn bounds_of(granularity: Granularity, date: NaiveDate) -> Period {
    let (start, end) = match granularity {
        Granularity::Daily => (date, date),
        Granularity::Weekly => {
            let monday = date - Days::new(date.weekday().num_days_from_monday() as u64);
            (monday, monday + Days::new(4))
        }
        Granularity::Monthly => {
            let first = date.with_day(1).expect("day 1 always valid");
            let next_month = if first.month() == 12 {
                NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
            } else {
                NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
            }
            .expect("first of month always valid");
            (first, next_month - Days::new(1))
        }
        Granularity::Annual => (
            NaiveDate::from_ymd_opt(date.year(), 1, 1).expect("jan 1 always valid"),
            NaiveDate::from_ymd_opt(date.year(), 12, 31).expect("dec 31 always valid"),
        ),
    };
    Period {
        granularity,
        start,
        end,
    }
}

/// Week-of-month index 1-4 by fixed day ranges (1-7, 8-14, 15-21, 22-31).
pub fn week_of_month(date: NaiveDate) -> u32 {
    match date.day() {
        1..=7 => 1,
        8..=14 => 2,
        15..=21 => 3,
        _ => 4,
    }
}

pub fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Model-friendly date label, e.g. `Wednesday, December 31, 2025`.
pub fn long_date(date: NaiveDate) -> String {
    date.format("%A, %B %d, %Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn week_bounds_are_monday_through_friday() {
        // 2025-12-31 is a Wednesday
        let p = bounds_of(Granularity::Weekly, date(2025, 12, 31));
        assert_eq!(p.start, date(2025, 12, 29));
        assert_eq!(p.end, date(2026, 1, 2));
    }

    #[test]
    fn weekend_dates_map_to_the_same_monday() {
        let saturday = bounds_of(Granularity::Weekly, date(2025, 12, 6));
        let wednesday = bounds_of(Granularity::Weekly, date(2025, 12, 3));
        assert_eq!(saturday.start, wednesday.start);
        // but the Saturday itself is outside the Monday-Friday interval
        assert!(!saturday.contains(date(2025, 12, 6)));
    }

    #[test]
    fn month_bounds_handle_december_and_february() {
        let dec = bounds_of(Granularity::Monthly, date(2025, 12, 15));
        assert_eq!(dec.start, date(2025, 12, 1));
        assert_eq!(dec.end, date(2025, 12, 31));

        let feb = bounds_of(Granularity::Monthly, date(2024, 2, 10));
        assert_eq!(feb.end, date(2024, 2, 29));
    }

    #[test]
    fn annual_bounds_cover_the_calendar_year() {
        let p = bounds_of(Granularity::Annual, date(2025, 6, 15));
        assert_eq!(p.start, date(2025, 1, 1));
        assert_eq!(p.end, date(2025, 12, 31));
    }

    #[test]
    fn week_of_month_day_ranges() {
        assert_eq!(week_of_month(date(2025, 12, 1)), 1);
        assert_eq!(week_of_month(date(2025, 12, 8)), 2);
        assert_eq!(week_of_month(date(2025, 12, 21)), 3);
        assert_eq!(week_of_month(date(2025, 12, 31)), 4);
    }

    #[test]
    fn long_date_is_llm_readable() {
        assert_eq!(long_date(date(2025, 12, 31)), "Wednesday, December 31, 2025");
    }
}

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};

use crate::models::FeedItem;

/// A year/month position in the events calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthCursor {
    pub year: i32,
    pub month: u32,
}

impl MonthCursor {
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { month: self.month + 1, ..self }
        }
    }

    pub fn prev(self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { month: self.month - 1, ..self }
        }
    }

    pub fn first_day(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn days_in_month(self) -> u32 {
        let Some(first) = self.first_day() else {
            return 0;
        };
        self.next()
            .first_day()
            .map(|next| next.signed_duration_since(first).num_days() as u32)
            .unwrap_or(31)
    }

    /// Grid column of the 1st, with Sunday as column 0.
    pub fn leading_blanks(self) -> u32 {
        self.first_day()
            .map(|d| d.weekday().num_days_from_sunday())
            .unwrap_or(0)
    }

    /// Clamp a day-of-month into this month.
    pub fn date_with_day(self, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, day.clamp(1, self.days_in_month().max(1)))
    }
}

pub const WEEKDAYS: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

fn start_date(item: &FeedItem) -> Option<NaiveDate> {
    item.start_time.map(|t| t.date_naive())
}

/// Events in `cursor`'s month keyed by day of month. Undated events are skipped.
pub fn events_by_day(items: &[FeedItem], cursor: MonthCursor) -> BTreeMap<u32, Vec<&FeedItem>> {
    let mut days: BTreeMap<u32, Vec<&FeedItem>> = BTreeMap::new();
    for item in items {
        if let Some(date) = start_date(item) {
            if date.year() == cursor.year && date.month() == cursor.month {
                days.entry(date.day()).or_default().push(item);
            }
        }
    }
    days
}

/// Event count per month (index 0 = January) for `year`.
pub fn events_per_month(items: &[FeedItem], year: i32) -> [usize; 12] {
    let mut counts = [0usize; 12];
    for date in items.iter().filter_map(start_date) {
        if date.year() == year {
            counts[date.month0() as usize] += 1;
        }
    }
    counts
}

pub fn events_on(items: &[FeedItem], date: NaiveDate) -> Vec<&FeedItem> {
    items
        .iter()
        .filter(|item| start_date(item) == Some(date))
        .collect()
}

//! Calendar features derived from a date

use crate::types::Date;
use chrono::Datelike;

/// Day-of-week (Monday = 0), day-of-month and month of a date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFeatures {
    pub day_of_week: u32,
    pub day_of_month: u32,
    pub month: u32,
}

impl CalendarFeatures {
    pub fn from_date(date: Date) -> Self {
        Self {
            day_of_week: date.weekday().num_days_from_monday(),
            day_of_month: date.day(),
            month: date.month(),
        }
    }
}

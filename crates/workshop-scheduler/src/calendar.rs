//! Calendar matching.
//!
//! A schedule entry fires on every minute whose calendar components equal
//! all of the entry's set fields. Unset fields match anything, like `*` in a
//! crontab. Day of week counts from Sunday = 0.

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{SchedulerError, SchedulerResult};

/// One of the five calendar fields of a schedule entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarField {
    /// Minute of the hour, 0-59
    Minute,
    /// Hour of the day, 0-23
    Hour,
    /// Day of the month, 1-31
    DayOfMonth,
    /// Month of the year, 1-12
    Month,
    /// Day of the week, 0-6 with Sunday = 0
    DayOfWeek,
}

impl CalendarField {
    /// Inclusive range of valid values
    #[must_use]
    pub fn range(self) -> (u32, u32) {
        match self {
            Self::Minute => (0, 59),
            Self::Hour => (0, 23),
            Self::DayOfMonth => (1, 31),
            Self::Month => (1, 12),
            Self::DayOfWeek => (0, 6),
        }
    }
}

impl fmt::Display for CalendarField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::DayOfMonth => "dayOfMonth",
            Self::Month => "month",
            Self::DayOfWeek => "dayOfWeek",
        })
    }
}

/// Calendar components of a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarComponents {
    /// Minute, 0-59
    pub minute: u32,
    /// Hour, 0-23
    pub hour: u32,
    /// Day of month, 1-31
    pub day_of_month: u32,
    /// Month, 1-12
    pub month: u32,
    /// Day of week, Sunday = 0
    pub day_of_week: u32,
}

impl From<&NaiveDateTime> for CalendarComponents {
    fn from(at: &NaiveDateTime) -> Self {
        Self {
            minute: at.minute(),
            hour: at.hour(),
            day_of_month: at.day(),
            month: at.month(),
            day_of_week: at.weekday().num_days_from_sunday(),
        }
    }
}

/// When a schedule entry fires; `None` means any value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarFields {
    /// Minute of the hour
    pub minute: Option<u32>,
    /// Hour of the day
    pub hour: Option<u32>,
    /// Day of the month
    pub day_of_month: Option<u32>,
    /// Month of the year
    pub month: Option<u32>,
    /// Day of the week, Sunday = 0
    pub day_of_week: Option<u32>,
}

impl CalendarFields {
    /// Fires every minute
    #[must_use]
    pub fn every_minute() -> Self {
        Self::default()
    }

    /// Sets the minute
    #[must_use]
    pub fn minute(mut self, minute: u32) -> Self {
        self.minute = Some(minute);
        self
    }

    /// Sets the hour
    #[must_use]
    pub fn hour(mut self, hour: u32) -> Self {
        self.hour = Some(hour);
        self
    }

    /// Sets the day of the month
    #[must_use]
    pub fn day_of_month(mut self, day: u32) -> Self {
        self.day_of_month = Some(day);
        self
    }

    /// Sets the month
    #[must_use]
    pub fn month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self
    }

    /// Sets the day of the week (Sunday = 0)
    #[must_use]
    pub fn day_of_week(mut self, day: u32) -> Self {
        self.day_of_week = Some(day);
        self
    }

    fn pairs(&self) -> [(CalendarField, Option<u32>); 5] {
        [
            (CalendarField::Minute, self.minute),
            (CalendarField::Hour, self.hour),
            (CalendarField::DayOfMonth, self.day_of_month),
            (CalendarField::Month, self.month),
            (CalendarField::DayOfWeek, self.day_of_week),
        ]
    }

    /// Checks every set field is within its calendar range
    ///
    /// # Errors
    ///
    /// Returns the first field found out of range.
    pub fn validate(&self) -> SchedulerResult<()> {
        for (field, value) in self.pairs() {
            let Some(value) = value else { continue };
            let (min, max) = field.range();
            if !(min..=max).contains(&value) {
                return Err(SchedulerError::FieldOutOfRange {
                    field,
                    value,
                    min,
                    max,
                });
            }
        }
        Ok(())
    }

    /// Returns true if every set field equals the matching component of `at`
    #[must_use]
    pub fn matches(&self, at: &NaiveDateTime) -> bool {
        let now = CalendarComponents::from(at);
        let actual = [
            now.minute,
            now.hour,
            now.day_of_month,
            now.month,
            now.day_of_week,
        ];
        self.pairs()
            .into_iter()
            .zip(actual)
            .all(|((_, expected), actual)| expected.is_none_or(|expected| expected == actual))
    }
}

/// Drops seconds and sub-seconds, so matching happens per whole minute
#[must_use]
pub fn truncate_to_minute(at: NaiveDateTime) -> NaiveDateTime {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

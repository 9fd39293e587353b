//! Provider weekly schedule and the availability predicate.
//!
//! A schedule has exactly one entry per weekday. The predicate
//! [`is_available`] is inclusive at both ends: a provider working 09:00 to
//! 17:00 can take a 17:00 slot.

use crate::error::MarketplaceError;
use crate::types::hhmm;
use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// Working hours for one weekday.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    /// Day this entry describes.
    pub day: Weekday,
    /// Whether the provider works that day at all.
    pub enabled: bool,
    /// First bookable slot.
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    /// Last bookable slot.
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl DaySchedule {
    /// A working day from `start` to `end`.
    #[must_use]
    pub const fn working(day: Weekday, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            day,
            enabled: true,
            start,
            end,
        }
    }

    /// Whether `time` falls within this day's hours.
    #[must_use]
    pub fn covers(&self, time: NaiveTime) -> bool {
        self.enabled && self.start <= time && time <= self.end
    }
}

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Seven-day schedule, Monday first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeeklySchedule {
    days: Vec<DaySchedule>,
}

impl WeeklySchedule {
    /// Build a schedule from caller input.
    ///
    /// Entries may come in any order; they are stored Monday first.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Validation`] unless there is exactly one
    /// entry per weekday and every enabled day has `start <= end`.
    pub fn new(mut days: Vec<DaySchedule>) -> Result<Self, MarketplaceError> {
        days.sort_by_key(|d| d.day.num_days_from_monday());
        let schedule = Self { days };
        schedule.validate()?;
        Ok(schedule)
    }

    /// Monday to Saturday 09:00 to 17:00, Sunday off.
    #[must_use]
    pub fn standard() -> Self {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN);
        let five = NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN);
        Self {
            days: WEEK
                .iter()
                .map(|&day| DaySchedule {
                    day,
                    enabled: day != Weekday::Sun,
                    start: nine,
                    end: five,
                })
                .collect(),
        }
    }

    /// Entry for one weekday.
    #[must_use]
    pub fn day(&self, day: Weekday) -> Option<&DaySchedule> {
        self.days.iter().find(|d| d.day == day)
    }

    /// All entries, Monday first.
    #[must_use]
    pub fn days(&self) -> &[DaySchedule] {
        &self.days
    }

    /// Check the schedule shape.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Validation`] describing the first problem.
    pub fn validate(&self) -> Result<(), MarketplaceError> {
        if self.days.len() != 7 {
            return Err(MarketplaceError::validation(format!(
                "schedule needs 7 days, got {}",
                self.days.len()
            )));
        }
        for day in WEEK {
            if self.days.iter().filter(|d| d.day == day).count() != 1 {
                return Err(MarketplaceError::validation(format!(
                    "schedule must list {day} exactly once"
                )));
            }
        }
        if let Some(bad) = self.days.iter().find(|d| d.enabled && d.start > d.end) {
            return Err(MarketplaceError::validation(format!(
                "{} starts at {} after it ends at {}",
                bad.day,
                bad.start.format("%H:%M"),
                bad.end.format("%H:%M")
            )));
        }
        Ok(())
    }
}

impl Default for WeeklySchedule {
    fn default() -> Self {
        Self::standard()
    }
}

/// Whether a provider with this schedule works at `time` on `date`.
#[must_use]
pub fn is_available(schedule: &WeeklySchedule, date: NaiveDate, time: NaiveTime) -> bool {
    schedule
        .day(date.weekday())
        .is_some_and(|day| day.covers(time))
}

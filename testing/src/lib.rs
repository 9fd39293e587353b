//! # Marketplace Testing
//!
//! Testing utilities for the marketplace crates.
//!
//! This crate provides:
//! - [`InMemoryDocumentStore`]: linearizable in-memory `DocumentStore`
//! - [`FaultInjectingStore`]: wrapper that fails chosen operations or slips a
//!   concurrent writer in before a guarded write
//! - Mock implementations of Environment traits ([`FixedClock`],
//!   [`ManualClock`], [`StaticIdentity`])
//! - Seed records ([`fixtures`]) and proptest strategies ([`properties`])
//!
//! ## Example
//!
//! ```
//! use marketplace_testing::{InMemoryDocumentStore, fixtures::Seed};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = InMemoryDocumentStore::new();
//! let seed = Seed::standard();
//! seed.install(&store).await.unwrap();
//! # });
//! ```

pub mod faults;
pub mod fixtures;
pub mod mocks;
pub mod store;

/// Property-based testing utilities using proptest.
pub mod properties {
    use chrono::{NaiveTime, Weekday};
    use marketplace_core::availability::{DaySchedule, WeeklySchedule};
    use marketplace_core::money::Money;
    use proptest::prelude::*;

    /// Non-zero amounts up to one million units.
    pub fn money() -> impl Strategy<Value = Money> {
        (1_u64..100_000_000).prop_map(Money::from_cents)
    }

    /// Valid star ratings.
    pub fn star_rating() -> impl Strategy<Value = u8> {
        1_u8..=5
    }

    fn time_of_day() -> impl Strategy<Value = NaiveTime> {
        (0_u32..24, 0_u32..60)
            .prop_map(|(h, m)| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN))
    }

    /// Valid weekly schedules: seven days, ordered hours on enabled days.
    pub fn weekly_schedule() -> impl Strategy<Value = WeeklySchedule> {
        prop::collection::vec((any::<bool>(), time_of_day(), time_of_day()), 7).prop_map(|days| {
            let week = [
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
                Weekday::Sun,
            ];
            let entries = week
                .into_iter()
                .zip(days)
                .map(|(day, (enabled, a, b))| DaySchedule {
                    day,
                    enabled,
                    start: a.min(b),
                    end: a.max(b),
                })
                .collect();
            WeeklySchedule::new(entries).unwrap_or_default()
        })
    }
}

// Re-export commonly used items
pub use faults::FaultInjectingStore;
pub use mocks::{FixedClock, ManualClock, StaticIdentity, test_clock};
pub use store::InMemoryDocumentStore;

#[cfg(test)]
mod tests {
    use super::properties;
    use marketplace_core::availability::is_available;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn generated_schedules_are_valid(schedule in properties::weekly_schedule()) {
            prop_assert!(schedule.validate().is_ok());
        }

        #[test]
        fn day_bounds_are_available_when_enabled(schedule in properties::weekly_schedule()) {
            // 2024-06-03 is a Monday
            let monday = chrono::NaiveDate::from_ymd_opt(2024, 6, 3).unwrap_or_default();
            for (offset, day) in schedule.days().iter().enumerate() {
                let date = monday + chrono::Duration::days(i64::try_from(offset).unwrap_or_default());
                prop_assert_eq!(is_available(&schedule, date, day.start), day.enabled);
                prop_assert_eq!(is_available(&schedule, date, day.end), day.enabled);
            }
        }
    }
}

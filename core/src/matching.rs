//! Marketplace matching: which pending bookings a provider may see.
//!
//! Visibility is recomputed from the bookings on every query; there is no
//! persisted index of eligible providers.

use crate::availability::{WeeklySchedule, is_available};
use crate::types::{Booking, BookingStatus, UserId};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// The provider attributes matching looks at.
#[derive(Clone, Copy, Debug)]
pub struct ProviderView<'a> {
    /// Provider id.
    pub id: UserId,
    /// Offered service names.
    pub services: &'a BTreeSet<String>,
    /// Weekly hours.
    pub availability: &'a WeeklySchedule,
}

/// Whether a booking shows up in the provider's job requests.
///
/// True for pending bookings assigned directly to the provider, and for open
/// pending bookings of a service the provider offers.
#[must_use]
pub fn is_eligible(booking: &Booking, provider_id: UserId, services: &BTreeSet<String>) -> bool {
    booking.status == BookingStatus::Pending
        && match booking.provider_id {
            Some(assigned) => assigned == provider_id,
            None => services.contains(&booking.service_name),
        }
}

/// Newest first, ties broken by id so the order is deterministic.
#[must_use]
pub fn newest_first(a: &Booking, b: &Booking) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Job requests visible to a provider, newest first.
#[must_use]
pub fn eligible_requests<I>(bookings: I, provider: ProviderView<'_>) -> Vec<Booking>
where
    I: IntoIterator<Item = Booking>,
{
    let mut eligible: Vec<Booking> = bookings
        .into_iter()
        .filter(|b| is_eligible(b, provider.id, provider.services))
        .collect();
    eligible.sort_by(newest_first);
    eligible
}

/// Eligible requests that also fall inside the provider's weekly hours.
#[must_use]
pub fn available_requests<I>(bookings: I, provider: ProviderView<'_>) -> Vec<Booking>
where
    I: IntoIterator<Item = Booking>,
{
    eligible_requests(bookings, provider)
        .into_iter()
        .filter(|b| is_available(provider.availability, b.date, b.time))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::types::{BookingId, PaymentMethod, PaymentStatus, ServiceId};
    use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

    fn booking(service: &str, provider: Option<UserId>, age_minutes: i64) -> Booking {
        let created = DateTime::<Utc>::UNIX_EPOCH + Duration::days(1) - Duration::minutes(age_minutes);
        Booking {
            id: BookingId::new(),
            customer_id: UserId::new(),
            customer_name: "C".to_string(),
            service_id: ServiceId::new(),
            service_name: service.to_string(),
            provider_id: provider,
            provider_name: None,
            // a Monday
            date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            address: "A".to_string(),
            price: Money::from_units(10),
            service_fee: Money::from_units(1),
            total: Money::from_units(11),
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Paid,
            payment_method: PaymentMethod::Card,
            is_reviewed: false,
            notes: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn open_bookings_match_on_service_name() {
        let me = UserId::new();
        let services: BTreeSet<String> = ["Plumbing".to_string()].into();
        assert!(is_eligible(&booking("Plumbing", None, 0), me, &services));
        assert!(!is_eligible(&booking("Painting", None, 0), me, &services));
    }

    #[test]
    fn assigned_bookings_match_only_their_provider() {
        let me = UserId::new();
        let services = BTreeSet::new();
        assert!(is_eligible(&booking("Painting", Some(me), 0), me, &services));
        assert!(!is_eligible(&booking("Painting", Some(UserId::new()), 0), me, &services));
    }

    #[test]
    fn non_pending_bookings_never_match() {
        let me = UserId::new();
        let mut upcoming = booking("Plumbing", Some(me), 0);
        upcoming.status = BookingStatus::Upcoming;
        assert!(!is_eligible(&upcoming, me, &BTreeSet::new()));
    }

    #[test]
    fn requests_are_newest_first() {
        let me = UserId::new();
        let services: BTreeSet<String> = ["Plumbing".to_string()].into();
        let schedule = WeeklySchedule::standard();
        let old = booking("Plumbing", None, 60);
        let new = booking("Plumbing", None, 5);
        let view = ProviderView {
            id: me,
            services: &services,
            availability: &schedule,
        };
        let result = eligible_requests(vec![old.clone(), new.clone()], view);
        assert_eq!(result, vec![new, old]);
    }

    #[test]
    fn ties_break_by_id() {
        let me = UserId::new();
        let services: BTreeSet<String> = ["Plumbing".to_string()].into();
        let schedule = WeeklySchedule::standard();
        let a = booking("Plumbing", None, 5);
        let mut b = booking("Plumbing", None, 5);
        b.created_at = a.created_at;
        let view = ProviderView {
            id: me,
            services: &services,
            availability: &schedule,
        };
        let first = eligible_requests(vec![a.clone(), b.clone()], view);
        let second = eligible_requests(vec![b, a], view);
        assert_eq!(first, second);
    }

    #[test]
    fn available_requests_respect_schedule() {
        let me = UserId::new();
        let services: BTreeSet<String> = ["Plumbing".to_string()].into();
        let schedule = WeeklySchedule::standard();
        let morning = booking("Plumbing", None, 1);
        let mut night = booking("Plumbing", None, 2);
        night.time = NaiveTime::from_hms_opt(22, 0, 0).unwrap();
        let view = ProviderView {
            id: me,
            services: &services,
            availability: &schedule,
        };
        assert_eq!(available_requests(vec![morning.clone(), night], view), vec![morning]);
    }
}

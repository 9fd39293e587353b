//! Booking lifecycle state machine.
//!
//! Every status change of a booking goes through [`transition`]. It is a pure
//! function: it looks at the booking as last read from the store, the actor
//! and the requested action, and either rejects the request or returns the
//! booking as it should be written back. Persisting the result with the
//! version that was read is what makes the transition a conditional write.
//!
//! ```text
//!            accept              start               complete
//! pending ─────────▶ upcoming ─────────▶ in-progress ─────────▶ completed
//!    │  ▲               │                    │
//!    │  └─ reschedule ──┤                    │
//!    │                  │ cancel             │
//!    └──────────────────┴──────▶ cancelled ◀─┘ (cancel)
//! ```
//!
//! # Example
//!
//! ```
//! # use marketplace_core::lifecycle::*;
//! # use marketplace_core::types::*;
//! # fn demo(booking: &Booking, provider: &User, now: chrono::DateTime<chrono::Utc>) -> marketplace_core::error::Result<()> {
//! let actor = Actor::new(provider.id, Role::Provider);
//! let accepting = AcceptingProvider::from_user(provider)?;
//! match transition(booking, &actor, BookingAction::Accept(accepting), now)? {
//!     Outcome::Changed(updated) => assert_eq!(updated.status, BookingStatus::Upcoming),
//!     Outcome::Unchanged(_) => {}
//! }
//! # Ok(())
//! # }
//! ```

use crate::availability::is_available;
use crate::error::{MarketplaceError, Result};
use crate::pricing::BookingPolicy;
use crate::types::{
    Booking, BookingId, BookingStatus, PaymentMethod, PaymentStatus, Role, Service, ServiceId,
    User, UserId, hhmm,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;

/// Who is asking for a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Actor {
    /// Caller's user id.
    pub id: UserId,
    /// Caller's role.
    pub role: Role,
}

impl Actor {
    /// Create an actor.
    #[must_use]
    pub const fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    /// Actor for a loaded user record.
    #[must_use]
    pub const fn of(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role,
        }
    }
}

/// The part of a provider record the accept transition needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptingProvider {
    /// Provider id.
    pub id: UserId,
    /// Provider display name, copied onto the booking.
    pub name: String,
    /// Services the provider offers.
    pub services: BTreeSet<String>,
    /// Whether onboarding is finished.
    pub is_onboarded: bool,
}

impl AcceptingProvider {
    /// Extract the accept-relevant fields of a provider.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::NotPermitted`] if the user is not a provider.
    pub fn from_user(user: &User) -> Result<Self> {
        match (&user.role, &user.provider) {
            (Role::Provider, Some(profile)) => Ok(Self {
                id: user.id,
                name: user.name.clone(),
                services: profile.services.clone(),
                is_onboarded: profile.is_onboarded,
            }),
            _ => Err(MarketplaceError::not_permitted(format!(
                "user {} is not a provider",
                user.id
            ))),
        }
    }
}

/// A requested change to a booking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingAction {
    /// Provider takes the job.
    Accept(AcceptingProvider),
    /// Provider arrives and starts work.
    Start,
    /// Provider finishes the job.
    Complete,
    /// Customer, assigned provider or admin calls the booking off.
    Cancel,
    /// Customer moves the appointment.
    Reschedule {
        /// New day.
        date: NaiveDate,
        /// New start time.
        time: NaiveTime,
    },
}

impl BookingAction {
    /// Short name used in errors, logs and metric labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Accept(_) => "accept",
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
            Self::Reschedule { .. } => "reschedule",
        }
    }
}

/// Result of a permitted transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The booking changed and must be written back.
    Changed(Booking),
    /// The request was already satisfied; nothing to write.
    Unchanged(Booking),
}

impl Outcome {
    /// The resulting booking either way.
    #[must_use]
    pub fn into_booking(self) -> Booking {
        match self {
            Self::Changed(b) | Self::Unchanged(b) => b,
        }
    }

    /// Borrow the resulting booking.
    #[must_use]
    pub const fn booking(&self) -> &Booking {
        match self {
            Self::Changed(b) | Self::Unchanged(b) => b,
        }
    }

    /// Whether a write is needed.
    #[must_use]
    pub const fn is_changed(&self) -> bool {
        matches!(self, Self::Changed(_))
    }
}

fn invalid(booking: &Booking, action: &BookingAction) -> MarketplaceError {
    MarketplaceError::InvalidTransition {
        from: booking.status.to_string(),
        action: action.name().to_string(),
    }
}

fn require_assigned_provider(booking: &Booking, actor: &Actor, action: &BookingAction) -> Result<()> {
    if actor.role == Role::Provider && booking.is_assigned_to(actor.id) {
        Ok(())
    } else {
        Err(MarketplaceError::not_permitted(format!(
            "only the assigned provider may {} booking {}",
            action.name(),
            booking.id
        )))
    }
}

fn changed(booking: &Booking, now: DateTime<Utc>, apply: impl FnOnce(&mut Booking)) -> Outcome {
    let mut next = booking.clone();
    apply(&mut next);
    next.updated_at = now;
    Outcome::Changed(next)
}

/// Apply one action to a booking.
///
/// # Errors
///
/// - [`MarketplaceError::NotPermitted`]: the actor may not perform this action
///   on this booking
/// - [`MarketplaceError::InvalidTransition`]: the status does not admit the action
/// - [`MarketplaceError::Conflict`]: accept on a booking another provider
///   already holds (a lost race observed after the fact)
/// - [`MarketplaceError::Validation`]: reschedule into the past
pub fn transition(
    booking: &Booking,
    actor: &Actor,
    action: BookingAction,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    match &action {
        BookingAction::Accept(provider) => accept(booking, actor, provider, now),
        BookingAction::Start => {
            require_assigned_provider(booking, actor, &action)?;
            if booking.status != BookingStatus::Upcoming {
                return Err(invalid(booking, &action));
            }
            Ok(changed(booking, now, |b| b.status = BookingStatus::InProgress))
        }
        BookingAction::Complete => {
            require_assigned_provider(booking, actor, &action)?;
            if booking.status != BookingStatus::InProgress {
                return Err(invalid(booking, &action));
            }
            Ok(changed(booking, now, |b| b.status = BookingStatus::Completed))
        }
        BookingAction::Cancel => {
            let allowed = actor.role == Role::Admin
                || actor.id == booking.customer_id
                || (actor.role == Role::Provider && booking.is_assigned_to(actor.id));
            if !allowed {
                return Err(MarketplaceError::not_permitted(format!(
                    "user {} may not cancel booking {}",
                    actor.id, booking.id
                )));
            }
            match booking.status {
                BookingStatus::Cancelled => Ok(Outcome::Unchanged(booking.clone())),
                BookingStatus::Completed => Err(invalid(booking, &action)),
                _ => Ok(changed(booking, now, |b| b.status = BookingStatus::Cancelled)),
            }
        }
        BookingAction::Reschedule { date, time } => {
            if actor.id != booking.customer_id {
                return Err(MarketplaceError::not_permitted(format!(
                    "only the customer may reschedule booking {}",
                    booking.id
                )));
            }
            if booking.status.is_terminal() {
                return Err(invalid(booking, &action));
            }
            if *date < now.date_naive() {
                return Err(MarketplaceError::validation(format!(
                    "cannot reschedule into the past ({date})"
                )));
            }
            let time = hhmm::truncate(*time);
            if booking.date == *date && booking.time == time {
                return Ok(Outcome::Unchanged(booking.clone()));
            }
            Ok(changed(booking, now, |b| {
                b.date = *date;
                b.time = time;
                if b.status == BookingStatus::Upcoming {
                    b.status = BookingStatus::Pending;
                }
            }))
        }
    }
}

fn accept(
    booking: &Booking,
    actor: &Actor,
    provider: &AcceptingProvider,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    if actor.role != Role::Provider || actor.id != provider.id {
        return Err(MarketplaceError::not_permitted(
            "bookings can only be accepted by the provider themselves",
        ));
    }
    if !provider.is_onboarded {
        return Err(MarketplaceError::not_permitted(format!(
            "provider {} has not finished onboarding",
            provider.id
        )));
    }

    match booking.status {
        BookingStatus::Pending => match booking.provider_id {
            None if provider.services.contains(&booking.service_name) => {}
            None => {
                return Err(MarketplaceError::not_permitted(format!(
                    "provider {} does not offer {}",
                    provider.id, booking.service_name
                )));
            }
            Some(assigned) if assigned == provider.id => {}
            Some(_) => {
                return Err(MarketplaceError::not_permitted(format!(
                    "booking {} is assigned to another provider",
                    booking.id
                )));
            }
        },
        BookingStatus::Upcoming | BookingStatus::InProgress => {
            return if booking.is_assigned_to(provider.id) {
                Ok(Outcome::Unchanged(booking.clone()))
            } else {
                Err(MarketplaceError::conflict(format!(
                    "booking {} was already accepted by another provider",
                    booking.id
                )))
            };
        }
        BookingStatus::Completed | BookingStatus::Cancelled => {
            return Err(MarketplaceError::InvalidTransition {
                from: booking.status.to_string(),
                action: "accept".to_string(),
            });
        }
    }

    Ok(changed(booking, now, |b| {
        b.provider_id = Some(provider.id);
        b.provider_name = Some(provider.name.clone());
        b.status = BookingStatus::Upcoming;
    }))
}

/// Checkout form as submitted by a customer. Every field may be missing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    /// Catalog service to book.
    pub service_id: Option<ServiceId>,
    /// Professional picked while browsing; `None` posts to the open marketplace.
    pub provider_id: Option<UserId>,
    /// Appointment day.
    pub date: Option<NaiveDate>,
    /// Appointment time, `HH:MM`.
    #[serde(default, deserialize_with = "optional_hhmm")]
    pub time: Option<NaiveTime>,
    /// Job address.
    pub address: Option<String>,
    /// Payment method.
    #[serde(default)]
    pub payment_method: PaymentMethod,
    /// Instructions for the provider.
    pub notes: Option<String>,
}

fn optional_hhmm<'de, D>(deserializer: D) -> std::result::Result<Option<NaiveTime>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.filter(|s| !s.trim().is_empty())
        .map(|s| hhmm::parse(s.trim()).map_err(serde::de::Error::custom))
        .transpose()
}

/// A checkout request with every required field present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedRequest {
    /// Catalog service to book.
    pub service_id: ServiceId,
    /// Chosen professional, if any.
    pub provider_id: Option<UserId>,
    /// Appointment day.
    pub date: NaiveDate,
    /// Appointment time.
    pub time: NaiveTime,
    /// Job address, trimmed.
    pub address: String,
    /// Payment method.
    pub payment_method: PaymentMethod,
    /// Instructions for the provider, `None` when blank.
    pub notes: Option<String>,
}

impl BookingRequest {
    /// Check that service, date, time and address are present and the date
    /// is not in the past.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Validation`] naming the first problem.
    pub fn validate(self, today: NaiveDate) -> Result<ValidatedRequest> {
        let service_id = self
            .service_id
            .ok_or_else(|| MarketplaceError::validation("please select a service"))?;
        let date = self
            .date
            .ok_or_else(|| MarketplaceError::validation("please select a date"))?;
        let time = self
            .time
            .map(hhmm::truncate)
            .ok_or_else(|| MarketplaceError::validation("please select a time"))?;
        let address = self
            .address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .ok_or_else(|| MarketplaceError::validation("please provide an address"))?;
        if date < today {
            return Err(MarketplaceError::validation(format!(
                "cannot book a date in the past ({date})"
            )));
        }
        Ok(ValidatedRequest {
            service_id,
            provider_id: self.provider_id,
            date,
            time,
            address,
            payment_method: self.payment_method,
            notes: self
                .notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        })
    }
}

/// Records a checkout draws from.
#[derive(Clone, Copy, Debug)]
pub struct Checkout<'a> {
    /// The booking customer.
    pub customer: &'a User,
    /// The catalog service being booked.
    pub service: &'a Service,
    /// The chosen professional, loaded from the store.
    pub provider: Option<&'a User>,
}

/// Build a new pending booking from a validated checkout.
///
/// # Errors
///
/// - [`MarketplaceError::NotPermitted`]: the caller is not a customer
/// - [`MarketplaceError::Validation`]: the chosen provider cannot take this
///   service, or (when the policy enforces it) is not working at that slot
pub fn create_booking(
    id: BookingId,
    request: ValidatedRequest,
    checkout: Checkout<'_>,
    policy: &BookingPolicy,
    now: DateTime<Utc>,
) -> Result<Booking> {
    let Checkout {
        customer,
        service,
        provider,
    } = checkout;

    if customer.role != Role::Customer {
        return Err(MarketplaceError::not_permitted(format!(
            "only customers can book services, {} is a {}",
            customer.id, customer.role
        )));
    }

    let (provider_id, provider_name) = match provider {
        None => (None, None),
        Some(provider) => {
            let profile = provider
                .provider_profile()
                .filter(|_| provider.is_onboarded_provider())
                .ok_or_else(|| {
                    MarketplaceError::validation(format!(
                        "{} is not an active professional",
                        provider.name
                    ))
                })?;
            if !profile.offers(&service.name) {
                return Err(MarketplaceError::validation(format!(
                    "{} does not offer {}",
                    provider.name, service.name
                )));
            }
            if policy.enforce_availability
                && !is_available(&profile.availability, request.date, request.time)
            {
                return Err(MarketplaceError::validation(format!(
                    "{} is not available on {} at {}",
                    provider.name,
                    request.date,
                    request.time.format("%H:%M")
                )));
            }
            (Some(provider.id), Some(provider.name.clone()))
        }
    };

    let quote = policy.quote(service.base_price)?;
    let booking = Booking {
        id,
        customer_id: customer.id,
        customer_name: customer.name.clone(),
        service_id: service.id,
        service_name: service.name.clone(),
        provider_id,
        provider_name,
        date: request.date,
        time: request.time,
        address: request.address,
        price: quote.price,
        service_fee: quote.service_fee,
        total: quote.total,
        status: BookingStatus::Pending,
        payment_status: PaymentStatus::Paid,
        payment_method: request.payment_method,
        is_reviewed: false,
        notes: request.notes,
        created_at: now,
        updated_at: now,
    };
    booking.check_invariants()?;
    Ok(booking)
}

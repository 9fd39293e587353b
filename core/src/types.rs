//! Domain types for the home-services marketplace.
//!
//! Records serialize to camelCase JSON documents. Each record has a
//! `check_invariants` method the store adapter calls when reading a document
//! back, so a malformed document never reaches the state machine.

use crate::availability::WeeklySchedule;
use crate::document::DocumentId;
use crate::error::MarketplaceError;
use crate::money::Money;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Document id under which the record is stored
            #[must_use]
            pub fn document_id(&self) -> DocumentId {
                DocumentId::new(self.0.to_string())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a user (customer, provider or admin)
    UserId
);
uuid_id!(
    /// Unique identifier for a booking
    BookingId
);
uuid_id!(
    /// Unique identifier for a catalog service
    ServiceId
);
uuid_id!(
    /// Unique identifier for a review
    ReviewId
);
uuid_id!(
    /// Unique identifier for a withdrawal
    WithdrawalId
);
uuid_id!(
    /// Unique identifier for a saved address
    AddressId
);

/// Serde helpers for `HH:MM` wall-clock times.
///
/// Accepts `HH:MM` and `HH:MM:SS` on input, always writes `HH:MM`.
/// Seconds are dropped on the way in, so a parsed time is exactly what
/// gets stored.
pub mod hhmm {
    use chrono::{NaiveTime, Timelike};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    /// Drop seconds and sub-seconds, keeping the minute slot.
    #[must_use]
    pub fn truncate(time: NaiveTime) -> NaiveTime {
        NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
    }

    /// Parse `HH:MM` or `HH:MM:SS`, truncated to the minute.
    ///
    /// # Errors
    ///
    /// Returns the chrono parse error when neither format matches.
    pub fn parse(input: &str) -> Result<NaiveTime, chrono::ParseError> {
        NaiveTime::parse_from_str(input, FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M:%S"))
            .map(truncate)
    }

    /// Serialize a time as `HH:MM`.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(FORMAT))
    }

    /// Deserialize a time from `HH:MM` or `HH:MM:SS`.
    ///
    /// # Errors
    ///
    /// Fails on any other format.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Role of a user account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Books services.
    Customer,
    /// Accepts and fulfils bookings.
    Provider,
    /// Moderates the marketplace.
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Customer => "customer",
            Self::Provider => "provider",
            Self::Admin => "admin",
        })
    }
}

/// Where a provider's withdrawals are paid out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum PaymentDetails {
    /// Unified Payments Interface handle.
    #[serde(rename_all = "camelCase")]
    Upi {
        /// UPI id, e.g. `name@bank`.
        upi_id: String,
    },
    /// Bank transfer.
    #[serde(rename_all = "camelCase")]
    BankAccount {
        /// Name on the account.
        account_holder: String,
        /// Account number.
        account_number: String,
        /// Branch routing code.
        ifsc_code: String,
    },
}

impl PaymentDetails {
    /// Check that every field is filled in.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Validation`] naming the first blank field.
    pub fn validate(&self) -> Result<(), MarketplaceError> {
        let blank = |value: &str, field: &str| {
            if value.trim().is_empty() {
                Err(MarketplaceError::validation(format!("{field} is required")))
            } else {
                Ok(())
            }
        };
        match self {
            Self::Upi { upi_id } => {
                blank(upi_id, "UPI id")?;
                if !upi_id.contains('@') {
                    return Err(MarketplaceError::validation("UPI id must look like name@bank"));
                }
                Ok(())
            }
            Self::BankAccount {
                account_holder,
                account_number,
                ifsc_code,
            } => {
                blank(account_holder, "account holder")?;
                blank(account_number, "account number")?;
                blank(ifsc_code, "IFSC code")
            }
        }
    }
}

/// Provider-only part of a user record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderProfile {
    /// Names of the catalog services this provider offers.
    pub services: BTreeSet<String>,
    /// Weekly working hours.
    pub availability: WeeklySchedule,
    /// Cached average rating, derived from reviews.
    pub rating: f64,
    /// Cached review count, derived from reviews.
    pub review_count: u32,
    /// Payout destination.
    pub payment_details: Option<PaymentDetails>,
    /// Whether onboarding is finished; gates accepting jobs.
    pub is_onboarded: bool,
}

impl Default for ProviderProfile {
    fn default() -> Self {
        Self {
            services: BTreeSet::new(),
            availability: WeeklySchedule::standard(),
            rating: 0.0,
            review_count: 0,
            payment_details: None,
            is_onboarded: false,
        }
    }
}

impl ProviderProfile {
    /// Whether the provider offers a service by name.
    #[must_use]
    pub fn offers(&self, service_name: &str) -> bool {
        self.services.contains(service_name)
    }
}

/// A customer, provider or admin account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Account id.
    pub id: UserId,
    /// Login email.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Account role.
    pub role: Role,
    /// Contact phone number.
    pub phone: Option<String>,
    /// Provider details; `Some` exactly when `role` is provider.
    pub provider: Option<ProviderProfile>,
    /// Signup time.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Provider profile, if this user is a provider.
    #[must_use]
    pub const fn provider_profile(&self) -> Option<&ProviderProfile> {
        self.provider.as_ref()
    }

    /// Whether this user is a provider who finished onboarding.
    #[must_use]
    pub fn is_onboarded_provider(&self) -> bool {
        self.role == Role::Provider && self.provider.as_ref().is_some_and(|p| p.is_onboarded)
    }

    /// Structural checks applied whenever a user document is loaded.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Validation`] describing the violation.
    pub fn check_invariants(&self) -> Result<(), MarketplaceError> {
        match (self.role, &self.provider) {
            (Role::Provider, None) => Err(MarketplaceError::validation(format!(
                "provider {} has no provider profile",
                self.id
            ))),
            (Role::Customer | Role::Admin, Some(_)) => Err(MarketplaceError::validation(format!(
                "{} {} carries a provider profile",
                self.role, self.id
            ))),
            (Role::Provider, Some(profile)) => {
                if !(0.0..=5.0).contains(&profile.rating) {
                    return Err(MarketplaceError::validation(format!(
                        "provider {} has rating {} outside 0..=5",
                        self.id, profile.rating
                    )));
                }
                profile.availability.validate()
            }
            _ => Ok(()),
        }
    }
}

/// Lifecycle status of a booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BookingStatus {
    /// Waiting for a provider to accept (or re-confirm after reschedule).
    Pending,
    /// Accepted by a provider, not started.
    Upcoming,
    /// Provider is on the job.
    InProgress,
    /// Job done. Terminal.
    Completed,
    /// Called off. Terminal.
    Cancelled,
}

impl BookingStatus {
    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Upcoming => "upcoming",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// No transition leaves a terminal status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Statuses in which a provider must be assigned.
    #[must_use]
    pub const fn requires_provider(self) -> bool {
        matches!(self, Self::Upcoming | Self::InProgress | Self::Completed)
    }

    /// Accepted but not yet completed.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Upcoming | Self::InProgress)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = MarketplaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "upcoming" => Ok(Self::Upcoming),
            "in-progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(MarketplaceError::validation(format!(
                "unknown booking status '{other}'"
            ))),
        }
    }
}

/// Payment state of a booking. Checkout simulates instant payment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Not charged yet.
    Pending,
    /// Charged at checkout.
    Paid,
}

/// How the customer paid at checkout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Credit or debit card.
    #[default]
    Card,
    /// UPI transfer.
    Upi,
}

/// A scheduled engagement between a customer and (eventually) a provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    /// Booking id.
    pub id: BookingId,
    /// Customer who booked.
    pub customer_id: UserId,
    /// Customer display name at checkout.
    pub customer_name: String,
    /// Catalog service booked.
    pub service_id: ServiceId,
    /// Catalog service name at checkout; matched against provider services.
    pub service_name: String,
    /// Assigned provider; `None` is an open marketplace booking.
    pub provider_id: Option<UserId>,
    /// Assigned provider display name.
    pub provider_name: Option<String>,
    /// Day of the appointment.
    pub date: NaiveDate,
    /// Start time of the appointment.
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    /// Where the job takes place.
    pub address: String,
    /// Service price; what the provider earns.
    pub price: Money,
    /// Platform fee on top of the price.
    pub service_fee: Money,
    /// What the customer paid: `price + service_fee`.
    pub total: Money,
    /// Lifecycle status.
    pub status: BookingStatus,
    /// Payment state.
    pub payment_status: PaymentStatus,
    /// Payment method chosen at checkout.
    pub payment_method: PaymentMethod,
    /// Set together with the creation of the booking's review.
    pub is_reviewed: bool,
    /// Free-text instructions from the customer.
    pub notes: Option<String>,
    /// Checkout time.
    pub created_at: DateTime<Utc>,
    /// Time of the last transition.
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Whether the booking has no assigned provider.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.provider_id.is_none()
    }

    /// Whether the given user is the assigned provider.
    #[must_use]
    pub fn is_assigned_to(&self, provider_id: UserId) -> bool {
        self.provider_id == Some(provider_id)
    }

    /// Scheduled start as a naive local date-time.
    #[must_use]
    pub fn scheduled_at(&self) -> chrono::NaiveDateTime {
        self.date.and_time(self.time)
    }

    /// Structural checks applied at creation and whenever a booking is loaded.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Validation`] describing the violation.
    pub fn check_invariants(&self) -> Result<(), MarketplaceError> {
        if self.price.checked_add(self.service_fee) != Some(self.total) {
            return Err(MarketplaceError::validation(format!(
                "booking {}: total {} != price {} + fee {}",
                self.id, self.total, self.price, self.service_fee
            )));
        }
        if self.status.requires_provider() && self.provider_id.is_none() {
            return Err(MarketplaceError::validation(format!(
                "booking {} is {} without a provider",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

/// A customer's rating of a completed booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    /// Review id.
    pub id: ReviewId,
    /// Reviewed booking; at most one review per booking.
    pub booking_id: BookingId,
    /// Provider being rated.
    pub provider_id: UserId,
    /// Customer who wrote the review.
    pub customer_id: UserId,
    /// Customer display name.
    pub customer_name: String,
    /// Service that was performed.
    pub service_name: String,
    /// Stars, 1 to 5.
    pub rating: u8,
    /// Free text.
    pub comment: String,
    /// Submission time.
    pub created_at: DateTime<Utc>,
}

/// Settlement state of a withdrawal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    /// Settled instantly.
    Processed,
}

/// Money a provider moved out of their balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    /// Withdrawal id.
    pub id: WithdrawalId,
    /// Provider who withdrew.
    pub provider_id: UserId,
    /// Amount withdrawn.
    pub amount: Money,
    /// Settlement state.
    pub status: WithdrawalStatus,
    /// Payout destination at the time of the request.
    pub payment_details: Option<PaymentDetails>,
    /// Request time.
    pub created_at: DateTime<Utc>,
}

/// A bookable service in the admin-owned catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Service id.
    pub id: ServiceId,
    /// Display name, matched against provider service lists.
    pub name: String,
    /// Grouping such as `Cleaning` or `Plumbing`.
    pub category: String,
    /// Price charged before the service fee.
    pub base_price: Money,
    /// Picture URL.
    pub image: Option<String>,
    /// Catalog rating shown while browsing.
    pub rating: f64,
    /// Marketing description.
    pub description: Option<String>,
}

/// A saved address of a user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    /// Address id.
    pub id: AddressId,
    /// Short name such as `Home` or `Office`.
    pub label: String,
    /// Street line.
    pub line1: String,
    /// Apartment, floor, landmark.
    pub line2: Option<String>,
    /// City.
    pub city: String,
    /// State or region.
    pub state: String,
    /// Postal code.
    pub postal_code: String,
    /// The address pre-selected at checkout.
    pub is_default: bool,
}

impl Address {
    /// Single-line form copied onto bookings.
    #[must_use]
    pub fn formatted(&self) -> String {
        let mut parts = vec![self.line1.as_str()];
        if let Some(line2) = self.line2.as_deref().filter(|l| !l.trim().is_empty()) {
            parts.push(line2);
        }
        parts.push(&self.city);
        let tail = format!("{} {}", self.state, self.postal_code);
        let mut out = parts.join(", ");
        out.push_str(", ");
        out.push_str(tail.trim());
        out
    }

    /// Check that the required lines are present.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Validation`] naming the first blank field.
    pub fn validate(&self) -> Result<(), MarketplaceError> {
        for (value, field) in [
            (&self.label, "label"),
            (&self.line1, "address line"),
            (&self.city, "city"),
            (&self.postal_code, "postal code"),
        ] {
            if value.trim().is_empty() {
                return Err(MarketplaceError::validation(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

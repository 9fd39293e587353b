//! Injected dependencies.
//!
//! The pure core never reads the wall clock or an ambient "current user".
//! Services receive both through these traits, so tests can pin time and
//! identity.

use crate::types::UserId;
use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```
/// use marketplace_core::environment::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let before = chrono::Utc::now();
/// assert!(clock.now() >= before);
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock reading the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The authenticated caller, as far as the marketplace cares.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// User id, stamped as `customerId` / `providerId` on writes.
    pub id: UserId,
    /// Login email.
    pub email: String,
}

/// Source of the current caller.
///
/// Authentication and sessions live outside the marketplace; this trait is
/// the whole contract.
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, or `None` for anonymous callers.
    fn current_user(&self) -> Option<Identity>;
}

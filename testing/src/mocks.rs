//! Mock implementations of Environment traits.

use chrono::{DateTime, Duration, Utc};
use marketplace_core::environment::{Clock, Identity, IdentityProvider};
use marketplace_core::types::UserId;
use std::sync::{Arc, Mutex};

/// Fixed clock for deterministic tests
///
/// Always returns the same time, making tests reproducible.
///
/// # Example
///
/// ```
/// use marketplace_testing::mocks::FixedClock;
/// use marketplace_core::environment::Clock;
/// use chrono::Utc;
///
/// let clock = FixedClock::new(Utc::now());
/// assert_eq!(clock.now(), clock.now());
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Default instant for tests: 2024-05-20 08:00:00 UTC, a Monday.
#[must_use]
pub fn test_time() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_716_192_000, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Create a default fixed clock for tests (see [`test_time`]).
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::new(test_time())
}

/// Clock that only moves when told to.
///
/// Clones share the same time, so a test can hand one clone to the services
/// and keep another to advance.
#[derive(Debug, Clone)]
pub struct ManualClock {
    time: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Start at the given time.
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(Mutex::new(time)),
        }
    }

    /// Start at [`test_time`].
    #[must_use]
    pub fn starting_now() -> Self {
        Self::new(test_time())
    }

    /// Move forward.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut time) = self.time.lock() {
            *time += by;
        }
    }

    /// Jump to an instant.
    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut time) = self.time.lock() {
            *time = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
            .lock()
            .map_or(DateTime::<Utc>::UNIX_EPOCH, |time| *time)
    }
}

/// Identity provider returning a fixed caller.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    identity: Option<Identity>,
}

impl StaticIdentity {
    /// A signed-in caller.
    #[must_use]
    pub fn signed_in(id: UserId, email: impl Into<String>) -> Self {
        Self {
            identity: Some(Identity {
                id,
                email: email.into(),
            }),
        }
    }

    /// Nobody signed in.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { identity: None }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<Identity> {
        self.identity.clone()
    }
}

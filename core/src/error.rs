//! Domain error taxonomy.
//!
//! Every mutating operation of the marketplace returns either the updated
//! entity or one of these errors. Validation and balance errors are
//! caller-correctable; `Conflict` means a conditional write lost a race and the
//! caller should re-fetch and decide again; `Persistence` means the store was
//! unreachable or rejected the write for a reason other than a precondition.

use crate::document::StoreError;
use crate::money::Money;
use thiserror::Error;

/// Errors surfaced by marketplace operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketplaceError {
    /// Missing or malformed input (checkout without date, rating out of range, ...).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A conditional write lost an optimistic-concurrency race.
    ///
    /// The engine never retries; the caller must re-fetch current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A withdrawal asked for more than the available balance.
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Amount the provider asked to withdraw.
        requested: Money,
        /// Balance at the time of the request.
        available: Money,
    },

    /// A withdrawal amount was zero, negative or not a number.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// The store is unreachable or returned unusable data.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A referenced record does not exist.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Kind of record (`booking`, `user`, ...).
        resource: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The booking's current status does not admit the requested action.
    #[error("Cannot {action} a booking that is {from}")]
    InvalidTransition {
        /// Status the booking was in.
        from: String,
        /// Action that was attempted.
        action: String,
    },

    /// The actor is not allowed to perform this operation on this record.
    #[error("Not permitted: {0}")]
    NotPermitted(String),
}

impl MarketplaceError {
    /// Shorthand for a [`MarketplaceError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for a [`MarketplaceError::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Shorthand for a [`MarketplaceError::NotPermitted`].
    pub fn not_permitted(message: impl Into<String>) -> Self {
        Self::NotPermitted(message.into())
    }

    /// Shorthand for a [`MarketplaceError::NotFound`].
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Whether the caller should re-fetch and retry the decision.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<StoreError> for MarketplaceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict { .. } => Self::Conflict(error.to_string()),
            StoreError::NotFound { collection, id } => Self::NotFound {
                resource: collection.resource_name(),
                id: id.to_string(),
            },
            StoreError::AlreadyExists { .. }
            | StoreError::Database(_)
            | StoreError::Serialization(_) => Self::Persistence(error.to_string()),
        }
    }
}

/// Convenience alias used throughout the marketplace crates.
pub type Result<T> = std::result::Result<T, MarketplaceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Collection, DocumentId, Version};

    #[test]
    fn store_conflict_maps_to_conflict() {
        let err: MarketplaceError = StoreError::Conflict {
            collection: Collection::Bookings,
            id: DocumentId::new("b-1"),
            expected: Version::new(1),
            actual: Some(Version::new(2)),
        }
        .into();
        assert!(err.is_conflict());
    }

    #[test]
    fn store_not_found_keeps_resource_name() {
        let err: MarketplaceError = StoreError::NotFound {
            collection: Collection::Bookings,
            id: DocumentId::new("b-1"),
        }
        .into();
        assert_eq!(err, MarketplaceError::not_found("booking", "b-1"));
    }

    #[test]
    fn database_errors_are_persistence() {
        let err: MarketplaceError = StoreError::Database("connection reset".to_string()).into();
        assert!(matches!(err, MarketplaceError::Persistence(_)));
    }
}

//! # Marketplace Core
//!
//! Domain types and pure business rules for the home-services marketplace.
//!
//! Customers book home-service professionals; providers accept and fulfil
//! jobs; admins moderate. This crate holds everything that can be decided
//! without I/O:
//!
//! - **Booking lifecycle** ([`lifecycle`]): the single state machine every
//!   booking status change goes through
//! - **Marketplace matching** ([`matching`]): which pending bookings a
//!   provider may see
//! - **Availability** ([`availability`]): weekly schedules and the slot predicate
//! - **Ratings** ([`rating`]): average and count recomputed from reviews
//! - **Earnings** ([`ledger`]): revenue, balance and history from completed jobs
//! - **Persistence contract** ([`document`]): the `DocumentStore` trait with
//!   version-guarded writes
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell: services in `marketplace-runtime`
//!   read documents, ask this crate what to do, then write back with the
//!   version they read
//! - Dependency Injection via Environment: time and identity come in through
//!   [`environment::Clock`] and [`environment::IdentityProvider`]
//! - Money in integer cents ([`money::Money`])
//!
//! ## Example
//!
//! ```
//! use marketplace_core::rating::RatingSummary;
//! use marketplace_core::money::Money;
//! use marketplace_core::pricing::BookingPolicy;
//!
//! let quote = BookingPolicy::default().quote(Money::from_units(100)).unwrap();
//! assert_eq!(quote.total, Money::from_units(110));
//!
//! assert_eq!(RatingSummary::from_ratings([5, 4, 3]).label(), "4.0");
//! ```

pub mod availability;
pub mod dashboard;
pub mod document;
pub mod environment;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod matching;
pub mod money;
pub mod pricing;
pub mod rating;
pub mod types;

pub use document::{Collection, DocumentId, DocumentStore, Query, StoreError, StoredDocument, Version, WriteOp};
pub use error::{MarketplaceError, Result};
pub use money::Money;

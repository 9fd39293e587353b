//! HTTP request handlers.
//!
//! This module contains all HTTP handlers organized by domain.

pub mod bookings;
pub mod catalog;
pub mod dashboard;
pub mod earnings;
pub mod health;
pub mod profile;
pub mod reviews;

// Re-export common handler utilities
pub use health::health_check;

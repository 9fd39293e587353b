//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the marketplace services:
//! - Booking creation and lifecycle transitions
//! - Lost optimistic-concurrency races
//! - Reviews and rating reconciliation
//! - Withdrawals
//! - Document store latency (recorded by the Postgres adapter)
//!
//! # Example
//!
//! ```rust,no_run
//! use marketplace_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:8080".parse()?);
//! server.start()?;
//!
//! // Rendered by the web layer at GET /metrics
//! let _text = server.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder and render handle.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address the HTTP layer serves `/metrics` on, for logging
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register descriptions and install the global recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the metrics exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this logs
    /// a warning and leaves the handle unset.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics recorder installed - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder hasn't been installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!("bookings_created_total", "Total number of bookings created at checkout");
    describe_counter!(
        "booking_transitions_total",
        "Total number of booking state transitions written, by action"
    );
    describe_counter!(
        "booking_conflicts_total",
        "Total number of conditional writes that lost a concurrent race, by operation"
    );
    describe_counter!("reviews_submitted_total", "Total number of reviews submitted");
    describe_counter!(
        "rating_reconciliations_total",
        "Total number of provider rating reconciliations, by outcome"
    );
    describe_counter!("withdrawals_total", "Total number of withdrawal requests, by outcome");
    describe_histogram!(
        "document_store_operation_duration_seconds",
        "Time taken by document store operations"
    );
}

/// Booking metrics recorder.
pub struct BookingMetrics;

impl BookingMetrics {
    /// Record a checkout.
    pub fn record_created() {
        counter!("bookings_created_total").increment(1);
    }

    /// Record a written transition.
    pub fn record_transition(action: &'static str) {
        counter!("booking_transitions_total", "action" => action).increment(1);
    }

    /// Record a lost race.
    pub fn record_conflict(operation: &'static str) {
        counter!("booking_conflicts_total", "operation" => operation).increment(1);
    }
}

/// Rating metrics recorder.
pub struct RatingMetrics;

impl RatingMetrics {
    /// Record a submitted review.
    pub fn record_review() {
        counter!("reviews_submitted_total").increment(1);
    }

    /// Record a reconciliation (`unchanged`, `corrected` or `failed`).
    pub fn record_reconciliation(outcome: &'static str) {
        counter!("rating_reconciliations_total", "outcome" => outcome).increment(1);
    }
}

/// Withdrawal metrics recorder.
pub struct WithdrawalMetrics;

impl WithdrawalMetrics {
    /// Record a withdrawal request (`processed`, `rejected`, `conflict` or `failed`).
    pub fn record(outcome: &'static str) {
        counter!("withdrawals_total", "outcome" => outcome).increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[test]
    fn test_metrics_server_start() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        assert!(server.start().is_ok());

        BookingMetrics::record_created();
        BookingMetrics::record_transition("accept");
        // handle is None if another test already installed the recorder
        if let Some(text) = server.render() {
            assert!(text.contains("bookings_created_total"));
        }
    }
}

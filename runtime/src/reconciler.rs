//! Background rating reconciliation.
//!
//! Walks every provider on an interval and heals cached ratings that drifted
//! from their reviews, for instance after a rating refresh that failed
//! following a review.

use crate::MarketplaceEnvironment;
use crate::ratings::RatingService;
use crate::repository::Repository;
use futures::stream::{self, StreamExt};
use marketplace_core::document::{Collection, Query};
use marketplace_core::error::Result;
use marketplace_core::types::{Role, User};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Shortest interval between passes; shorter requests are raised to it.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of one reconciliation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Providers examined.
    pub checked: usize,
    /// Providers whose cached rating was rewritten.
    pub corrected: usize,
    /// Providers that could not be reconciled this pass.
    pub failed: usize,
}

/// Periodically reconciles every provider's rating.
#[derive(Clone, Debug)]
pub struct RatingReconciler {
    repo: Repository,
    ratings: RatingService,
    interval: Duration,
    concurrency: usize,
}

impl RatingReconciler {
    /// Build a reconciler running every `interval` (at least
    /// [`MIN_INTERVAL`]), with at most `concurrency` providers in flight.
    #[must_use]
    pub fn new(env: &MarketplaceEnvironment, interval: Duration, concurrency: usize) -> Self {
        Self {
            repo: env.repository(),
            ratings: RatingService::new(env),
            interval: interval.max(MIN_INTERVAL),
            concurrency: concurrency.max(1),
        }
    }

    /// Time between passes.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Reconcile every provider once.
    ///
    /// Per-provider failures are counted and logged, never returned.
    ///
    /// # Errors
    ///
    /// `Persistence` if the provider list cannot be read.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<ReconcileReport> {
        let providers: Vec<User> = self
            .repo
            .query_records(
                Collection::Users,
                Query::all().eq("role", Role::Provider.to_string()),
            )
            .await?;

        let report = stream::iter(providers)
            .map(|provider| {
                let ratings = self.ratings.clone();
                async move { (provider.id, ratings.reconcile_provider_rating(provider.id).await) }
            })
            .buffer_unordered(self.concurrency)
            .fold(ReconcileReport::default(), |mut report, (id, result)| async move {
                report.checked += 1;
                match result {
                    Ok(r) if r.corrected => report.corrected += 1,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(provider = %id, error = %e, "Rating reconciliation failed");
                        report.failed += 1;
                    }
                }
                report
            })
            .await;

        if report.corrected > 0 || report.failed > 0 {
            info!(
                checked = report.checked,
                corrected = report.corrected,
                failed = report.failed,
                "Rating reconciliation pass finished"
            );
        } else {
            debug!(checked = report.checked, "Ratings consistent");
        }
        Ok(report)
    }

    /// Run passes on the interval until a shutdown signal arrives.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval = ?self.interval, concurrency = self.concurrency, "Rating reconciler started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Rating reconciler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        warn!(error = %e, "Rating reconciliation pass failed");
                    }
                }
            }
        }
    }
}

//! Provider earnings and withdrawals.
//!
//! The balance is never stored: it is recomputed from completed bookings and
//! past withdrawals on every read. Concurrent withdrawals of one provider
//! are serialized through the provider's user document. The profile is read
//! before the ledger, and the withdrawal is written in the same batch as a
//! version-guarded rewrite of that profile. Two requests racing on the same
//! balance therefore cannot both commit; the second gets `Conflict`.

use crate::MarketplaceEnvironment;
use crate::metrics::WithdrawalMetrics;
use crate::repository::Repository;
use marketplace_core::document::{Collection, Query};
use marketplace_core::environment::Clock;
use marketplace_core::error::{MarketplaceError, Result};
use marketplace_core::ledger::{self, EarningsSummary};
use marketplace_core::money::Money;
use marketplace_core::types::{UserId, Withdrawal, WithdrawalId, WithdrawalStatus};
use std::sync::Arc;
use tracing::{info, warn};

/// Computes earnings and records withdrawals.
#[derive(Clone)]
pub struct EarningsService {
    repo: Repository,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for EarningsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EarningsService").finish_non_exhaustive()
    }
}

impl EarningsService {
    /// Build the service from the shared environment.
    #[must_use]
    pub fn new(env: &MarketplaceEnvironment) -> Self {
        Self {
            repo: env.repository(),
            clock: Arc::clone(&env.clock),
        }
    }

    /// Revenue, withdrawals, balance, pending earnings and the transaction
    /// list of a provider.
    ///
    /// # Errors
    ///
    /// `NotFound` / `NotPermitted` if the caller is not a provider,
    /// `Persistence` on store failure.
    #[tracing::instrument(skip(self), fields(provider = %provider_id))]
    pub async fn get_earnings_summary(&self, provider_id: UserId) -> Result<EarningsSummary> {
        self.repo.provider(provider_id).await?;
        self.summary_of(provider_id).await
    }

    async fn summary_of(&self, provider_id: UserId) -> Result<EarningsSummary> {
        let (bookings, withdrawals) = futures::try_join!(
            self.repo.provider_bookings(provider_id),
            self.withdrawals_of(provider_id)
        )?;
        Ok(EarningsSummary::compute(provider_id, &bookings, &withdrawals))
    }

    async fn withdrawals_of(&self, provider_id: UserId) -> Result<Vec<Withdrawal>> {
        self.repo
            .query_records(
                Collection::Withdrawals,
                Query::all().eq("providerId", provider_id.to_string()),
            )
            .await
    }

    /// Withdraw `amount` from the provider's balance to their payout
    /// destination.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount`: zero amount
    /// - `InsufficientBalance`: more than the current balance
    /// - `Validation`: no payout details on file
    /// - `Conflict`: another withdrawal or profile change committed meanwhile
    #[tracing::instrument(skip(self), fields(provider = %provider_id, amount = %amount))]
    pub async fn withdraw(&self, provider_id: UserId, amount: Money) -> Result<Withdrawal> {
        let provider = self.repo.provider(provider_id).await?;
        let summary = self.summary_of(provider_id).await?;

        if let Err(e) = summary.check_withdrawal(amount) {
            WithdrawalMetrics::record("rejected");
            return Err(e);
        }
        let payment_details = provider
            .record
            .provider_profile()
            .and_then(|profile| profile.payment_details.clone())
            .ok_or_else(|| {
                WithdrawalMetrics::record("rejected");
                MarketplaceError::validation("add payout details before withdrawing")
            })?;

        let withdrawal = Withdrawal {
            id: WithdrawalId::new(),
            provider_id,
            amount,
            status: WithdrawalStatus::Processed,
            payment_details: Some(payment_details),
            created_at: self.clock.now(),
        };
        let ops = vec![
            Repository::create_op(Collection::Withdrawals, &withdrawal)?,
            Repository::update_op(Collection::Users, &provider.record, provider.version)?,
        ];

        match self.repo.batch(ops).await {
            Ok(()) => {
                WithdrawalMetrics::record("processed");
                info!(
                    withdrawal = %withdrawal.id,
                    remaining = %summary.balance.saturating_sub(amount),
                    "Withdrawal processed"
                );
                Ok(withdrawal)
            }
            Err(e) if e.is_conflict() => {
                WithdrawalMetrics::record("conflict");
                warn!("Balance changed during withdrawal");
                Err(MarketplaceError::conflict(
                    "balance changed while withdrawing; re-fetch and try again",
                ))
            }
            Err(e) => {
                WithdrawalMetrics::record("failed");
                Err(e)
            }
        }
    }

    /// Like [`EarningsService::withdraw`], parsing the amount from caller
    /// text such as `"120.50"`.
    ///
    /// # Errors
    ///
    /// `InvalidAmount` if the text is not a positive amount with at most two
    /// decimals, otherwise as for [`EarningsService::withdraw`].
    pub async fn withdraw_text(&self, provider_id: UserId, amount: &str) -> Result<Withdrawal> {
        let amount = Money::parse_amount(amount).inspect_err(|_| WithdrawalMetrics::record("rejected"))?;
        self.withdraw(provider_id, amount).await
    }

    /// A provider's withdrawals, newest first.
    ///
    /// # Errors
    ///
    /// `Persistence` on store failure.
    #[tracing::instrument(skip(self), fields(provider = %provider_id))]
    pub async fn list_withdrawals(&self, provider_id: UserId) -> Result<Vec<Withdrawal>> {
        self.repo.provider(provider_id).await?;
        let mut withdrawals = self.withdrawals_of(provider_id).await?;
        withdrawals.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(withdrawals)
    }

    /// The provider's completed jobs as a CSV report.
    ///
    /// # Errors
    ///
    /// As for [`EarningsService::get_earnings_summary`].
    #[tracing::instrument(skip(self), fields(provider = %provider_id))]
    pub async fn export_report(&self, provider_id: UserId) -> Result<String> {
        let summary = self.get_earnings_summary(provider_id).await?;
        Ok(ledger::export_csv(&summary.transactions))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use marketplace_core::pricing::BookingPolicy;
    use marketplace_testing::fixtures::Seed;
    use marketplace_testing::{InMemoryDocumentStore, ManualClock};

    async fn setup() -> (EarningsService, Seed) {
        let store = InMemoryDocumentStore::new();
        let seed = Seed::standard();
        seed.install(&store).await.unwrap();
        let env = MarketplaceEnvironment::new(
            Arc::new(store),
            Arc::new(ManualClock::starting_now()),
            BookingPolicy::default(),
        );
        (EarningsService::new(&env), seed)
    }

    #[tokio::test]
    async fn empty_ledger_has_zero_balance() {
        let (earnings, seed) = setup().await;
        let summary = earnings.get_earnings_summary(seed.provider.id).await.unwrap();
        assert_eq!(summary.revenue, Money::ZERO);
        assert_eq!(summary.balance, Money::ZERO);
        assert!(summary.transactions.is_empty());
    }

    #[tokio::test]
    async fn cannot_withdraw_from_an_empty_balance() {
        let (earnings, seed) = setup().await;
        let err = earnings
            .withdraw(seed.provider.id, Money::from_units(1))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketplaceError::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn malformed_amount_text_is_invalid() {
        let (earnings, seed) = setup().await;
        for text in ["", "abc", "-5", "0", "1.234"] {
            let err = earnings.withdraw_text(seed.provider.id, text).await.unwrap_err();
            assert!(matches!(err, MarketplaceError::InvalidAmount(_)), "{text}");
        }
    }

    #[tokio::test]
    async fn customers_have_no_earnings() {
        let (earnings, seed) = setup().await;
        let err = earnings
            .get_earnings_summary(seed.customer.id)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketplaceError::NotPermitted(_)));
    }

    #[tokio::test]
    async fn empty_report_is_just_the_header() {
        let (earnings, seed) = setup().await;
        let csv = earnings.export_report(seed.provider.id).await.unwrap();
        assert_eq!(csv.lines().next(), Some(ledger::REPORT_HEADER));
        assert_eq!(csv.lines().count(), 1);
    }
}

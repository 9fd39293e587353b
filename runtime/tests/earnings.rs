//! Earnings ledger and withdrawals through the service layer.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::world;
use marketplace_core::document::{Collection, DocumentStore};
use marketplace_core::error::MarketplaceError;
use marketplace_core::ledger::REPORT_HEADER;
use marketplace_core::money::Money;
use marketplace_core::types::{BookingId, BookingStatus};
use marketplace_testing::fixtures;

#[tokio::test]
async fn balance_is_revenue_minus_withdrawals() {
    let w = world().await;
    let done = w.completed_job().await;

    // a second completed job priced at 50
    let mut cheaper = done.clone();
    cheaper.id = BookingId::new();
    cheaper.price = Money::from_units(50);
    cheaper.service_fee = Money::from_units(5);
    cheaper.total = Money::from_units(55);
    fixtures::put(&w.store, Collection::Bookings, cheaper.id.document_id(), &cheaper)
        .await
        .unwrap();

    let earnings = &w.marketplace.earnings;
    let provider = w.seed.provider.id;
    let withdrawal = earnings.withdraw_text(provider, "30").await.unwrap();
    assert_eq!(withdrawal.amount, Money::from_units(30));
    assert!(withdrawal.payment_details.is_some());

    let summary = earnings.get_earnings_summary(provider).await.unwrap();
    assert_eq!(summary.revenue, Money::from_units(150));
    assert_eq!(summary.withdrawn, Money::from_units(30));
    assert_eq!(summary.balance, Money::from_units(120));

    let err = earnings.withdraw(provider, Money::from_units(200)).await.unwrap_err();
    assert!(matches!(
        err,
        MarketplaceError::InsufficientBalance { requested, available }
            if requested == Money::from_units(200) && available == Money::from_units(120)
    ));
    let after = earnings.get_earnings_summary(provider).await.unwrap();
    assert_eq!(after.balance, Money::from_units(120));

    let history = earnings.list_withdrawals(provider).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn pending_counts_accepted_work() {
    let w = world().await;
    let booking = w.open_booking().await;
    w.marketplace
        .bookings
        .accept_booking(booking.id, w.seed.provider.id)
        .await
        .unwrap();

    let summary = w
        .marketplace
        .earnings
        .get_earnings_summary(w.seed.provider.id)
        .await
        .unwrap();
    assert_eq!(summary.revenue, Money::ZERO);
    assert_eq!(summary.pending, Money::from_units(100));

    w.marketplace
        .bookings
        .update_booking_status(booking.id, w.seed.provider.id, BookingStatus::InProgress)
        .await
        .unwrap();
    let summary = w
        .marketplace
        .earnings
        .get_earnings_summary(w.seed.provider.id)
        .await
        .unwrap();
    assert_eq!(summary.pending, Money::from_units(100));
}

#[tokio::test]
async fn report_lists_completed_jobs() {
    let w = world().await;
    let done = w.completed_job().await;

    let csv = w
        .marketplace
        .earnings
        .export_report(w.seed.provider.id)
        .await
        .unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], REPORT_HEADER);
    assert_eq!(
        lines[1],
        format!("{},2024-06-01,Deep Cleaning,Asha,110.00,10.00,100.00", done.id)
    );
}

#[tokio::test]
async fn withdrawing_requires_payout_details() {
    let w = world().await;
    w.completed_job().await;

    let mut provider = w.marketplace.profiles.get_profile(w.seed.provider.id).await.unwrap();
    let version = w
        .store
        .version_of(&Collection::Users, &provider.id.document_id())
        .unwrap()
        .unwrap();
    if let Some(profile) = provider.provider.as_mut() {
        profile.payment_details = None;
    }
    let body = serde_json::to_value(&provider).unwrap();
    w.store
        .update(Collection::Users, provider.id.document_id(), body, Some(version))
        .await
        .unwrap();

    let err = w
        .marketplace
        .earnings
        .withdraw(w.seed.provider.id, Money::from_units(10))
        .await
        .unwrap_err();
    assert!(matches!(err, MarketplaceError::Validation(_)));
}

//! Racing callers and injected faults.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::world;
use marketplace_core::document::Collection;
use marketplace_core::error::MarketplaceError;
use marketplace_core::money::Money;
use marketplace_core::types::BookingStatus;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_providers_accepting_one_booking_exactly_one_wins() {
    for _ in 0..20 {
        let w = world().await;
        let booking = w.open_booking().await;

        let (a, b) = (w.marketplace.bookings.clone(), w.marketplace.bookings.clone());
        let (ravi, meena) = (w.seed.provider.id, w.seed.rival.id);
        let first = tokio::spawn(async move { a.accept_booking(booking.id, ravi).await });
        let second = tokio::spawn(async move { b.accept_booking(booking.id, meena).await });
        let results = [first.await.unwrap(), second.await.unwrap()];

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(loser.is_conflict(), "{loser}");

        let stored = w
            .marketplace
            .bookings
            .get_booking(booking.id, w.seed.admin.id)
            .await
            .unwrap();
        assert_eq!(stored.status, BookingStatus::Upcoming);
        assert_eq!(stored.provider_id, winners[0].provider_id);
    }
}

#[tokio::test]
async fn interleaved_writer_makes_accept_conflict_without_writing() {
    let w = world().await;
    let booking = w.open_booking().await;

    w.faults.interleave_next_write_to(&Collection::Bookings);
    let err = w
        .marketplace
        .bookings
        .accept_booking(booking.id, w.seed.provider.id)
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let stored = w
        .marketplace
        .bookings
        .get_booking(booking.id, w.seed.customer.id)
        .await
        .unwrap();
    assert!(stored.is_open());

    // re-fetching and retrying succeeds
    let accepted = w
        .marketplace
        .bookings
        .accept_booking(booking.id, w.seed.provider.id)
        .await
        .unwrap();
    assert_eq!(accepted.status, BookingStatus::Upcoming);
}

#[tokio::test]
async fn interleaved_writer_makes_cancel_conflict() {
    let w = world().await;
    let booking = w.open_booking().await;
    w.faults.interleave_next_write_to(&Collection::Bookings);
    let err = w
        .marketplace
        .bookings
        .cancel_booking(booking.id, w.seed.customer.id)
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn review_survives_a_failed_rating_refresh_and_the_reconciler_heals_it() {
    let w = world().await;
    let done = w.completed_job().await;

    w.faults.fail_writes_to(&Collection::Users);
    let review = w
        .marketplace
        .ratings
        .submit_review(done.id, w.seed.customer.id, 4, "Good".to_string())
        .await
        .unwrap();
    assert_eq!(review.rating, 4);

    let provider = w.marketplace.profiles.get_profile(w.seed.provider.id).await.unwrap();
    assert_eq!(provider.provider_profile().unwrap().review_count, 0);

    // the dashboard shows the cached rating while the store refuses writes
    let dashboard = w
        .marketplace
        .dashboard
        .provider_dashboard(w.seed.provider.id)
        .await
        .unwrap();
    assert_eq!(dashboard.rating.count, 0);

    w.faults.heal();
    let report = w
        .marketplace
        .reconciler(std::time::Duration::from_secs(60), 2)
        .run_once()
        .await
        .unwrap();
    assert_eq!(report.checked, 3);
    assert_eq!(report.corrected, 1);
    assert_eq!(report.failed, 0);

    let provider = w.marketplace.profiles.get_profile(w.seed.provider.id).await.unwrap();
    let profile = provider.provider_profile().unwrap();
    assert_eq!(profile.review_count, 1);
    assert!((profile.rating - 4.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn reconciler_with_zero_interval_runs_and_stops() {
    let w = world().await;
    let reconciler = w.marketplace.reconciler(std::time::Duration::ZERO, 0);
    assert_eq!(reconciler.interval(), marketplace_runtime::reconciler::MIN_INTERVAL);

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let task = tokio::spawn(reconciler.run(shutdown_rx));
    tokio::task::yield_now().await;
    shutdown_tx.send(()).unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(5), task)
        .await
        .expect("reconciler stops on shutdown")
        .expect("reconciler task does not panic");
}

#[tokio::test]
async fn failed_review_batch_leaves_nothing_behind() {
    let w = world().await;
    let done = w.completed_job().await;

    w.faults.fail_writes_to(&Collection::Reviews);
    let err = w
        .marketplace
        .ratings
        .submit_review(done.id, w.seed.customer.id, 5, String::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MarketplaceError::Persistence(_)));

    assert_eq!(w.store.count(&Collection::Reviews).unwrap(), 0);
    let stored = w
        .marketplace
        .bookings
        .get_booking(done.id, w.seed.customer.id)
        .await
        .unwrap();
    assert!(!stored.is_reviewed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_withdrawals_never_overdraw() {
    for _ in 0..10 {
        let w = world().await;
        w.completed_job().await;

        let (a, b) = (w.marketplace.earnings.clone(), w.marketplace.earnings.clone());
        let provider = w.seed.provider.id;
        let first = tokio::spawn(async move { a.withdraw(provider, Money::from_units(80)).await });
        let second = tokio::spawn(async move { b.withdraw(provider, Money::from_units(80)).await });
        let results = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(
            loser.is_conflict() || matches!(loser, MarketplaceError::InsufficientBalance { .. }),
            "{loser}"
        );

        let summary = w.marketplace.earnings.get_earnings_summary(provider).await.unwrap();
        assert_eq!(summary.balance, Money::from_units(20));
    }
}

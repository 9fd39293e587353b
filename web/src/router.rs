//! Marketplace HTTP router.
//!
//! Composes every handler into a single Axum router.

use crate::handlers::{bookings, catalog, dashboard, earnings, health, profile, reviews};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the marketplace router with all endpoints.
///
/// # Routes
///
/// - `GET /health`, `GET /health/ready`, `GET /metrics`
/// - `GET /services`, `GET /services/:id`, `GET /services/:id/providers`
/// - `POST /bookings` (checkout), `GET /bookings` (mine)
/// - `GET /bookings/:id`
/// - `POST /bookings/:id/{accept,status,reschedule,cancel,review}`
/// - `GET /provider/jobs`, `GET /provider/requests`, `GET /provider/requests/available`
/// - `GET /provider/dashboard`, `GET /provider/earnings`, `GET /provider/earnings/report`
/// - `GET|POST /provider/withdrawals`
/// - `GET /providers/:id/reviews`, `POST /providers/:id/rating/reconcile`
/// - `GET /admin/bookings`
/// - `POST|GET|PATCH /me`, `POST /me/onboarding`, `PUT /me/{services,availability,payout}`
/// - `GET|POST /me/addresses`, `PUT|DELETE /me/addresses/:id`, `POST /me/addresses/:id/default`
///
/// Every route except health, metrics and the catalog expects the
/// `X-User-Id` header.
pub fn marketplace_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        // Catalog
        .route("/services", get(catalog::list_services))
        .route("/services/:id", get(catalog::get_service))
        .route("/services/:id/providers", get(catalog::list_service_providers))
        // Bookings
        .route(
            "/bookings",
            post(bookings::create_booking).get(bookings::list_my_bookings),
        )
        .route("/bookings/:id", get(bookings::get_booking))
        .route("/bookings/:id/accept", post(bookings::accept_booking))
        .route("/bookings/:id/status", post(bookings::update_status))
        .route("/bookings/:id/reschedule", post(bookings::reschedule_booking))
        .route("/bookings/:id/cancel", post(bookings::cancel_booking))
        .route("/bookings/:id/review", post(reviews::submit_review))
        .route("/admin/bookings", get(bookings::list_all_bookings))
        // Provider workspace
        .route("/provider/jobs", get(bookings::list_provider_jobs))
        .route("/provider/requests", get(bookings::list_eligible_requests))
        .route(
            "/provider/requests/available",
            get(bookings::list_available_requests),
        )
        .route("/provider/dashboard", get(dashboard::provider_dashboard))
        .route("/provider/earnings", get(earnings::earnings_summary))
        .route("/provider/earnings/report", get(earnings::export_report))
        .route(
            "/provider/withdrawals",
            post(earnings::withdraw).get(earnings::list_withdrawals),
        )
        .route("/providers/:id/reviews", get(reviews::list_provider_reviews))
        .route(
            "/providers/:id/rating/reconcile",
            post(reviews::reconcile_rating),
        )
        // Own account
        .route(
            "/me",
            post(profile::register)
                .get(profile::get_profile)
                .patch(profile::update_contact),
        )
        .route("/me/onboarding", post(profile::complete_onboarding))
        .route("/me/services", put(profile::update_services))
        .route("/me/availability", put(profile::update_availability))
        .route("/me/payout", put(profile::update_payout_details))
        .route(
            "/me/addresses",
            get(profile::list_addresses).post(profile::add_address),
        )
        .route(
            "/me/addresses/:id",
            put(profile::update_address).delete(profile::delete_address),
        )
        .route(
            "/me/addresses/:id/default",
            post(profile::set_default_address),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(correlation_id_layer())
}

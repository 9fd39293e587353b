//! Reviews and provider ratings.

use crate::error::AppError;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use marketplace_core::types::{BookingId, Review, UserId};
use marketplace_runtime::Reconciliation;
use serde::Deserialize;

/// Body of `POST /bookings/:id/review`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    /// Stars, 1 to 5.
    pub rating: u8,
    /// Free text, may be empty.
    #[serde(default)]
    pub comment: String,
}

/// `POST /bookings/:id/review`
#[tracing::instrument(skip(state, request), fields(customer = %caller.id()))]
pub async fn submit_review(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<BookingId>,
    Json(request): Json<ReviewRequest>,
) -> Result<(StatusCode, Json<Review>), AppError> {
    let review = state
        .marketplace
        .ratings
        .submit_review(id, caller.id(), request.rating, request.comment)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// `GET /providers/:id/reviews`
pub async fn list_provider_reviews(
    State(state): State<AppState>,
    _caller: Caller,
    Path(provider_id): Path<UserId>,
) -> Result<Json<Vec<Review>>, AppError> {
    let reviews = state
        .marketplace
        .ratings
        .list_provider_reviews(provider_id)
        .await?;
    Ok(Json(reviews))
}

/// `POST /providers/:id/rating/reconcile`
pub async fn reconcile_rating(
    State(state): State<AppState>,
    _caller: Caller,
    Path(provider_id): Path<UserId>,
) -> Result<Json<Reconciliation>, AppError> {
    let reconciliation = state
        .marketplace
        .ratings
        .reconcile_provider_rating(provider_id)
        .await?;
    Ok(Json(reconciliation))
}

//! Booking lifecycle endpoints.
//!
//! Every mutation answers with the booking as it now stands. Idempotent
//! repeats (cancelling a cancelled booking, re-accepting one you already
//! hold) answer 200 with the unchanged booking.

use crate::error::AppError;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{NaiveDate, NaiveTime};
use marketplace_core::lifecycle::BookingRequest;
use marketplace_core::types::{Booking, BookingId, BookingStatus, hhmm};
use marketplace_runtime::JobFilter;
use serde::Deserialize;

/// Body of `POST /bookings/:id/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusChange {
    /// Target status.
    pub status: BookingStatus,
}

/// Body of `POST /bookings/:id/reschedule`.
#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleRequest {
    /// New day.
    pub date: NaiveDate,
    /// New time, `HH:MM`.
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
}

/// Query of `GET /provider/jobs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobsQuery {
    /// `active` (default), `completed` or `all`.
    #[serde(default)]
    pub filter: JobFilter,
}

/// Query of `GET /admin/bookings`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusQuery {
    /// Only bookings in this status.
    pub status: Option<BookingStatus>,
}

/// `POST /bookings`: checkout.
#[tracing::instrument(skip(state, request), fields(customer = %caller.id()))]
pub async fn create_booking(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<BookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state
        .marketplace
        .bookings
        .create_booking(caller.id(), request)
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// `GET /bookings`: the caller's bookings as a customer.
pub async fn list_my_bookings(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<Booking>>, AppError> {
    let bookings = state
        .marketplace
        .bookings
        .list_customer_bookings(caller.id())
        .await?;
    Ok(Json(bookings))
}

/// `GET /bookings/:id`
pub async fn get_booking(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<BookingId>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.marketplace.bookings.get_booking(id, caller.id()).await?;
    Ok(Json(booking))
}

/// `POST /bookings/:id/accept`
#[tracing::instrument(skip(state), fields(provider = %caller.id()))]
pub async fn accept_booking(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<BookingId>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.marketplace.bookings.accept_booking(id, caller.id()).await?;
    Ok(Json(booking))
}

/// `POST /bookings/:id/status`
#[tracing::instrument(skip(state), fields(actor = %caller.id()))]
pub async fn update_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<BookingId>,
    Json(change): Json<StatusChange>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .marketplace
        .bookings
        .update_booking_status(id, caller.id(), change.status)
        .await?;
    Ok(Json(booking))
}

/// `POST /bookings/:id/reschedule`
#[tracing::instrument(skip(state), fields(customer = %caller.id()))]
pub async fn reschedule_booking(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<BookingId>,
    Json(slot): Json<RescheduleRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .marketplace
        .bookings
        .reschedule_booking(id, caller.id(), slot.date, slot.time)
        .await?;
    Ok(Json(booking))
}

/// `POST /bookings/:id/cancel`
#[tracing::instrument(skip(state), fields(actor = %caller.id()))]
pub async fn cancel_booking(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<BookingId>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.marketplace.bookings.cancel_booking(id, caller.id()).await?;
    Ok(Json(booking))
}

/// `GET /provider/jobs?filter=active|completed|all`
pub async fn list_provider_jobs(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<JobsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let jobs = state
        .marketplace
        .bookings
        .list_provider_jobs(caller.id(), query.filter)
        .await?;
    Ok(Json(jobs))
}

/// `GET /provider/requests`: open requests for services the caller offers.
pub async fn list_eligible_requests(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<Booking>>, AppError> {
    let requests = state
        .marketplace
        .bookings
        .list_eligible_requests(caller.id())
        .await?;
    Ok(Json(requests))
}

/// `GET /provider/requests/available`: eligible requests inside the
/// caller's working hours.
pub async fn list_available_requests(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<Booking>>, AppError> {
    let requests = state
        .marketplace
        .bookings
        .list_available_requests(caller.id())
        .await?;
    Ok(Json(requests))
}

/// `GET /admin/bookings?status=`
pub async fn list_all_bookings(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let bookings = state
        .marketplace
        .bookings
        .list_all_bookings(caller.id(), query.status)
        .await?;
    Ok(Json(bookings))
}

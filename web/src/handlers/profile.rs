//! The caller's own account: registration, contact details, provider
//! onboarding and saved addresses.
//!
//! Routes live under `/me`, so a caller can only ever touch their own
//! records.

use crate::error::AppError;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use marketplace_core::availability::DaySchedule;
use marketplace_core::types::{Address, AddressId, PaymentDetails, User};
use marketplace_runtime::profiles::{AddressInput, ContactUpdate, Onboarding, Registration};
use serde::Deserialize;

/// Body of `PUT /me/services`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServicesUpdate {
    /// Catalog service names.
    pub services: Vec<String>,
}

/// Body of `PUT /me/availability`.
#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityUpdate {
    /// One entry per weekday.
    pub days: Vec<DaySchedule>,
}

/// `POST /me`
#[tracing::instrument(skip(state, registration), fields(user = %caller.id()))]
pub async fn register(
    State(state): State<AppState>,
    caller: Caller,
    Json(registration): Json<Registration>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = state.marketplace.profiles.register(&caller.0, registration).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /me`
pub async fn get_profile(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<User>, AppError> {
    let user = state.marketplace.profiles.get_profile(caller.id()).await?;
    Ok(Json(user))
}

/// `PATCH /me`
pub async fn update_contact(
    State(state): State<AppState>,
    caller: Caller,
    Json(update): Json<ContactUpdate>,
) -> Result<Json<User>, AppError> {
    let user = state
        .marketplace
        .profiles
        .update_contact(caller.id(), update)
        .await?;
    Ok(Json(user))
}

/// `POST /me/onboarding`
#[tracing::instrument(skip(state, onboarding), fields(provider = %caller.id()))]
pub async fn complete_onboarding(
    State(state): State<AppState>,
    caller: Caller,
    Json(onboarding): Json<Onboarding>,
) -> Result<Json<User>, AppError> {
    let user = state
        .marketplace
        .profiles
        .complete_onboarding(caller.id(), onboarding)
        .await?;
    Ok(Json(user))
}

/// `PUT /me/services`
pub async fn update_services(
    State(state): State<AppState>,
    caller: Caller,
    Json(update): Json<ServicesUpdate>,
) -> Result<Json<User>, AppError> {
    let user = state
        .marketplace
        .profiles
        .update_services(caller.id(), update.services)
        .await?;
    Ok(Json(user))
}

/// `PUT /me/availability`
pub async fn update_availability(
    State(state): State<AppState>,
    caller: Caller,
    Json(update): Json<AvailabilityUpdate>,
) -> Result<Json<User>, AppError> {
    let user = state
        .marketplace
        .profiles
        .update_availability(caller.id(), update.days)
        .await?;
    Ok(Json(user))
}

/// `PUT /me/payout`
pub async fn update_payout_details(
    State(state): State<AppState>,
    caller: Caller,
    Json(details): Json<PaymentDetails>,
) -> Result<Json<User>, AppError> {
    let user = state
        .marketplace
        .profiles
        .update_payout_details(caller.id(), details)
        .await?;
    Ok(Json(user))
}

/// `GET /me/addresses`
pub async fn list_addresses(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<Address>>, AppError> {
    let addresses = state.marketplace.profiles.list_addresses(caller.id()).await?;
    Ok(Json(addresses))
}

/// `POST /me/addresses`
pub async fn add_address(
    State(state): State<AppState>,
    caller: Caller,
    Json(input): Json<AddressInput>,
) -> Result<(StatusCode, Json<Address>), AppError> {
    let address = state
        .marketplace
        .profiles
        .add_address(caller.id(), input)
        .await?;
    Ok((StatusCode::CREATED, Json(address)))
}

/// `PUT /me/addresses/:id`
pub async fn update_address(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<AddressId>,
    Json(input): Json<AddressInput>,
) -> Result<Json<Address>, AppError> {
    let address = state
        .marketplace
        .profiles
        .update_address(caller.id(), id, input)
        .await?;
    Ok(Json(address))
}

/// `DELETE /me/addresses/:id`
pub async fn delete_address(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<AddressId>,
) -> Result<StatusCode, AppError> {
    state
        .marketplace
        .profiles
        .delete_address(caller.id(), id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /me/addresses/:id/default`: answers with the reordered list.
pub async fn set_default_address(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<AddressId>,
) -> Result<Json<Vec<Address>>, AppError> {
    let addresses = state
        .marketplace
        .profiles
        .set_default_address(caller.id(), id)
        .await?;
    Ok(Json(addresses))
}

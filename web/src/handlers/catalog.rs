//! Catalog browsing. Read-only; no identity required.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use marketplace_core::types::{Service, ServiceId, User};
use serde::Deserialize;

/// Query of `GET /services`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryQuery {
    /// Only services in this category.
    pub category: Option<String>,
}

/// `GET /services?category=`
pub async fn list_services(
    State(state): State<AppState>,
    Query(query): Query<CategoryQuery>,
) -> Result<Json<Vec<Service>>, AppError> {
    let catalog = &state.marketplace.catalog;
    let services = match query.category.as_deref().map(str::trim) {
        Some(category) if !category.is_empty() => {
            catalog.list_services_by_category(category).await?
        }
        _ => catalog.list_services().await?,
    };
    Ok(Json(services))
}

/// `GET /services/:id`
pub async fn get_service(
    State(state): State<AppState>,
    Path(id): Path<ServiceId>,
) -> Result<Json<Service>, AppError> {
    Ok(Json(state.marketplace.catalog.get_service(id).await?))
}

/// `GET /services/:id/providers`: onboarded professionals offering it.
pub async fn list_service_providers(
    State(state): State<AppState>,
    Path(id): Path<ServiceId>,
) -> Result<Json<Vec<User>>, AppError> {
    let providers = state
        .marketplace
        .catalog
        .list_providers_for_service(id)
        .await?;
    Ok(Json(providers))
}

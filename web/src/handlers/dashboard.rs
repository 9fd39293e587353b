//! Provider home screen.

use crate::WebResult;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{Json, extract::State};
use marketplace_core::dashboard::ProviderDashboard;

/// `GET /provider/dashboard`
pub async fn provider_dashboard(
    State(state): State<AppState>,
    caller: Caller,
) -> WebResult<Json<ProviderDashboard>> {
    let dashboard = state
        .marketplace
        .dashboard
        .provider_dashboard(caller.id())
        .await?;
    Ok(Json(dashboard))
}

//! Provider earnings and withdrawals.

use crate::error::AppError;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use marketplace_core::ledger::EarningsSummary;
use marketplace_core::types::Withdrawal;
use serde::Deserialize;

/// Withdrawal amount as typed into the form or sent as a JSON number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    /// `"120.50"`
    Text(String),
    /// `120.5`
    Number(serde_json::Number),
}

impl AmountInput {
    fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Number(number) => number.to_string(),
        }
    }
}

/// Body of `POST /provider/withdrawals`.
#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawRequest {
    /// Amount in currency units.
    pub amount: AmountInput,
}

/// `GET /provider/earnings`
pub async fn earnings_summary(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<EarningsSummary>, AppError> {
    let summary = state
        .marketplace
        .earnings
        .get_earnings_summary(caller.id())
        .await?;
    Ok(Json(summary))
}

/// `POST /provider/withdrawals`
#[tracing::instrument(skip(state, request), fields(provider = %caller.id()))]
pub async fn withdraw(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<WithdrawRequest>,
) -> Result<(StatusCode, Json<Withdrawal>), AppError> {
    let withdrawal = state
        .marketplace
        .earnings
        .withdraw_text(caller.id(), &request.amount.as_text())
        .await?;
    Ok((StatusCode::CREATED, Json(withdrawal)))
}

/// `GET /provider/withdrawals`
pub async fn list_withdrawals(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<Withdrawal>>, AppError> {
    let withdrawals = state.marketplace.earnings.list_withdrawals(caller.id()).await?;
    Ok(Json(withdrawals))
}

/// `GET /provider/earnings/report`: CSV download.
pub async fn export_report(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<impl IntoResponse, AppError> {
    let csv = state.marketplace.earnings.export_report(caller.id()).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"earnings.csv\"",
            ),
        ],
        csv,
    ))
}

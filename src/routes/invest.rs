use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{utils, AppState};

#[derive(Debug, Deserialize)]
pub struct InvestRequest {
    pub plan_id: Uuid,
    pub amount: Decimal,
}

// Plans are public: prospective investors browse them before signing up.
async fn list_plans(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let plans = state
        .investments
        .active_plans()
        .await
        .map_err(utils::error_response)?;
    Ok((StatusCode::OK, Json(plans)))
}

async fn get_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let plan = state
        .investments
        .plan(plan_id)
        .await
        .map_err(utils::error_response)?;
    Ok((StatusCode::OK, Json(plan)))
}

async fn create_investment(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<InvestRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)
        .map_err(|code| (code, "Invalid token".to_string()))?;

    let (investment, deposit) = state
        .investments
        .create_investment(user_id, req.plan_id, req.amount)
        .await
        .map_err(utils::error_response)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "investment": investment, "deposit": deposit })),
    ))
}

// Dashboard listing: per-investment maturity progress and accrued profit.
async fn list_investments(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)
        .map_err(|code| (code, "Invalid token".to_string()))?;

    let summary = state
        .investments
        .investments_summary(user_id, Utc::now())
        .await
        .map_err(utils::error_response)?;

    Ok((StatusCode::OK, Json(summary)))
}

pub fn invest_routes(state: AppState) -> Router {
    Router::new()
        .route("/plans", get(list_plans))
        .route("/plans/:plan_id", get(get_plan))
        .route("/investments", post(create_investment).get(list_investments))
        .with_state(state)
}

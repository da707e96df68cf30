use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::domain::ReviewAction;
use crate::store::{NewPlan, PlanUpdate};

use super::{utils, AppState};

#[derive(Debug, Deserialize, Default)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PayoutApproveRequest {
    /// External settlement reference (bank or processor id).
    pub transaction_reference: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct NotesRequest {
    pub notes: Option<String>,
}

async fn admin_guard(headers: &HeaderMap, state: &AppState) -> Result<Uuid, (StatusCode, String)> {
    utils::require_admin(headers, &state.auth)
        .await
        .map_err(|(code, msg)| (code, msg.to_string()))
}

// --- review queues ---

async fn pending_deposits(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    admin_guard(&headers, &state).await?;
    let queue = state
        .ledger
        .pending_deposits()
        .await
        .map_err(utils::error_response)?;
    Ok((StatusCode::OK, Json(queue)))
}

async fn pending_withdrawals(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    admin_guard(&headers, &state).await?;
    let queue = state
        .ledger
        .pending_withdrawals()
        .await
        .map_err(utils::error_response)?;
    Ok((StatusCode::OK, Json(queue)))
}

async fn pending_payouts(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    admin_guard(&headers, &state).await?;
    let queue = state
        .ledger
        .pending_payouts()
        .await
        .map_err(utils::error_response)?;
    Ok((StatusCode::OK, Json(queue)))
}

async fn pending_referrals(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    admin_guard(&headers, &state).await?;
    let queue = state
        .referrals
        .pending_referrals()
        .await
        .map_err(utils::error_response)?;
    Ok((StatusCode::OK, Json(queue)))
}

// --- transaction review ---

async fn approve_deposit(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let admin = admin_guard(&headers, &state).await?;
    tracing::info!(admin = %admin, transaction = %id, "deposit approval requested");
    let reviewed = state
        .ledger
        .review_deposit(id, ReviewAction::Approve)
        .await
        .map_err(utils::error_response)?;
    Ok((StatusCode::OK, Json(reviewed)))
}

async fn reject_deposit(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let admin = admin_guard(&headers, &state).await?;
    tracing::info!(admin = %admin, transaction = %id, "deposit rejection requested");
    let reviewed = state
        .ledger
        .review_deposit(id, ReviewAction::Reject { reason: req.reason })
        .await
        .map_err(utils::error_response)?;
    Ok((StatusCode::OK, Json(reviewed)))
}

async fn approve_withdrawal(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let admin = admin_guard(&headers, &state).await?;
    tracing::info!(admin = %admin, transaction = %id, "withdrawal approval requested");
    let reviewed = state
        .ledger
        .review_withdrawal(id, ReviewAction::Approve)
        .await
        .map_err(utils::error_response)?;
    Ok((StatusCode::OK, Json(reviewed)))
}

async fn reject_withdrawal(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let admin = admin_guard(&headers, &state).await?;
    tracing::info!(admin = %admin, transaction = %id, "withdrawal rejection requested");
    let reviewed = state
        .ledger
        .review_withdrawal(id, ReviewAction::Reject { reason: req.reason })
        .await
        .map_err(utils::error_response)?;
    Ok((StatusCode::OK, Json(reviewed)))
}

// --- payout review ---

async fn approve_payout(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PayoutApproveRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let admin = admin_guard(&headers, &state).await?;
    tracing::info!(admin = %admin, payout = %id, "payout approval requested");
    let reviewed = state
        .ledger
        .review_payout(id, ReviewAction::Approve, req.transaction_reference)
        .await
        .map_err(utils::error_response)?;
    Ok((StatusCode::OK, Json(reviewed)))
}

async fn reject_payout(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let admin = admin_guard(&headers, &state).await?;
    tracing::info!(admin = %admin, payout = %id, "payout rejection requested");
    let reviewed = state
        .ledger
        .review_payout(id, ReviewAction::Reject { reason: req.reason }, None)
        .await
        .map_err(utils::error_response)?;
    Ok((StatusCode::OK, Json(reviewed)))
}

// --- referral settlement ---

async fn approve_referral(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<NotesRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let admin = admin_guard(&headers, &state).await?;
    tracing::info!(admin = %admin, referral = %id, "referral approval requested");
    let (referral, bonus) = state
        .referrals
        .approve_referral(id, req.notes)
        .await
        .map_err(utils::error_response)?;
    Ok((
        StatusCode::OK,
        Json(json!({ "referral": referral, "bonus": bonus })),
    ))
}

async fn reject_referral(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<NotesRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let admin = admin_guard(&headers, &state).await?;
    tracing::info!(admin = %admin, referral = %id, "referral rejection requested");
    let referral = state
        .referrals
        .reject_referral(id, req.notes)
        .await
        .map_err(utils::error_response)?;
    Ok((StatusCode::OK, Json(referral)))
}

// --- plan management ---

async fn create_plan(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<NewPlan>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    admin_guard(&headers, &state).await?;
    let plan = state
        .investments
        .create_plan(req)
        .await
        .map_err(utils::error_response)?;
    Ok((StatusCode::CREATED, Json(plan)))
}

async fn update_plan(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PlanUpdate>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    admin_guard(&headers, &state).await?;
    let plan = state
        .investments
        .update_plan(id, req)
        .await
        .map_err(utils::error_response)?;
    Ok((StatusCode::OK, Json(plan)))
}

pub fn admin_routes(state: AppState) -> Router {
    Router::new()
        .route("/admin/deposits/pending", get(pending_deposits))
        .route("/admin/deposits/:id/approve", post(approve_deposit))
        .route("/admin/deposits/:id/reject", post(reject_deposit))
        .route("/admin/withdrawals/pending", get(pending_withdrawals))
        .route("/admin/withdrawals/:id/approve", post(approve_withdrawal))
        .route("/admin/withdrawals/:id/reject", post(reject_withdrawal))
        .route("/admin/payouts/pending", get(pending_payouts))
        .route("/admin/payouts/:id/approve", post(approve_payout))
        .route("/admin/payouts/:id/reject", post(reject_payout))
        .route("/admin/referrals/pending", get(pending_referrals))
        .route("/admin/referrals/:id/approve", post(approve_referral))
        .route("/admin/referrals/:id/reject", post(reject_referral))
        .route("/admin/plans", post(create_plan))
        .route("/admin/plans/:id", patch(update_plan))
        .with_state(state)
}

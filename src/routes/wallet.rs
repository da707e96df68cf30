use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{sse::Event, IntoResponse, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crate::domain::TxKind;

use super::{utils, AppState};

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct PayoutRequest {
    pub amount: Decimal,
    pub method: String,
    pub notes: Option<String>,
}

// Route for a user's wallet figures: the derived balance plus what is
// actually spendable once pending withdrawals and payouts are reserved.
async fn get_balance(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)
        .map_err(|code| (code, "Invalid token".to_string()))?;

    let balance = state
        .ledger
        .wallet_balance(user_id)
        .await
        .map_err(utils::error_response)?;
    let available = state
        .ledger
        .available_balance(user_id)
        .await
        .map_err(utils::error_response)?;

    Ok((
        StatusCode::OK,
        Json(json!({ "balance": balance, "available_balance": available })),
    ))
}

async fn create_deposit(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<AmountRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)
        .map_err(|code| (code, "Invalid token".to_string()))?;

    let deposit = state
        .ledger
        .request_deposit(user_id, req.amount)
        .await
        .map_err(utils::error_response)?;

    Ok((StatusCode::CREATED, Json(deposit)))
}

async fn create_withdrawal(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<AmountRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)
        .map_err(|code| (code, "Invalid token".to_string()))?;

    let withdrawal = state
        .ledger
        .request_withdrawal(user_id, req.amount)
        .await
        .map_err(utils::error_response)?;

    Ok((StatusCode::CREATED, Json(withdrawal)))
}

// return all transactions of one kind for the token's user, streamed as SSE
async fn list_transactions(
    headers: HeaderMap,
    state: AppState,
    kind: TxKind,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)
        .map_err(|code| (code, "Invalid token".to_string()))?;

    let rows = state
        .ledger
        .history(user_id, kind)
        .await
        .map_err(utils::error_response)?;

    let stream = futures::stream::iter(rows).map(|transaction| Event::default().json_data(transaction));

    let sse = Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(std::time::Duration::from_secs(2))
            .text("keep-alive-text"),
    );

    Ok(sse)
}

async fn list_deposits(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    list_transactions(headers, state, TxKind::Deposit).await
}

async fn list_withdrawals(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    list_transactions(headers, state, TxKind::Withdrawal).await
}

async fn create_payout(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<PayoutRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)
        .map_err(|code| (code, "Invalid token".to_string()))?;

    let payout = state
        .ledger
        .request_payout(user_id, req.amount, req.method, req.notes)
        .await
        .map_err(utils::error_response)?;

    Ok((StatusCode::CREATED, Json(payout)))
}

async fn list_payouts(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)
        .map_err(|code| (code, "Invalid token".to_string()))?;

    let payouts = state
        .ledger
        .payout_history(user_id)
        .await
        .map_err(utils::error_response)?;

    Ok((StatusCode::OK, Json(payouts)))
}

pub fn wallet_routes(state: AppState) -> Router {
    Router::new()
        .route("/wallet/balance", get(get_balance))
        .route("/wallet/deposits", post(create_deposit).get(list_deposits))
        .route(
            "/wallet/withdrawals",
            post(create_withdrawal).get(list_withdrawals),
        )
        .route("/wallet/payouts", post(create_payout).get(list_payouts))
        .with_state(state)
}

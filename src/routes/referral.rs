use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use super::{utils, AppState};

async fn list_referrals(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)
        .map_err(|code| (code, "Invalid token".to_string()))?;

    let referrals = state
        .referrals
        .referrals_of(user_id)
        .await
        .map_err(utils::error_response)?;

    Ok((StatusCode::OK, Json(referrals)))
}

// Invite counts by status plus the sum of confirmed bonuses.
async fn referral_stats(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = utils::validate_auth_token(&headers, &state.auth)
        .map_err(|code| (code, "Invalid token".to_string()))?;

    let stats = state
        .referrals
        .stats(user_id)
        .await
        .map_err(utils::error_response)?;

    Ok((StatusCode::OK, Json(stats)))
}

pub fn referral_routes(state: AppState) -> Router {
    Router::new()
        .route("/referrals", get(list_referrals))
        .route("/referrals/stats", get(referral_stats))
        .with_state(state)
}

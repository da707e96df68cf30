use axum::http::{HeaderMap, StatusCode};
use uuid::Uuid;

use crate::db::auth::Role;
use crate::error::CoreError;

use super::auth::AuthService;

#[inline]
pub fn validate_auth_token(headers: &HeaderMap, service: &AuthService) -> Result<Uuid, StatusCode> {
    let jwt_header_token = match headers.get("Authorization").map(|token| token.to_str()) {
        Some(Ok(token)) => token,
        _ => {
            return Err(StatusCode::UNAUTHORIZED);
        }
    };
    //validate our token
    match service.verify_token(jwt_header_token) {
        Ok(user) => Ok(user),
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Token validation plus an admin-role check against the users table.
pub async fn require_admin(
    headers: &HeaderMap,
    service: &AuthService,
) -> Result<Uuid, (StatusCode, &'static str)> {
    let user_id = validate_auth_token(headers, service).map_err(|code| (code, "Invalid token"))?;
    match service.repo.role_of(user_id).await {
        Ok(Some(Role::Admin)) => Ok(user_id),
        Ok(_) => {
            tracing::warn!(user = %user_id, "admin route refused for non-admin");
            Err((StatusCode::FORBIDDEN, "Admin access required"))
        }
        Err(err) => {
            tracing::error!("Failed to load user role: {err}");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Failed to authorize request"))
        }
    }
}

/// Map a core failure to its HTTP representation.
pub fn error_response(err: CoreError) -> (StatusCode, String) {
    let status = match &err {
        CoreError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::InvalidState { .. } => StatusCode::CONFLICT,
        CoreError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        CoreError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("request failed: {err}");
        return (status, "Internal error".to_string());
    }
    (status, err.to_string())
}

#[inline]
pub fn check_password(password: &str) -> Result<(), Box<dyn std::error::Error>> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".into());
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err("Password must contain at least one uppercase letter".into());
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err("Password must contain at least one lowercase letter".into());
    }
    if !password.chars().any(|c| c.is_digit(10)) {
        return Err("Password must contain at least one digit".into());
    }
    if !password.chars().any(|c| !c.is_alphanumeric()) {
        return Err("Password must contain at least one special character".into());
    }
    Ok(())
}

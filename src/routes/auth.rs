use std::time::Duration;

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_email::Email;
use uuid::Uuid;

use crate::db::auth::AuthRepository;

use super::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    sub: Uuid, // user_id
    exp: i64,  // expiration timestamp
    iat: i64,  // issued at timestamp
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    email: Email,
    password: String,
    full_name: Option<String>,
    /// Another user's share code; credits them with a pending referral.
    referral_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    email: Email,
    password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    access_token: String,
    refresh_token: String,
    pub user_uid: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    refresh_token: String,
}

// Authentication service
pub struct AuthService {
    pub repo: AuthRepository,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(repo: AuthRepository, jwt_secret: String) -> Self {
        Self { repo, jwt_secret }
    }

    pub async fn register(
        &self,
        email: &Email,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<AuthResponse, Box<dyn std::error::Error>> {
        // Check if user already exists
        if self.repo.find_user_by_email(email.as_str()).await?.is_some() {
            return Err("User already exists".into());
        }

        //check for password validity
        super::utils::check_password(password)?;

        // Hash password
        let salt = SaltString::generate(&mut rand::thread_rng());
        let argon2 = Argon2::default();
        let password_hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|_err| "unable to hash password")?
            .to_string();

        // Create user with a fresh share code
        let user = self
            .repo
            .create_user(
                email.as_str(),
                &password_hash,
                full_name,
                &generate_referral_code(),
            )
            .await?;
        tracing::info!("user created with email: {}", user.email);

        // Generate tokens
        let (access_token, refresh_token) = self.generate_tokens(user.id)?;

        // Store refresh token
        let expires_at = Utc::now() + Duration::from_secs(60 * 60); // 1 hr
        self.repo
            .store_refresh_token(user.id, &refresh_token, expires_at)
            .await?;
        tracing::info!("stored refresh token for user: {}", user.email);
        Ok(AuthResponse {
            access_token,
            refresh_token,
            user_uid: user.id,
        })
    }

    pub async fn login(
        &self,
        req: LoginRequest,
    ) -> Result<AuthResponse, Box<dyn std::error::Error>> {
        tracing::info!("Attempting to log in user with email: {}", req.email);

        // Find user
        let user = self
            .repo
            .find_user_by_email(req.email.as_str())
            .await?
            .ok_or("Invalid credentials")?;

        // Verify password
        let parsed_hash =
            PasswordHash::new(&user.password_hash).map_err(|_err| "unable to parse password hash")?;
        if Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .is_err()
        {
            tracing::warn!("Invalid credentials for user: {}", user.email);
            return Err("Invalid credentials".into());
        }

        // Generate tokens
        let (access_token, refresh_token) = self.generate_tokens(user.id)?;

        // Store refresh token
        let expires_at = Utc::now() + Duration::from_secs(60 * 60); // 1 hr
        self.repo
            .store_refresh_token(user.id, &refresh_token, expires_at)
            .await?;
        tracing::info!("Stored refresh token for user: {}", user.email);

        Ok(AuthResponse {
            access_token,
            refresh_token,
            user_uid: user.id,
        })
    }

    pub fn verify_token(&self, token: &str) -> Result<Uuid, Box<dyn std::error::Error>> {
        let mut validation = jsonwebtoken::Validation::default();

        validation.leeway = 10;
        validation.validate_exp = true;
        validation.algorithms = vec![jsonwebtoken::Algorithm::HS256];

        let token_data = jsonwebtoken::decode::<Claims>(
            token,
            &jsonwebtoken::DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|err| {
            tracing::error!("Error decoding token: {:?}", err);
            "Invalid token"
        })?;

        Ok(token_data.claims.sub)
    }

    pub async fn refresh_token(
        &self,
        refresh_token: String,
    ) -> Result<AuthResponse, Box<dyn std::error::Error>> {
        // Verify refresh token and get user
        let user = self
            .repo
            .verify_refresh_token(&refresh_token)
            .await?
            .ok_or("Invalid refresh token")?;

        // Generate new tokens
        let (access_token, new_refresh_token) = self.generate_tokens(user.id)?;

        // Store new refresh token
        let expires_at = Utc::now() + Duration::from_secs(60 * 60); // 1 hr
        self.repo
            .store_refresh_token(user.id, &new_refresh_token, expires_at)
            .await?;

        Ok(AuthResponse {
            access_token,
            refresh_token: new_refresh_token,
            user_uid: user.id,
        })
    }

    fn generate_tokens(
        &self,
        user_id: Uuid,
    ) -> Result<(String, String), Box<dyn std::error::Error>> {
        let now = Utc::now();

        // Access token (15 minutes)
        let access_claims = Claims {
            sub: user_id,
            exp: (now + Duration::from_secs(15 * 60)).timestamp(),
            iat: now.timestamp(),
        };

        let access_token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &access_claims,
            &jsonwebtoken::EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;

        // Refresh token
        let refresh_token = Uuid::new_v4().to_string();

        Ok((access_token, refresh_token))
    }
}

fn generate_referral_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect()
}

// Route for handling new user registration
pub async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // Resolve the referrer first so a bad code fails before the insert
    let referrer = match &req.referral_code {
        Some(code) => {
            let found = state
                .auth
                .repo
                .find_user_by_referral_code(code)
                .await
                .map_err(|err| {
                    tracing::error!("Failed to look up referral code: {err}");
                    (StatusCode::INTERNAL_SERVER_ERROR, "Registration failed".to_string())
                })?;
            match found {
                Some(user) => Some(user),
                None => {
                    return Err((StatusCode::BAD_REQUEST, "Invalid referral code".to_string()))
                }
            }
        }
        None => None,
    };

    let response = state
        .auth
        .register(&req.email, &req.password, req.full_name.as_deref())
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    if let Some(referrer) = referrer {
        // Registration has committed; a failed referral record is logged,
        // not surfaced.
        if let Err(err) = state
            .referrals
            .record_referral(referrer.id, response.user_uid)
            .await
        {
            tracing::warn!("Failed to record referral: {err}");
        }
    }

    Ok((StatusCode::CREATED, Json(response)))
}

// Route for handling user login
pub async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match state.auth.login(req).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => Err((StatusCode::UNAUTHORIZED, e.to_string())),
    }
}

// Route for handling token refresh
pub async fn refresh_token_handler(
    State(state): State<AppState>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match state.auth.refresh_token(req.refresh_token).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => Err((StatusCode::UNAUTHORIZED, e.to_string())),
    }
}

pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/refresh", post(refresh_token_handler))
        .with_state(state)
}

use axum::{
    extract::{FromRef, State},
    routing::{get, post, put},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest,
            MessageResponse, PublicUser, RegisterRequest, ResetPasswordRequest,
        },
        extractors::AuthUser,
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        reset::{generate_reset_token, RESET_TOKEN_TTL},
        validate::{is_valid_email, validate_password_strength},
    },
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/password/forgot", post(forgot_password))
        .route("/auth/password/reset", post(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/me/password", put(change_password))
}

fn sign_for(state: &AppState, user_id: uuid::Uuid, email: &str) -> ApiResult<(String, u64)> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign(user_id, email).map_err(|e| {
        error!(error = %e, "jwt sign failed");
        ApiError::Configuration("token signing unavailable".into())
    })?;
    Ok((token, keys.ttl.as_secs()))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> ApiResult<Json<AuthResponse>> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::validation("email", "Invalid email"));
    }

    if let Err(msg) = validate_password_strength(&payload.password) {
        warn!("password rejected by policy");
        return Err(ApiError::validation("password", msg));
    }

    if state.users.find_by_email(&payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let hash = hash_password(&payload.password)?;
    let user = state
        .users
        .create(&payload.email, &hash, payload.display_name.as_deref())
        .await?;

    let (token, expires_in_seconds) = sign_for(&state, user.id, &user.email)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(Json(AuthResponse {
        user: user.into(),
        token,
        expires_in_seconds,
    }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::validation("email", "Invalid email"));
    }

    // Unknown email and wrong password are indistinguishable to the caller.
    let user = match state.users.find_by_email(&payload.email).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "login unknown email");
            return Err(ApiError::Authentication("Invalid email or password".into()));
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err(ApiError::Authentication("Invalid email or password".into()));
    }

    let (token, expires_in_seconds) = sign_for(&state, user.id, &user.email)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        user: user.into(),
        token,
        expires_in_seconds,
    }))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(mut payload): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    payload.email = payload.email.trim().to_lowercase();

    // Uniform response whether or not the email is registered.
    let generic = MessageResponse {
        message: "If that email is registered, a reset link has been sent".into(),
    };

    let user = match state.users.find_by_email(&payload.email).await? {
        Some(u) => u,
        None => {
            info!("password reset requested for unregistered email");
            return Ok(Json(generic));
        }
    };

    let token = generate_reset_token();
    let expires_at = OffsetDateTime::now_utc() + RESET_TOKEN_TTL;
    state.reset_tokens.create(user.id, &token, expires_at).await?;

    // The ledger entry survives delivery failure; the caller learns the
    // sender is down, not whether the email exists.
    if let Err(e) = state.notifier.send_reset_token(&user.email, &token).await {
        warn!(error = %e, user_id = %user.id, "reset notification delivery failed");
        return Err(ApiError::Dependency(
            "could not deliver reset notification".into(),
        ));
    }

    info!(user_id = %user.id, "reset token issued");
    Ok(Json(generic))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if let Err(msg) = validate_password_strength(&payload.new_password) {
        warn!("reset password rejected by policy");
        return Err(ApiError::validation("new_password", msg));
    }

    let hash = hash_password(&payload.new_password)?;
    let now = OffsetDateTime::now_utc();

    // Absent, already used and expired all collapse into one outcome.
    match state.reset_tokens.consume(&payload.token, now, &hash).await? {
        Some(user_id) => {
            info!(user_id = %user_id, "password reset completed");
            Ok(Json(MessageResponse {
                message: "Password has been reset".into(),
            }))
        }
        None => {
            warn!("reset attempted with invalid or expired token");
            Err(ApiError::Authentication(
                "Invalid or expired reset token".into(),
            ))
        }
    }
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<PublicUser>> {
    let record = state
        .users
        .find_by_id(user.id)
        .await?
        .ok_or_else(|| ApiError::Authentication("User not found".into()))?;
    Ok(Json(record.into()))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if let Err(msg) = validate_password_strength(&payload.new_password) {
        warn!(user_id = %user.id, "new password rejected by policy");
        return Err(ApiError::validation("new_password", msg));
    }

    let record = state
        .users
        .find_by_id(user.id)
        .await?
        .ok_or_else(|| ApiError::Authentication("User not found".into()))?;

    // The current secret must check out before the credential rolls over.
    if !verify_password(&payload.current_password, &record.password_hash)? {
        warn!(user_id = %user.id, "password change with wrong current password");
        return Err(ApiError::Authentication("Invalid credentials".into()));
    }

    let hash = hash_password(&payload.new_password)?;
    state.users.update_password_hash(user.id, &hash).await?;

    info!(user_id = %user.id, "password changed");
    Ok(Json(MessageResponse {
        message: "Password updated".into(),
    }))
}

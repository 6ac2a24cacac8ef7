use axum::{
    extract::{Extension, Query, State},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crowdnest_platform::user::Registration;

use crate::{
    middleware::{authenticate, AuthUser},
    response::{AppError, AppSuccess},
    GlobalState,
};

pub fn auth_routes(state: GlobalState) -> Router<GlobalState> {
    Router::new()
        .route("/api/register",
            post(register)
        )
        .route("/api/login",
            post(login)
        )
        .route("/api/admin/login",
            post(admin_login)
        )
        .route("/api/request-password-reset",
            post(request_password_reset)
        )
        .route("/api/reset-password",
            post(reset_password)
        )
        .route("/api/verify-email",
            get(verify_email)
        )

        .route("/api/logout",
            post(logout)
            .route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
        )
        .route("/api/refresh-token",
            post(refresh_token)
            .route_layer(middleware::from_fn_with_state(state, authenticate))
        )
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

async fn register(
    State(state): State<GlobalState>,
    Json(payload): Json<Registration>,
) -> Result<AppSuccess, AppError> {
    let user = state.users.register(payload).await?;
    Ok(AppSuccess::new("registered, please verify your email", json!(user)))
}

async fn login(
    State(state): State<GlobalState>,
    Json(payload): Json<LoginRequest>,
) -> Result<AppSuccess, AppError> {
    let outcome = state.users.login(&payload.email, &payload.password).await?;
    Ok(AppSuccess::new("logged in", json!(outcome)))
}

async fn admin_login(
    State(state): State<GlobalState>,
    Json(payload): Json<LoginRequest>,
) -> Result<AppSuccess, AppError> {
    let outcome = state.users.admin_login(&payload.email, &payload.password).await?;
    Ok(AppSuccess::new("logged in", json!(outcome)))
}

async fn request_password_reset(
    State(state): State<GlobalState>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<AppSuccess, AppError> {
    state.users.request_password_reset(&payload.email).await?;
    Ok(AppSuccess::new("password reset email sent", json!({})))
}

async fn reset_password(
    State(state): State<GlobalState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<AppSuccess, AppError> {
    state.users.reset_password(&payload.token, &payload.new_password).await?;
    Ok(AppSuccess::new("password updated", json!({})))
}

async fn verify_email(
    State(state): State<GlobalState>,
    Query(query): Query<TokenQuery>,
) -> Result<AppSuccess, AppError> {
    let user = state.users.verify_email(&query.token).await?;
    Ok(AppSuccess::new("email verified", json!(user)))
}

async fn logout(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<AppSuccess, AppError> {
    state.users.logout(&auth.token).await?;
    tracing::info!("[/api/logout] user {} logged out", auth.id);
    Ok(AppSuccess::new("logged out", json!({})))
}

async fn refresh_token(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<AppSuccess, AppError> {
    let token = state.users.refresh_token(auth.id)?;
    Ok(AppSuccess::new("token refreshed", json!({ "token": token })))
}

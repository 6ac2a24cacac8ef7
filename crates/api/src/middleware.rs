use std::time::Duration;

use anyhow::anyhow;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crowdnest_platform::user::{User, UserRole};
use crowdnest_platform::ErrorCode;

use crate::metrics::API_ERRORS;
use crate::response::AppError;
use crate::utils::extract_bearer_token;
use crate::GlobalState;

pub const AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// The caller of an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub role: UserRole,
    pub token: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

async fn resolve_user(state: &GlobalState, token: &str) -> Result<User, AppError> {
    if state.users.is_token_revoked(token).await? {
        return Err(AppError::new(ErrorCode::InvalidToken, anyhow!("token has been revoked")));
    }
    let user_id = state.tokens.validate(token)?;
    state.users.get_active_user(user_id).await?
        .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, anyhow!("user not found or deleted")))
}

pub async fn authenticate(
    State(state): State<GlobalState>, mut req: Request, next: Next
) -> Result<Response, AppError> {
    let token = extract_bearer_token(req.headers())?;

    let user = tokio::time::timeout(AUTH_TIMEOUT, resolve_user(&state, &token))
        .await
        .map_err(|_| AppError::new(ErrorCode::Timeout, anyhow!("authentication timed out")))??;

    req.extensions_mut().insert(AuthUser { id: user.id, role: user.role, token });
    Ok(next.run(req).await)
}

/// Runs after `authenticate`.
pub async fn admin_only(req: Request, next: Next) -> Result<Response, AppError> {
    match req.extensions().get::<AuthUser>() {
        Some(user) if user.is_admin() => Ok(next.run(req).await),
        Some(_) => Err(AppError::new(ErrorCode::Forbidden, anyhow!("admin access required"))),
        None => Err(AppError::new(ErrorCode::Unauthorized, anyhow!("authentication required"))),
    }
}

/// Best-effort identity for public routes that personalise their output.
pub(crate) async fn viewer_id(state: &GlobalState, headers: &HeaderMap) -> Option<i64> {
    let token = extract_bearer_token(headers).ok()?;
    tokio::time::timeout(AUTH_TIMEOUT, resolve_user(state, &token))
        .await
        .ok()?
        .ok()
        .map(|user| user.id)
}

/// Counts error responses by the code `AppError` left in the extensions.
pub async fn error_monitor(
    State(state): State<GlobalState>, req: Request, next: Next
) -> Response {
    let response = next.run(req).await;
    if let Some(code) = response.extensions().get::<ErrorCode>().copied() {
        state.error_stats.record(code).await;
        API_ERRORS.with_label_values(&[&code.code().to_string()]).inc();
    }
    response
}

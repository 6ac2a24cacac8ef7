use anyhow::anyhow;
use axum::{
    extract::{DefaultBodyLimit, Extension, Multipart, State},
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;

use crowdnest_common::get_current_timestamp;
use crowdnest_platform::storage::image_extension;
use crowdnest_platform::user::ProfileUpdate;
use crowdnest_platform::ErrorCode;

use crate::{
    middleware::{authenticate, AuthUser},
    response::{AppError, AppSuccess},
    GlobalState,
};

pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

pub fn profile_routes(state: GlobalState) -> Router<GlobalState> {
    Router::new()
        .route("/api/profile",
            get(get_profile)
            .put(update_profile)
        )
        .route("/api/profile/avatar",
            post(upload_avatar)
            .layer(DefaultBodyLimit::max(MAX_AVATAR_BYTES + 64 * 1024))
        )
        .route("/api/account",
            delete(delete_account)
        )
        .route_layer(middleware::from_fn_with_state(state, authenticate))
}

async fn get_profile(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<AppSuccess, AppError> {
    let user = state.users.get_active_user(auth.id).await?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, anyhow!("user not found")))?;
    Ok(AppSuccess::new("profile", json!(user)))
}

async fn update_profile(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<ProfileUpdate>,
) -> Result<AppSuccess, AppError> {
    let user = state.users.update_profile(auth.id, payload).await?;
    Ok(AppSuccess::new("profile updated", json!(user)))
}

/// Multipart form with an `avatar` file field.
async fn upload_avatar(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<AppSuccess, AppError> {
    let bad_form = |e: axum::extract::multipart::MultipartError| AppError::new(ErrorCode::BadRequest, anyhow!(e));

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        if field.name() != Some("avatar") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let ext = image_extension(&file_name)
            .ok_or_else(|| AppError::new(ErrorCode::Validation, anyhow!("avatar must be a jpg, png, gif or webp image")))?;
        let bytes = field.bytes().await.map_err(bad_form)?;
        if bytes.is_empty() {
            return Err(AppError::new(ErrorCode::Validation, anyhow!("avatar file is empty")));
        }
        if bytes.len() > MAX_AVATAR_BYTES {
            return Err(AppError::new(ErrorCode::Validation, anyhow!("avatar must be at most 5MB")));
        }

        let path = format!("avatars/{}_{}.{}", auth.id, get_current_timestamp(), ext);
        let reference = state.storage.upload_file(bytes.to_vec(), &path).await
            .map_err(|e| AppError::new(ErrorCode::Internal, e.context("avatar upload failed")))?;
        let user = state.users.set_avatar(auth.id, state.storage.public_url(&reference)).await?;

        return Ok(AppSuccess::new("avatar updated", json!(user)));
    }

    Err(AppError::new(ErrorCode::Validation, anyhow!("missing `avatar` file field")))
}

async fn delete_account(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<AppSuccess, AppError> {
    state.users.delete_account(auth.id).await?;
    state.users.logout(&auth.token).await?;
    Ok(AppSuccess::new("account deleted", json!({})))
}

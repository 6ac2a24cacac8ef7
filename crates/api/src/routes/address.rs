use axum::{
    extract::{Extension, Path, State},
    middleware,
    routing::{get, put},
    Json, Router,
};
use serde_json::json;

use crowdnest_platform::user::AddressDraft;

use crate::{
    middleware::{authenticate, AuthUser},
    response::{AppError, AppSuccess},
    GlobalState,
};

pub fn address_routes(state: GlobalState) -> Router<GlobalState> {
    Router::new()
        .route("/api/addresses",
            get(list_addresses)
            .post(create_address)
        )
        .route("/api/addresses/{id}",
            put(update_address)
            .delete(delete_address)
        )
        .route("/api/addresses/{id}/default",
            put(set_default_address)
        )
        .route_layer(middleware::from_fn_with_state(state, authenticate))
}

async fn list_addresses(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<AppSuccess, AppError> {
    let addresses = state.addresses.list(auth.id).await?;
    Ok(AppSuccess::new("addresses", json!(addresses)))
}

async fn create_address(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<AddressDraft>,
) -> Result<AppSuccess, AppError> {
    let address = state.addresses.create(auth.id, payload).await?;
    Ok(AppSuccess::new("address created", json!(address)))
}

async fn update_address(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(payload): Json<AddressDraft>,
) -> Result<AppSuccess, AppError> {
    let address = state.addresses.update(auth.id, id, payload).await?;
    Ok(AppSuccess::new("address updated", json!(address)))
}

async fn delete_address(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<AppSuccess, AppError> {
    state.addresses.delete(auth.id, id).await?;
    Ok(AppSuccess::new("address deleted", json!({})))
}

async fn set_default_address(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<AppSuccess, AppError> {
    let address = state.addresses.set_default(auth.id, id).await?;
    Ok(AppSuccess::new("default address updated", json!(address)))
}

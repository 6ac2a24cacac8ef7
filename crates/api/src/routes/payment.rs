use anyhow::anyhow;
use axum::{
    extract::{Extension, Path, State},
    middleware,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crowdnest_platform::ErrorCode;

use crate::{
    middleware::{authenticate, AuthUser},
    response::{AppError, AppSuccess},
    GlobalState,
};

pub fn payment_routes(state: GlobalState) -> Router<GlobalState> {
    Router::new()
        .route("/api/payments/projects/{project_id}",
            post(create_payment)
        )
        .route("/api/orders",
            get(list_orders)
        )
        .route("/api/orders/{id}",
            get(get_order)
        )
        .route("/api/orders/{id}/refund/failed",
            post(request_refund_for_failed_project)
        )
        .route("/api/orders/{id}/refund",
            get(get_refund_status)
        )
        .route_layer(middleware::from_fn_with_state(state, authenticate))
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub address_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefundRequestBody {
    pub reason: Option<String>,
}

async fn create_payment(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(project_id): Path<i64>,
    Json(payload): Json<PaymentRequest>,
) -> Result<AppSuccess, AppError> {
    let order = state.ledger.process_payment(auth.id, project_id, payload.amount, payload.address_id).await?;
    Ok(AppSuccess::new("payment completed", json!(order)))
}

async fn list_orders(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<AppSuccess, AppError> {
    let orders = state.ledger.get_orders_by_user(auth.id).await?;
    Ok(AppSuccess::new("orders", json!(orders)))
}

async fn get_order(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<AppSuccess, AppError> {
    let order = state.ledger.get_order_by_id(auth.id, id).await?
        .ok_or_else(|| AppError::new(ErrorCode::ResourceNotFound, anyhow!("order not found")))?;
    Ok(AppSuccess::new("order", json!(order)))
}

/// The body is optional; without a reason a default one is recorded.
async fn request_refund_for_failed_project(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    payload: Option<Json<RefundRequestBody>>,
) -> Result<AppSuccess, AppError> {
    let reason = payload.and_then(|Json(body)| body.reason);
    let request = state.ledger.request_refund_for_failed_project(id, auth.id, reason).await?;
    Ok(AppSuccess::new("refund requested", json!(request)))
}

async fn get_refund_status(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<AppSuccess, AppError> {
    let request = state.ledger.get_refund_status(auth.id, id).await?
        .ok_or_else(|| AppError::new(ErrorCode::ResourceNotFound, anyhow!("no refund request for this order")))?;
    Ok(AppSuccess::new("refund status", json!(request)))
}

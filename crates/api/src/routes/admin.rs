use anyhow::anyhow;
use axum::{
    extract::{Path, Query, State},
    middleware,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crowdnest_platform::ledger::ShipmentDraft;
use crowdnest_platform::project::ProjectStatus;
use crowdnest_platform::ErrorCode;

use crate::{
    middleware::{admin_only, authenticate},
    response::{AppError, AppSuccess},
    routes::PageQuery,
    GlobalState,
};

/// Everything under `/api/admin` except the login route.
pub fn admin_routes(state: GlobalState) -> Router<GlobalState> {
    Router::new()
        .route("/api/admin/projects",
            get(get_projects)
        )
        .route("/api/admin/projects/{id}",
            delete(delete_project)
        )
        .route("/api/admin/projects/{id}/review",
            post(review_project)
        )
        .route("/api/admin/projects/{id}/status",
            patch(update_project_status)
        )
        .route("/api/admin/projects/{id}/pledgers",
            get(get_project_pledgers)
        )
        .route("/api/admin/projects/categories",
            post(create_category)
        )
        .route("/api/admin/projects/tags",
            post(create_tag)
        )

        .route("/api/admin/users",
            get(get_users)
        )
        .route("/api/admin/users/{id}/role",
            put(update_user_role)
        )

        .route("/api/admin/orders/refunds",
            get(get_refund_requests)
        )
        .route("/api/admin/orders/refunds/{id}/process",
            post(process_refund)
        )
        .route("/api/admin/orders/{id}/shipment",
            get(get_order_shipment)
        )

        .route("/api/admin/shipments",
            post(create_shipment)
        )
        .route("/api/admin/shipments/{id}",
            put(update_shipment_status)
        )

        .route("/api/admin/stats",
            get(get_system_stats)
        )
        .route("/api/admin/error-stats",
            get(get_error_stats)
        )
        .route_layer(middleware::from_fn(admin_only))
        .route_layer(middleware::from_fn_with_state(state, authenticate))
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminProjectQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub status: Option<String>,
    pub keyword: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub approved: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct ProcessRefundRequest {
    pub approved: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateShipmentRequest {
    pub order_id: i64,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub estimated_delivery_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ShipmentStatusRequest {
    pub status: String,
    pub tracking_number: Option<String>,
}

/// An empty `status` means no filter.
fn parse_status_filter(status: Option<&str>) -> Result<Option<ProjectStatus>, AppError> {
    match status.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(status) => status.parse::<ProjectStatus>()
            .map(Some)
            .map_err(|_| AppError::new(ErrorCode::Validation, anyhow!("unknown project status `{}`", status))),
    }
}

async fn get_projects(
    State(state): State<GlobalState>,
    Query(query): Query<AdminProjectQuery>,
) -> Result<AppSuccess, AppError> {
    let status = parse_status_filter(query.status.as_deref())?;
    let page = PageQuery { page: query.page, page_size: query.page_size };
    let (projects, total) = state.admin
        .get_projects(page.page(), page.page_size(), status, query.keyword.as_deref())
        .await?;
    Ok(AppSuccess::page("projects", projects, total, page.page(), page.page_size()))
}

async fn review_project(
    State(state): State<GlobalState>,
    Path(id): Path<i64>,
    Json(payload): Json<ReviewRequest>,
) -> Result<AppSuccess, AppError> {
    let project = state.admin.review_project(id, payload.approved, payload.comment.as_deref()).await?;
    Ok(AppSuccess::new("project reviewed", json!(project)))
}

async fn update_project_status(
    State(state): State<GlobalState>,
    Path(id): Path<i64>,
    Json(payload): Json<StatusRequest>,
) -> Result<AppSuccess, AppError> {
    let project = state.admin.update_project_status(id, &payload.status).await?;
    Ok(AppSuccess::new("project status updated", json!(project)))
}

async fn delete_project(
    State(state): State<GlobalState>,
    Path(id): Path<i64>,
) -> Result<AppSuccess, AppError> {
    state.admin.delete_project(id).await?;
    Ok(AppSuccess::new("project deleted", json!({})))
}

async fn get_project_pledgers(
    State(state): State<GlobalState>,
    Path(id): Path<i64>,
) -> Result<AppSuccess, AppError> {
    let pledgers = state.ledger.get_project_pledgers(id).await?;
    Ok(AppSuccess::new("pledgers", json!(pledgers)))
}

async fn create_category(
    State(state): State<GlobalState>,
    Json(payload): Json<NameRequest>,
) -> Result<AppSuccess, AppError> {
    let category = state.catalog.create_category(&payload.name).await?;
    Ok(AppSuccess::new("category created", json!(category)))
}

async fn create_tag(
    State(state): State<GlobalState>,
    Json(payload): Json<NameRequest>,
) -> Result<AppSuccess, AppError> {
    let tag = state.catalog.create_tag(&payload.name).await?;
    Ok(AppSuccess::new("tag created", json!(tag)))
}

async fn get_users(
    State(state): State<GlobalState>,
    Query(page): Query<PageQuery>,
) -> Result<AppSuccess, AppError> {
    let (users, total) = state.users.list_users(page.page(), page.page_size()).await?;
    Ok(AppSuccess::page("users", users, total, page.page(), page.page_size()))
}

async fn update_user_role(
    State(state): State<GlobalState>,
    Path(id): Path<i64>,
    Json(payload): Json<RoleRequest>,
) -> Result<AppSuccess, AppError> {
    let user = state.users.update_user_role(id, &payload.role).await?;
    Ok(AppSuccess::new("role updated", json!(user)))
}

async fn get_refund_requests(
    State(state): State<GlobalState>,
    Query(page): Query<PageQuery>,
) -> Result<AppSuccess, AppError> {
    let (requests, total) = state.ledger.list_refund_requests(page.page(), page.page_size()).await?;
    Ok(AppSuccess::page("refund requests", requests, total, page.page(), page.page_size()))
}

async fn process_refund(
    State(state): State<GlobalState>,
    Path(id): Path<i64>,
    Json(payload): Json<ProcessRefundRequest>,
) -> Result<AppSuccess, AppError> {
    let request = state.ledger.process_refund(id, payload.approved, payload.comment).await?;
    Ok(AppSuccess::new("refund processed", json!(request)))
}

async fn get_order_shipment(
    State(state): State<GlobalState>,
    Path(id): Path<i64>,
) -> Result<AppSuccess, AppError> {
    let shipment = state.ledger.get_shipment_by_order(id).await?
        .ok_or_else(|| AppError::new(ErrorCode::ResourceNotFound, anyhow!("order has not been shipped")))?;
    Ok(AppSuccess::new("shipment", json!(shipment)))
}

async fn create_shipment(
    State(state): State<GlobalState>,
    Json(payload): Json<CreateShipmentRequest>,
) -> Result<AppSuccess, AppError> {
    let draft = ShipmentDraft {
        tracking_number: payload.tracking_number,
        carrier: payload.carrier,
        estimated_delivery_at: payload.estimated_delivery_at,
    };
    let shipment = state.ledger.create_shipment(payload.order_id, draft).await?;
    Ok(AppSuccess::new("shipment created", json!(shipment)))
}

async fn update_shipment_status(
    State(state): State<GlobalState>,
    Path(id): Path<i64>,
    Json(payload): Json<ShipmentStatusRequest>,
) -> Result<AppSuccess, AppError> {
    let shipment = state.ledger.update_shipment_status(id, &payload.status, payload.tracking_number).await?;
    Ok(AppSuccess::new("shipment updated", json!(shipment)))
}

async fn get_system_stats(
    State(state): State<GlobalState>,
) -> Result<AppSuccess, AppError> {
    let stats = state.admin.get_system_stats().await?;
    Ok(AppSuccess::new("system stats", json!(stats)))
}

async fn get_error_stats(
    State(state): State<GlobalState>,
) -> Result<AppSuccess, AppError> {
    let stats = state.error_stats.snapshot().await;
    Ok(AppSuccess::new("error stats", json!(stats)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filter() {
        assert_eq!(parse_status_filter(None).unwrap(), None);
        assert_eq!(parse_status_filter(Some(" ")).unwrap(), None);
        assert_eq!(parse_status_filter(Some("pending_review")).unwrap(), Some(ProjectStatus::PendingReview));
        assert_eq!(parse_status_filter(Some("archived")).unwrap_err().0, ErrorCode::Validation);
    }
}

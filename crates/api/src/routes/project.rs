use anyhow::anyhow;
use axum::{
    extract::{Extension, Path, Query, State},
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crowdnest_platform::project::{NewProject, ProjectEdit, ProjectSearch};
use crowdnest_platform::ErrorCode;

use crate::{
    middleware::{authenticate, AuthUser},
    response::{AppError, AppSuccess},
    routes::PageQuery,
    GlobalState,
};

pub fn project_routes(state: GlobalState) -> Router<GlobalState> {
    let auth = || middleware::from_fn_with_state(state.clone(), authenticate);

    Router::new()
        .route("/api/projects",
            get(list_projects)
            .merge(post(create_project).route_layer(auth()))
        )
        .route("/api/projects/search",
            post(search_projects)
        )
        .route("/api/projects/{id}",
            get(get_project)
            .merge(put(update_project).route_layer(auth()))
        )
        .route("/api/projects/{id}/pledge",
            post(pledge_to_project)
            .route_layer(auth())
        )
        .route("/api/projects/{id}/tags",
            post(add_tag_to_project)
            .route_layer(auth())
        )
        .route("/api/projects/{id}/updates",
            get(get_project_updates)
            .merge(post(create_project_update).route_layer(auth()))
        )
        .route("/api/projects/{id}/comments",
            get(get_project_comments)
            .merge(post(create_project_comment).route_layer(auth()))
        )

        .route("/api/project-categories",
            get(get_categories)
        )
        .route("/api/project-tags",
            get(get_tags)
        )
}

#[derive(Debug, Deserialize)]
pub struct PledgeRequest {
    pub amount: Decimal,
    pub address_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AddTagRequest {
    pub tag_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ProjectUpdateRequest {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

async fn create_project(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<NewProject>,
) -> Result<AppSuccess, AppError> {
    let project = state.catalog.create_project(auth.id, payload).await?;
    Ok(AppSuccess::new("project created, waiting for review", json!(project)))
}

async fn get_project(
    State(state): State<GlobalState>,
    Path(id): Path<i64>,
) -> Result<AppSuccess, AppError> {
    let project = state.catalog.get_project_detail(id).await?
        .ok_or_else(|| AppError::new(ErrorCode::ProjectNotFound, anyhow!("project not found")))?;
    Ok(AppSuccess::new("project", json!(project)))
}

async fn update_project(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(payload): Json<ProjectEdit>,
) -> Result<AppSuccess, AppError> {
    let project = state.catalog.update_project(auth.id, id, payload).await?;
    Ok(AppSuccess::new("project updated", json!(project)))
}

async fn list_projects(
    State(state): State<GlobalState>,
    Query(page): Query<PageQuery>,
) -> Result<AppSuccess, AppError> {
    let (projects, total) = state.catalog.list_projects(page.page(), page.page_size()).await?;
    Ok(AppSuccess::page("projects", projects, total, page.page(), page.page_size()))
}

async fn search_projects(
    State(state): State<GlobalState>,
    Query(page): Query<PageQuery>,
    Json(filters): Json<ProjectSearch>,
) -> Result<AppSuccess, AppError> {
    let (projects, total) = state.catalog
        .search_projects(&filters, page.page(), page.page_size())
        .await?;
    Ok(AppSuccess::page("projects", projects, total, page.page(), page.page_size()))
}

async fn pledge_to_project(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(payload): Json<PledgeRequest>,
) -> Result<AppSuccess, AppError> {
    let order = state.ledger.process_payment(auth.id, id, payload.amount, payload.address_id).await?;
    Ok(AppSuccess::new("pledge received", json!(order)))
}

async fn get_categories(
    State(state): State<GlobalState>,
) -> Result<AppSuccess, AppError> {
    let categories = state.catalog.get_categories().await?;
    Ok(AppSuccess::new("categories", json!(categories)))
}

async fn get_tags(
    State(state): State<GlobalState>,
) -> Result<AppSuccess, AppError> {
    let tags = state.catalog.get_tags().await?;
    Ok(AppSuccess::new("tags", json!(tags)))
}

async fn add_tag_to_project(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(payload): Json<AddTagRequest>,
) -> Result<AppSuccess, AppError> {
    let actor = state.users.get_active_user(auth.id).await?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, anyhow!("user not found")))?;
    let relation = state.catalog.add_tag_to_project(&actor, id, payload.tag_id).await?;
    Ok(AppSuccess::new("tag added", json!(relation)))
}

async fn create_project_update(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(payload): Json<ProjectUpdateRequest>,
) -> Result<AppSuccess, AppError> {
    let update = state.catalog.create_update(auth.id, id, &payload.title, &payload.content).await?;
    Ok(AppSuccess::new("update posted", json!(update)))
}

async fn get_project_updates(
    State(state): State<GlobalState>,
    Path(id): Path<i64>,
) -> Result<AppSuccess, AppError> {
    let updates = state.catalog.get_updates(id).await?;
    Ok(AppSuccess::new("updates", json!(updates)))
}

async fn create_project_comment(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(payload): Json<CommentRequest>,
) -> Result<AppSuccess, AppError> {
    let comment = state.catalog.create_comment(auth.id, id, &payload.content).await?;
    Ok(AppSuccess::new("comment posted", json!(comment)))
}

async fn get_project_comments(
    State(state): State<GlobalState>,
    Path(id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> Result<AppSuccess, AppError> {
    let (comments, total) = state.catalog.get_comments(id, page.page(), page.page_size()).await?;
    Ok(AppSuccess::page("comments", comments, total, page.page(), page.page_size()))
}

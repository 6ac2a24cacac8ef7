use anyhow::anyhow;
use axum::{
    extract::{Extension, Path, Query, State},
    http::HeaderMap,
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crowdnest_platform::ErrorCode;

use crate::{
    middleware::{authenticate, viewer_id, AuthUser},
    response::{AppError, AppSuccess},
    routes::PageQuery,
    GlobalState,
};

pub fn community_routes(state: GlobalState) -> Router<GlobalState> {
    let auth = || middleware::from_fn_with_state(state.clone(), authenticate);

    Router::new()
        .route("/api/posts",
            get(list_all_posts)
            .merge(post(create_post).route_layer(auth()))
        )
        .route("/api/posts/{id}",
            get(get_post)
            .merge(
                put(update_post)
                    .delete(delete_post)
                    .route_layer(auth())
            )
        )
        .route("/api/posts/{id}/comments",
            get(list_comments)
            .merge(post(create_comment).route_layer(auth()))
        )
        .route("/api/posts/{id}/likes",
            post(like_post)
            .delete(unlike_post)
            .route_layer(auth())
        )

        .route("/api/comments/{id}",
            delete(delete_comment)
            .route_layer(auth())
        )
        .route("/api/comments/{id}/reply",
            post(create_comment_reply)
            .route_layer(auth())
        )
        .route("/api/comments/{id}/replies",
            get(get_comment_replies)
        )

        .route("/api/users/{id}/follow",
            post(follow_user)
            .delete(unfollow_user)
            .route_layer(auth())
        )
        .route("/api/users/{id}/follow/status",
            get(get_follow_status)
            .route_layer(auth())
        )
        .route("/api/users/{id}/followers",
            get(get_followers)
        )
        .route("/api/users/{id}/following",
            get(get_following)
        )
        .route("/api/users/{id}/posts",
            get(get_user_posts)
        )
        .route("/api/users/following",
            get(get_current_user_following)
            .route_layer(auth())
        )
        .route("/api/users/following/posts",
            get(get_following_posts)
            .route_layer(auth())
        )
        .route("/api/users/followers/posts",
            get(get_followers_posts)
            .route_layer(auth())
        )
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub content: String,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub content: String,
    pub image_url: Option<String>,
}

async fn create_post(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<AppSuccess, AppError> {
    let post = state.community.create_post(auth.id, &payload.content, payload.images).await?;
    Ok(AppSuccess::new("post created", json!(post)))
}

async fn get_post(
    State(state): State<GlobalState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<AppSuccess, AppError> {
    let viewer = viewer_id(&state, &headers).await;
    let post = state.community.get_post(id, viewer).await?
        .ok_or_else(|| AppError::new(ErrorCode::ResourceNotFound, anyhow!("post not found")))?;
    Ok(AppSuccess::new("post", json!(post)))
}

async fn update_post(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<AppSuccess, AppError> {
    let post = state.community.update_post(auth.id, id, &payload.content, payload.images).await?;
    Ok(AppSuccess::new("post updated", json!(post)))
}

async fn delete_post(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<AppSuccess, AppError> {
    state.community.delete_post(auth.id, id).await?;
    Ok(AppSuccess::new("post deleted", json!({})))
}

async fn list_all_posts(
    State(state): State<GlobalState>,
    headers: HeaderMap,
    Query(page): Query<PageQuery>,
) -> Result<AppSuccess, AppError> {
    let viewer = viewer_id(&state, &headers).await;
    let (posts, total) = state.community.list_all_posts(viewer, page.page(), page.page_size()).await?;
    Ok(AppSuccess::page("posts", posts, total, page.page(), page.page_size()))
}

async fn get_user_posts(
    State(state): State<GlobalState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> Result<AppSuccess, AppError> {
    let viewer = viewer_id(&state, &headers).await;
    let (posts, total) = state.community.get_user_posts(id, viewer, page.page(), page.page_size()).await?;
    Ok(AppSuccess::page("posts", posts, total, page.page(), page.page_size()))
}

async fn get_following_posts(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> Result<AppSuccess, AppError> {
    let (posts, total) = state.community.get_following_posts(auth.id, page.page(), page.page_size()).await?;
    Ok(AppSuccess::page("posts", posts, total, page.page(), page.page_size()))
}

async fn get_followers_posts(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> Result<AppSuccess, AppError> {
    let (posts, total) = state.community.get_followers_posts(auth.id, page.page(), page.page_size()).await?;
    Ok(AppSuccess::page("posts", posts, total, page.page(), page.page_size()))
}

async fn create_comment(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(payload): Json<CommentRequest>,
) -> Result<AppSuccess, AppError> {
    let comment = state.community.create_comment(auth.id, id, &payload.content, payload.image_url).await?;
    Ok(AppSuccess::new("comment created", json!(comment)))
}

async fn list_comments(
    State(state): State<GlobalState>,
    Path(id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> Result<AppSuccess, AppError> {
    let (comments, total) = state.community.list_comments(id, page.page(), page.page_size()).await?;
    Ok(AppSuccess::page("comments", comments, total, page.page(), page.page_size()))
}

async fn create_comment_reply(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(payload): Json<CommentRequest>,
) -> Result<AppSuccess, AppError> {
    let reply = state.community.create_comment_reply(auth.id, id, &payload.content, payload.image_url).await?;
    Ok(AppSuccess::new("reply created", json!(reply)))
}

async fn get_comment_replies(
    State(state): State<GlobalState>,
    Path(id): Path<i64>,
) -> Result<AppSuccess, AppError> {
    let replies = state.community.get_comment_replies(id).await?;
    Ok(AppSuccess::new("replies", json!(replies)))
}

async fn delete_comment(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<AppSuccess, AppError> {
    state.community.delete_comment(auth.id, id).await?;
    Ok(AppSuccess::new("comment deleted", json!({})))
}

async fn like_post(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<AppSuccess, AppError> {
    let like_count = state.community.like_post(auth.id, id).await?;
    Ok(AppSuccess::new("post liked", json!({ "like_count": like_count })))
}

async fn unlike_post(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<AppSuccess, AppError> {
    let like_count = state.community.unlike_post(auth.id, id).await?;
    Ok(AppSuccess::new("post unliked", json!({ "like_count": like_count })))
}

async fn follow_user(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<AppSuccess, AppError> {
    let follow = state.community.follow(auth.id, id).await?;
    Ok(AppSuccess::new("followed", json!(follow)))
}

async fn unfollow_user(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<AppSuccess, AppError> {
    state.community.unfollow(auth.id, id).await?;
    Ok(AppSuccess::new("unfollowed", json!({})))
}

async fn get_followers(
    State(state): State<GlobalState>,
    Path(id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> Result<AppSuccess, AppError> {
    let (users, total) = state.community.get_followers(id, page.page(), page.page_size()).await?;
    Ok(AppSuccess::page("followers", users, total, page.page(), page.page_size()))
}

async fn get_following(
    State(state): State<GlobalState>,
    Path(id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> Result<AppSuccess, AppError> {
    let (users, total) = state.community.get_following(id, page.page(), page.page_size()).await?;
    Ok(AppSuccess::page("following", users, total, page.page(), page.page_size()))
}

async fn get_current_user_following(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> Result<AppSuccess, AppError> {
    let (users, total) = state.community.get_following(auth.id, page.page(), page.page_size()).await?;
    Ok(AppSuccess::page("following", users, total, page.page(), page.page_size()))
}

async fn get_follow_status(
    State(state): State<GlobalState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<AppSuccess, AppError> {
    let status = state.community.get_follow_status(auth.id, id).await?;
    Ok(AppSuccess::new("follow status", json!(status)))
}

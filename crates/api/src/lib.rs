mod env;
mod global_state;
mod metrics;
mod middleware;
mod response;
mod routes;
mod utils;

use std::any::Any;

use anyhow::anyhow;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crowdnest_platform::ErrorCode;

pub use routes::{
    address_routes,
    admin_routes,
    auth_routes,
    community_routes,
    misc_routes,
    payment_routes,
    profile_routes,
    project_routes,
    PageQuery,
};

pub use env::ApiServerEnv;
pub use global_state::{ErrorCount, ErrorStats, GlobalState};
pub use utils::{extract_bearer_token, setup_tracing};
pub use middleware::{admin_only, authenticate, error_monitor, AuthUser, AUTH_TIMEOUT};
pub use response::{AppError, AppSuccess, ErrorBody};

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err.downcast_ref::<String>().cloned()
        .or_else(|| err.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!("[panic] request handler panicked: {}", detail);
    AppError::new(ErrorCode::Internal, anyhow!("handler panicked: {}", detail)).into_response()
}

/// Every route, with the shared layers. `uploads_dir` is served under `/uploads`.
pub fn app_router(state: GlobalState, uploads_dir: &str) -> Router {
    Router::new()
        .merge(auth_routes(state.clone()))
        .merge(profile_routes(state.clone()))
        .merge(address_routes(state.clone()))
        .merge(project_routes(state.clone()))
        .merge(payment_routes(state.clone()))
        .merge(admin_routes(state.clone()))
        .merge(community_routes(state.clone()))
        .merge(misc_routes())
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(axum::middleware::from_fn_with_state(state.clone(), error_monitor))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    async fn boom() -> &'static str {
        panic!("exploded")
    }

    #[tokio::test]
    async fn panics_become_internal_errors() {
        let app: Router = Router::new()
            .route("/boom", get(boom))
            .layer(CatchPanicLayer::custom(panic_response));

        let response = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.extensions().get::<ErrorCode>(), Some(&ErrorCode::Internal));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.code, 1000);
        assert_eq!(body.message, "internal server error");
    }
}

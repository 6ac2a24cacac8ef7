use anyhow::anyhow;
use axum::{routing::get, Router};

use crowdnest_platform::ErrorCode;

use crate::{metrics, response::AppError, GlobalState};

pub fn misc_routes() -> Router<GlobalState> {
    Router::new()
        .route("/health",
            get(|| async { "OK" })
        )
        .route("/metrics",
            get(render_metrics)
        )
}

async fn render_metrics() -> Result<String, AppError> {
    metrics::render()
        .map_err(|e| AppError::new(ErrorCode::Internal, anyhow!("failed to encode metrics: {}", e)))
}

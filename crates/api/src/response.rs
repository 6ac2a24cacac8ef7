use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crowdnest_common::env_or;
use crowdnest_platform::{ErrorCode, PlatformError};

lazy_static! {
    static ref EXPOSE_ERROR_DETAIL: bool = env_or("DEBUG", "false").eq_ignore_ascii_case("true");
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSuccess {
    pub code: u16,
    pub message: String,
    pub data: serde_json::Value,
}

impl AppSuccess {
    pub fn new(message: &str, data: serde_json::Value) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            message: message.to_string(),
            data,
        }
    }

    /// A page of items with its total.
    pub fn page<T: Serialize>(message: &str, items: Vec<T>, total: i64, page: i64, page_size: i64) -> Self {
        Self::new(message, json!({
            "items": items,
            "total": total,
            "page": page,
            "page_size": page_size,
        }))
    }
}

impl IntoResponse for AppSuccess {
    fn into_response(self) -> Response {
        Json::from(self).into_response()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Wraps any error with the code it is reported under.
#[derive(Debug)]
pub struct AppError(pub ErrorCode, pub anyhow::Error);

impl AppError {
    pub fn new(code: ErrorCode, err: anyhow::Error) -> Self {
        Self(code, err)
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Business errors carry a message meant for the caller; anything else is
    /// reported by its code only.
    pub fn body(&self, expose_detail: bool) -> ErrorBody {
        let message = match self.1.downcast_ref::<PlatformError>() {
            Some(PlatformError::Business(_, message)) => message.clone(),
            _ if is_client_error(self.0) => self.1.to_string(),
            _ => self.0.default_message().to_string(),
        };
        ErrorBody {
            code: self.0.code(),
            message,
            error: expose_detail.then(|| format!("{:#}", self.1)),
        }
    }
}

fn is_client_error(code: ErrorCode) -> bool {
    code.http_status() < 500
}

/// Which code a bare error is reported under.
fn classify(err: &anyhow::Error) -> ErrorCode {
    if let Some(platform) = err.downcast_ref::<PlatformError>() {
        return platform.code();
    }
    if err.downcast_ref::<sqlx::Error>().is_some() {
        return ErrorCode::Database;
    }
    ErrorCode::Internal
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::error!("CODE: {}, STATUS: {}, MESSAGE: {:#}", self.0.code(), status.as_u16(), self.1);

        let mut response = (status, Json(self.body(*EXPOSE_ERROR_DETAIL))).into_response();
        response.extensions_mut().insert(self.0);
        response
    }
}

// `?` on anything convertible into `anyhow::Error`. Platform errors keep their code.
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self(classify(&err), err)
    }
}

use anyhow::anyhow;
use axum::http::{header, HeaderMap};
use tracing_subscriber::EnvFilter;

use crowdnest_common::env_or;
use crowdnest_platform::ErrorCode;

use crate::response::AppError;

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    let auth_header = headers.get(header::AUTHORIZATION);

    match auth_header {
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| AppError::new(ErrorCode::Unauthorized, anyhow!("invalid authorization header")))?
                .split_whitespace()
                .collect::<Vec<_>>();

            if value.len() != 2 || value[0] != "Bearer" {
                return Err(AppError::new(
                    ErrorCode::Unauthorized,
                    anyhow!("invalid authorization header"),
                ));
            }

            Ok(value[1].to_string())
        }
        _ => {
            Err(AppError::new(
                ErrorCode::Unauthorized,
                anyhow!("missing authorization header"),
            ))
        }
    }
}

/// `RUST_LOG` wins over `LOG_LEVEL`; both default to `info`.
pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(env_or("LOG_LEVEL", "info")));
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("tracing subscriber was already set");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def");

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        let err = extract_bearer_token(&headers).unwrap_err();
        assert_eq!(err.0, ErrorCode::Unauthorized);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer"));
        assert!(extract_bearer_token(&headers).is_err());
    }
}

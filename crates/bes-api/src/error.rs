//! API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Core error: {0}")]
    Core(#[from] bes_core::CoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Core(e) => match e {
                bes_core::CoreError::NoShardForUrl(_) => (StatusCode::NOT_FOUND, e.to_string()),
                bes_core::CoreError::ShardExists(_) => (StatusCode::CONFLICT, e.to_string()),
                bes_core::CoreError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, e.to_string()),
                bes_core::CoreError::Proxy(_) | bes_core::CoreError::Parse(_) => {
                    (StatusCode::BAD_GATEWAY, e.to_string())
                }
                bes_core::CoreError::Serialize(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                }
            },
        };

        // Clients expect a cacheitem field even on errors
        let body = axum::Json(json!({
            "cacheitem": "",
            "error": message,
        }));

        (status, body).into_response()
    }
}

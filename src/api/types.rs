use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Error surface for the bounded query API (spec.md §1's "serves bounded
/// queries against that store"). Kept separate from [`crate::error::ColonyError`]
/// since an HTTP handler's failure mode is "what status code" rather than
/// "is this retriable".
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("not found")]
    NotFound,

    #[error("invalid query parameter: {0}")]
    BadRequest(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database error".to_string()),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()),
        };

        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

/// Every list endpoint takes the same bounded-window parameters. Nothing
/// here is unbounded, matching the purpose statement's "bounded queries"
/// language.
#[derive(Debug, serde::Deserialize)]
pub struct ListParams {
    pub agent_id: Option<String>,
    pub service_name: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    200
}

/// Hard ceiling regardless of what the caller asks for.
pub const MAX_LIMIT: i64 = 1000;

impl ListParams {
    pub fn bounded_limit(&self) -> i64 {
        self.limit.clamp(1, MAX_LIMIT)
    }
}

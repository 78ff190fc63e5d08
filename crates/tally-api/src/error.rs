use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tally_core::error::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("poll is inactive or expired")]
    PollClosed,
    #[error("option does not belong to this poll")]
    InvalidOption,
    #[error("already voted in this poll")]
    DuplicateVote,
    #[error("transaction failed, try again")]
    TransactionFailed,
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Machine-readable error code string.
    fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound => "NOT_FOUND",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::PollClosed => "POLL_CLOSED",
            ApiError::InvalidOption => "INVALID_OPTION",
            ApiError::DuplicateVote => "DUPLICATE_VOTE",
            ApiError::TransactionFailed => "TRANSACTION_FAILED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) | ApiError::InvalidOption => StatusCode::BAD_REQUEST,
            ApiError::PollClosed | ApiError::DuplicateVote => StatusCode::CONFLICT,
            ApiError::TransactionFailed => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        let message = match &self {
            ApiError::Internal(err) => {
                tracing::error!("API internal error: {err:#}");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "code": code,
            "message": message,
            "error": message,
            "details": Value::Null,
        });

        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::NotFound => ApiError::NotFound,
            CoreError::PermissionDenied => ApiError::Forbidden,
            CoreError::InvalidInput(msg) => ApiError::BadRequest(msg),
            CoreError::PollInactiveOrExpired => ApiError::PollClosed,
            CoreError::InvalidOption => ApiError::InvalidOption,
            CoreError::DuplicateVote => ApiError::DuplicateVote,
            CoreError::TransactionFailure => ApiError::TransactionFailed,
            CoreError::Database(err) => ApiError::Internal(anyhow::anyhow!(err)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("rejected request body: {}", rejection.body_text());
        let message = match rejection {
            JsonRejection::MissingJsonContentType(_) => "Expected a JSON request body",
            JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON",
            _ => "Request body does not match the expected shape",
        };
        ApiError::BadRequest(message.to_string())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        tracing::debug!("rejected path: {}", rejection.body_text());
        ApiError::BadRequest("Invalid path parameter".to_string())
    }
}

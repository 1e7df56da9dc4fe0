//! HTTP error mapping

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use terminal_core::TerminalError;

/// Error returned by every handler
#[derive(Error, Debug)]
#[error(transparent)]
pub struct ApiError(#[from] TerminalError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            TerminalError::InvalidAmount { .. }
            | TerminalError::NotCancelable { .. }
            | TerminalError::ReaderAction { .. } => StatusCode::BAD_REQUEST,
            TerminalError::NoIntents | TerminalError::LocationNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let err = self.0;
        let code = err.code();

        let body = match &err {
            TerminalError::ReaderAction { message, .. } => {
                json!({ "error": message, "code": code })
            }
            TerminalError::NotCancelable { current_status, .. } => json!({
                "error": err.to_string(),
                "code": code,
                "currentStatus": current_status,
            }),
            _ if status.is_server_error() => {
                tracing::error!(code, error = %err, "Request failed");
                json!({ "error": err.user_message(), "code": code })
            }
            _ => json!({ "error": err.to_string(), "code": code }),
        };

        (status, Json(body)).into_response()
    }
}

/// Type alias for handler results
pub type ApiResult<T> = Result<T, ApiError>;

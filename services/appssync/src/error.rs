//! Service-specific error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Terminal failures of one authorization flow or CLI invocation.
///
/// The listener renders these as HTTP error responses; the CLI prints them
/// and exits non-zero.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("authorization state mismatch (stale link or forged callback)")]
    AuthorizationState,

    #[error("callback is missing the {0} parameter")]
    MissingParameter(&'static str),

    #[error("authorization denied by provider: {0}")]
    Denied(String),

    #[error("code exchange failed: {0}")]
    Exchange(String),

    #[error("storing token failed: {0}")]
    Write(String),

    #[error("no callback received within {0} seconds")]
    Timeout(u64),

    #[error("interrupted before authorization completed")]
    Interrupted,

    #[error("invalid arguments: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl FlowError {
    /// HTTP status the callback listener answers with.
    pub fn status(&self) -> StatusCode {
        match self {
            FlowError::AuthorizationState
            | FlowError::MissingParameter(_)
            | FlowError::Denied(_)
            | FlowError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            FlowError::Exchange(_) => StatusCode::BAD_GATEWAY,
            FlowError::Timeout(_) | FlowError::Interrupted => StatusCode::SERVICE_UNAVAILABLE,
            FlowError::Write(_) | FlowError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            FlowError::AuthorizationState => "authorization_state",
            FlowError::MissingParameter(_) => "missing_parameter",
            FlowError::Denied(_) => "access_denied",
            FlowError::Exchange(_) => "exchange_error",
            FlowError::Write(_) => "write_error",
            FlowError::Timeout(_) => "timeout",
            FlowError::Interrupted => "interrupted",
            FlowError::InvalidArgument(_) => "invalid_argument",
            FlowError::Config(_) => "config_error",
        }
    }
}

impl IntoResponse for FlowError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        });
        (
            self.status(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, FlowError>;

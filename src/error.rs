//! Unified API error handling
//!
//! Every handler returns `ApiResult`. Errors coming back from the backend are
//! mapped onto the same variants so the browser sees one error shape.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Field name -> messages, as returned by the backend on 422.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {message}")]
    Validation { message: String, errors: FieldErrors },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Backend error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Backend unavailable: {0}")]
    Offline(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

impl ApiError {
    /// Single-field validation failure.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.clone()]);
        Self::Validation { message, errors }
    }

    /// True when the backend could not be reached at all, which is the case
    /// the offline cache and queue cover.
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::Offline(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation { .. } => "VALIDATION_FAILED",
            Self::Conflict(_) => "CONFLICT",
            Self::Upstream { .. } => "BACKEND_ERROR",
            Self::Offline(_) => "BACKEND_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::BadRequest(msg)
            | Self::Conflict(msg) => msg.clone(),
            Self::Validation { message, .. } => message.clone(),
            Self::Upstream { message, .. } => message.clone(),
            Self::Offline(_) => "The backend is unreachable, try again later".to_string(),
            // Don't leak internal error details
            Self::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Internal(e) => {
                tracing::error!(error = ?e, "Internal server error");
            }
            Self::Upstream { status, message } => {
                tracing::error!(status = status, message = %message, "Backend error");
            }
            _ => {
                tracing::warn!(error = %self, "API error");
            }
        }

        let status = self.status_code();
        let code = self.error_code().to_string();
        let message = self.public_message();
        let errors = match self {
            Self::Validation { errors, .. } if !errors.is_empty() => Some(errors),
            _ => None,
        };

        (status, Json(ErrorResponse { code, message, errors })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

//! API error taxonomy and its HTTP mapping.
//!
//! Every fallible handler returns [`ApiError`]; the `IntoResponse` impl is
//! the single place where errors become status codes and JSON bodies.
//! Internal failures collapse into a generic 503 so backend details never
//! leak to clients; the detail goes to the logs instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

use crate::storage::StorageError;

/// One named validation failure inside a request payload.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    #[must_use]
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or out-of-range input; carries every offending field.
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    /// Unique constraint hit during registration or profile update.
    #[error("{0} already taken")]
    Duplicate(&'static str),

    /// Unknown username or wrong password; deliberately indistinguishable.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// Missing, expired or tampered session token.
    #[error("authentication required")]
    Unauthorized,

    /// Authenticated but lacking the required role.
    #[error("insufficient permissions")]
    Forbidden,

    #[error("not found")]
    NotFound,

    /// Model or storage unavailable; the client sees no internal detail.
    #[error("service temporarily unavailable")]
    ServiceUnavailable,
}

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Duplicate(_) => StatusCode::CONFLICT,
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            Self::Validation(fields) => json!({
                "error": self.to_string(),
                "fields": fields,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Duplicate(field) => Self::Duplicate(field),
            StorageError::NotFound => Self::NotFound,
            err => {
                error!("storage error: {err}");
                Self::ServiceUnavailable
            }
        }
    }
}

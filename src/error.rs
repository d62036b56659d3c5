// SPDX-License-Identifier: MIT

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Missing required configuration: {0}")]
    Config(&'static str),

    #[error("Strava API error: {0}")]
    StravaApi(String),

    /// CGM provider rejected the credentials. Retrying cannot help.
    #[error("CGM authentication failed: {0}")]
    CgmAuth(String),

    /// CGM provider was unreachable or returned a transient failure.
    #[error("CGM provider error: {0}")]
    CgmApi(String),

    #[error("Store error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Marker for Strava auth failures (expired/revoked token).
    pub const STRAVA_TOKEN_ERROR: &'static str = "Token expired or invalid";
    /// Marker for Strava rate limiting (retryable).
    pub const STRAVA_RATE_LIMIT: &'static str = "Rate limit exceeded";

    /// True when retrying the same operation cannot succeed (bad credentials,
    /// missing resources). The job queue uses this to skip pointless retries.
    pub fn is_permanent(&self) -> bool {
        match self {
            AppError::CgmAuth(_) => true,
            AppError::StravaApi(msg) => msg.contains(Self::STRAVA_TOKEN_ERROR),
            AppError::NotFound(_) | AppError::BadRequest(_) => true,
            _ => false,
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Config(name) => {
                tracing::error!(name, "Missing configuration");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "configuration_error",
                    Some((*name).to_string()),
                )
            }
            AppError::StravaApi(msg) => {
                (StatusCode::BAD_GATEWAY, "strava_error", Some(msg.clone()))
            }
            AppError::CgmAuth(msg) => {
                (StatusCode::BAD_REQUEST, "cgm_auth_error", Some(msg.clone()))
            }
            AppError::CgmApi(msg) => (StatusCode::BAD_GATEWAY, "cgm_error", Some(msg.clone())),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cgm_auth_is_permanent() {
        assert!(AppError::CgmAuth("bad password".into()).is_permanent());
        assert!(!AppError::CgmApi("connection reset".into()).is_permanent());
    }

    #[test]
    fn strava_token_error_is_permanent() {
        let err = AppError::StravaApi(AppError::STRAVA_TOKEN_ERROR.to_string());
        assert!(err.is_permanent());

        let err = AppError::StravaApi("HTTP 503: upstream down".to_string());
        assert!(!err.is_permanent());
    }
}

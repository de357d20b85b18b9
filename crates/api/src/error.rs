//! API error type and transport mapping
//!
//! The billing crate's error taxonomy is mapped to HTTP status codes here
//! and nowhere else. Response bodies carry a stable
//! `{"error": {"message": ...}}` shape; internal detail is logged, not
//! returned.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use apexops_billing::BillingError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Service unavailable")]
    ServiceUnavailable,

    #[error("Internal server error")]
    Internal(String),
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InvalidTier(_)
            | BillingError::WebhookSignatureInvalid
            | BillingError::WebhookEventNotSupported(_) => ApiError::BadRequest(err.to_string()),
            BillingError::ClientNotFound | BillingError::NoActiveSubscription => {
                ApiError::NotFound(err.to_string())
            }
            BillingError::Config(_)
            | BillingError::Stripe(_)
            | BillingError::Database(_)
            | BillingError::Internal(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::ServiceUnavailable => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            ApiError::Internal(detail) => {
                // Do not leak upstream detail to the caller
                tracing::error!(detail = %detail, "Internal API error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": { "message": message } }))).into_response()
    }
}

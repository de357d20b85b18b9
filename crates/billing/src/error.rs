//! Billing error taxonomy
//!
//! Transport mapping (HTTP status codes) happens in the API crate, never
//! here. Validation errors carry stable messages so handlers can pass
//! them through unchanged.

use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    /// Requested tier is not in the fixed tier table
    #[error("Invalid tier: {0}")]
    InvalidTier(String),

    /// The caller's identity resolved but has no client record
    #[error("No client record found")]
    ClientNotFound,

    /// Cancel was requested but the client has no subscription on file
    #[error("No active subscription")]
    NoActiveSubscription,

    /// Webhook signature did not verify against the configured secret
    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    /// Event carried an object of an unexpected type
    #[error("Webhook event not supported: {0}")]
    WebhookEventNotSupported(String),

    /// Required configuration is missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stripe API error: {0}")]
    Stripe(#[from] stripe::StripeError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal billing error: {0}")]
    Internal(String),
}

//! Billing routes for Stripe integration

use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use apexops_billing::{CheckoutResponse, SubscriptionProjection};
use apexops_shared::ClientRecord;

use crate::{auth::AuthUser, error::ApiError, state::AppState, ApiResult};

/// Request to create a checkout session
#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub tier: String,
    #[serde(default)]
    pub success_url: Option<String>,
    #[serde(default)]
    pub cancel_url: Option<String>,
}

/// Live subscription detail attached to a status response
#[derive(Debug, Serialize)]
pub struct SubscriptionInfo {
    pub status: String,
    pub current_period_end: String,
    pub cancel_at_period_end: bool,
    pub trial_end: Option<String>,
}

/// Subscription status response
#[derive(Debug, Serialize)]
pub struct SubscriptionStatusResponse {
    pub client_id: Uuid,
    pub tier: String,
    pub status: String,
    /// Live Stripe projection; null when no subscription is on file or
    /// the live fetch failed
    pub subscription: Option<SubscriptionInfo>,
}

/// Response from a cancellation request
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub message: String,
    pub cancel_at: String,
}

/// Create a checkout session for a subscription
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateCheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    let client = resolve_client(&state, &auth_user).await?;
    let email = auth_user.email.as_deref().unwrap_or("");

    let session = state
        .billing
        .checkout
        .create_subscription_checkout(&client, email, &req.tier, req.success_url, req.cancel_url)
        .await?;

    Ok(Json(session))
}

/// Receive a Stripe webhook.
///
/// The body stays raw for signature verification. A processing failure
/// returns 400 so Stripe redelivers; unmappable events are acknowledged
/// inside the handler and land here as success.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<serde_json::Value>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing Stripe-Signature header".to_string()))?;

    let event = state.billing.webhooks.verify_event(&body, signature)?;

    state.billing.webhooks.handle_event(event).await.map_err(|e| {
        tracing::error!(error = %e, "Webhook processing failed");
        ApiError::BadRequest("Webhook processing failed".to_string())
    })?;

    Ok(Json(json!({ "received": true })))
}

/// Get current subscription status
pub async fn subscription_status(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<SubscriptionStatusResponse>> {
    let client = resolve_client(&state, &auth_user).await?;

    let status = state.billing.subscriptions.subscription_status(&client).await?;

    Ok(Json(SubscriptionStatusResponse {
        client_id: status.client_id,
        tier: status.tier,
        status: status.status,
        subscription: status.subscription.map(subscription_info),
    }))
}

/// Cancel the caller's subscription at period end
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<CancelResponse>> {
    let client = resolve_client(&state, &auth_user).await?;

    let outcome = state.billing.subscriptions.cancel_at_period_end(&client).await?;

    Ok(Json(CancelResponse {
        message: "Subscription will end at the close of the current billing period".to_string(),
        cancel_at: rfc3339(outcome.cancel_at),
    }))
}

/// Resolve the caller's client record or 404
async fn resolve_client(state: &AppState, auth_user: &AuthUser) -> ApiResult<ClientRecord> {
    state
        .billing
        .subscriptions
        .client_for_user(auth_user.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No client record found".to_string()))
}

fn subscription_info(projection: SubscriptionProjection) -> SubscriptionInfo {
    SubscriptionInfo {
        status: projection.status,
        current_period_end: rfc3339(projection.current_period_end),
        cancel_at_period_end: projection.cancel_at_period_end,
        trial_end: projection.trial_end.map(rfc3339),
    }
}

fn rfc3339(t: OffsetDateTime) -> String {
    t.format(&Rfc3339).unwrap_or_default()
}

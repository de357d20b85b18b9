//! Route definitions

pub mod billing;

use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::{auth::require_auth, state::AppState};

/// Build the application router.
///
/// The webhook route sits outside the auth middleware: Stripe
/// authenticates with its signature, not a bearer token, and signature
/// verification needs the raw body.
pub fn create_router(state: AppState) -> Router {
    let authed = Router::new()
        .route("/api/billing/checkout", post(billing::create_checkout))
        .route("/api/billing/subscription", get(billing::subscription_status))
        .route(
            "/api/billing/subscription/cancel",
            post(billing::cancel_subscription),
        )
        .route_layer(middleware::from_fn_with_state(
            state.auth_state(),
            require_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/api/billing/webhook", post(billing::stripe_webhook))
        .merge(authed)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

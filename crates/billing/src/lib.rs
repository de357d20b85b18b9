// Billing crate clippy configuration
// These are intentional patterns in this crate:
#![allow(clippy::result_large_err)] // BillingError carries stripe::StripeError
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Apex Operations Billing Module
//!
//! Handles Stripe integration for the subscription lifecycle.
//!
//! ## Features
//!
//! - **Checkout**: Create subscription checkout sessions bound to a client
//! - **Webhooks**: Verify and apply Stripe lifecycle events (the single
//!   writer of client billing status)
//! - **Status**: Read store-authoritative status with a best-effort live
//!   Stripe projection
//! - **Cancellation**: Deferred cancel-at-period-end
//! - **Invariants**: Runnable consistency checks over client records

pub mod checkout;
pub mod client;
pub mod error;
pub mod invariants;
pub mod subscriptions;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Checkout
pub use checkout::{CheckoutResponse, CheckoutService};

// Client
pub use client::{StripeClient, StripeConfig};

// Error
pub use error::{BillingError, BillingResult};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Subscriptions
pub use subscriptions::{
    CancellationOutcome, ClientBillingStatus, SubscriptionProjection, SubscriptionService,
};

// Webhooks
pub use webhooks::{ClientTransition, WebhookEventKind, WebhookHandler};

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub checkout: CheckoutService,
    pub subscriptions: SubscriptionService,
    pub webhooks: WebhookHandler,
    pub invariants: InvariantChecker,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?, pool))
    }

    /// Create a new billing service with explicit config
    pub fn new(config: StripeConfig, pool: PgPool) -> Self {
        let stripe = StripeClient::new(config);

        Self {
            checkout: CheckoutService::new(stripe.clone()),
            subscriptions: SubscriptionService::new(stripe.clone(), pool.clone()),
            webhooks: WebhookHandler::new(stripe, pool.clone()),
            invariants: InvariantChecker::new(pool),
        }
    }
}

//! Stripe client wrapper and configuration

use std::sync::Arc;

use crate::error::{BillingError, BillingResult};

/// Stripe configuration
///
/// All fields are required; construction fails fast rather than letting a
/// half-configured service limp along and drop webhook events.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_live_... / sk_test_...)
    pub secret_key: String,
    /// Webhook signing secret (whsec_...)
    pub webhook_secret: String,
    /// Frontend origin used to build default checkout redirect URLs
    pub frontend_url: String,
}

impl StripeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: require_env("STRIPE_SECRET_KEY")?,
            webhook_secret: require_env("STRIPE_WEBHOOK_SECRET")?,
            frontend_url: require_env("FRONTEND_URL")?,
        })
    }
}

fn require_env(name: &str) -> BillingResult<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BillingError::Config(format!("{} must be set", name)))
}

/// Shared Stripe client
///
/// Cheap to clone; services hold their own copy.
#[derive(Clone)]
pub struct StripeClient {
    inner: stripe::Client,
    config: Arc<StripeConfig>,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let inner = stripe::Client::new(config.secret_key.clone());
        Self {
            inner,
            config: Arc::new(config),
        }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    /// The underlying async-stripe client, for API calls
    pub fn inner(&self) -> &stripe::Client {
        &self.inner
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

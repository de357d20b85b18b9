//! Server configuration
//!
//! Every billing-relevant variable is required: a missing secret fails
//! startup instead of silently degrading into a server that drops webhook
//! events or builds broken redirect URLs.

use apexops_billing::StripeConfig;

/// Application configuration, loaded once at startup
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// Postgres connection string (Supabase pooler URL in production)
    pub database_url: String,
    /// Frontend origin for checkout redirect construction
    pub frontend_url: String,
    /// Supabase project URL, for bearer token verification
    pub supabase_url: String,
    /// Supabase anon key, sent alongside token verification requests
    pub supabase_anon_key: String,
    /// Stripe secret API key
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
    /// CORS origin allowlist
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            database_url: require("DATABASE_URL")?,
            frontend_url: require("FRONTEND_URL")?,
            supabase_url: require("SUPABASE_URL")?,
            supabase_anon_key: require("SUPABASE_ANON_KEY")?,
            stripe_secret_key: require("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: require("STRIPE_WEBHOOK_SECRET")?,
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    /// Stripe configuration for constructing the billing service
    pub fn stripe_config(&self) -> StripeConfig {
        StripeConfig {
            secret_key: self.stripe_secret_key.clone(),
            webhook_secret: self.stripe_webhook_secret.clone(),
            frontend_url: self.frontend_url.clone(),
        }
    }
}

fn require(name: &str) -> anyhow::Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => anyhow::bail!("{} must be set", name),
    }
}

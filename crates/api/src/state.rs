//! Application state

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use sqlx::PgPool;
use tokio::sync::RwLock;

use apexops_billing::BillingService;

use crate::{
    auth::{AuthState, TokenCache},
    config::Config,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    /// Billing service, constructed once from explicit config
    pub billing: Arc<BillingService>,
    pub http_client: Client,
    /// Cache for Supabase token verification results
    pub(crate) token_cache: TokenCache,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        // Explicitly constructed rather than read from globals so tests
        // and tooling can substitute their own config
        let billing = Arc::new(BillingService::new(config.stripe_config(), pool.clone()));
        tracing::info!("Stripe billing service initialized");

        let http_client = Client::new();
        let token_cache: TokenCache = Arc::new(RwLock::new(HashMap::new()));

        Self {
            pool,
            config,
            billing,
            http_client,
            token_cache,
        }
    }

    /// Auth state for the bearer authentication middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            supabase_url: self.config.supabase_url.clone(),
            supabase_anon_key: self.config.supabase_anon_key.clone(),
            http_client: self.http_client.clone(),
            token_cache: self.token_cache.clone(),
        }
    }
}

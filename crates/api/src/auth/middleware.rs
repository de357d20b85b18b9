//! Bearer authentication middleware
//!
//! The caller's bearer token is verified against Supabase's
//! `/auth/v1/user` endpoint, which resolves it to a user id and email.
//! Verification results are cached for a short TTL so a dashboard issuing
//! parallel requests does not hit Supabase rate limits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Token cache TTL - cache Supabase verification results for 60 seconds
const TOKEN_CACHE_TTL: Duration = Duration::from_secs(60);

/// Maximum cache entries; oldest entries are evicted beyond this so an
/// attacker sending many unique tokens cannot exhaust memory
const MAX_CACHE_ENTRIES: usize = 10_000;

/// Cached verification result
#[derive(Clone, Debug)]
pub(crate) struct CachedIdentity {
    user: SupabaseUserResponse,
    cached_at: Instant,
}

/// Thread-safe token cache type (crate-internal, not part of public API)
pub(crate) type TokenCache = Arc<RwLock<HashMap<String, CachedIdentity>>>;

/// Response from the Supabase /auth/v1/user endpoint
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SupabaseUserResponse {
    id: String,
    email: Option<String>,
}

/// Authenticated caller, inserted into request extensions
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub http_client: Client,
    pub(crate) token_cache: TokenCache,
}

#[derive(Debug)]
pub(crate) enum AuthError {
    MissingAuth,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingAuth => "Authentication required",
            AuthError::InvalidToken => "Invalid or expired credentials",
        };
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "message": message } })),
        )
            .into_response()
    }
}

/// Extract a bearer token from the Authorization header
fn extract_bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(String::from)
}

/// Middleware that requires authentication
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let Some(token) = extract_bearer_token(&request) else {
        tracing::warn!(path = %path, "require_auth: no bearer token");
        return AuthError::MissingAuth.into_response();
    };

    match resolve_identity(&auth_state, &token).await {
        Ok(auth_user) => {
            tracing::debug!(
                path = %path,
                user_id = %auth_user.user_id,
                "require_auth: authentication successful"
            );
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(path = %path, error = ?err, "require_auth: authentication failed");
            err.into_response()
        }
    }
}

/// Resolve a bearer token to an identity via Supabase, with caching.
pub(crate) async fn resolve_identity(
    state: &AuthState,
    token: &str,
) -> Result<AuthUser, AuthError> {
    // Fast path: cached verification
    {
        let cache = state.token_cache.read().await;
        if let Some(cached) = cache.get(token) {
            if cached.cached_at.elapsed() < TOKEN_CACHE_TTL {
                return auth_user_from_response(&cached.user);
            }
        }
    }

    let url = format!("{}/auth/v1/user", state.supabase_url);
    let response = state
        .http_client
        .get(&url)
        .header("Authorization", format!("Bearer {}", token))
        .header("apikey", &state.supabase_anon_key)
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Supabase token verification request failed");
            AuthError::InvalidToken
        })?;

    if !response.status().is_success() {
        tracing::warn!(
            status = %response.status(),
            "Supabase rejected bearer token"
        );
        return Err(AuthError::InvalidToken);
    }

    let user: SupabaseUserResponse = response.json().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to parse Supabase user response");
        AuthError::InvalidToken
    })?;

    let auth_user = auth_user_from_response(&user)?;

    // Cache the verification, evicting the oldest entry if at capacity
    {
        let mut cache = state.token_cache.write().await;
        if cache.len() >= MAX_CACHE_ENTRIES {
            if let Some(oldest) = cache
                .iter()
                .min_by_key(|(_, v)| v.cached_at)
                .map(|(k, _)| k.clone())
            {
                cache.remove(&oldest);
            }
        }
        cache.insert(
            token.to_string(),
            CachedIdentity {
                user,
                cached_at: Instant::now(),
            },
        );
    }

    Ok(auth_user)
}

fn auth_user_from_response(user: &SupabaseUserResponse) -> Result<AuthUser, AuthError> {
    let user_id = Uuid::parse_str(&user.id).map_err(|_| {
        tracing::error!(id = %user.id, "Supabase user id is not a UUID");
        AuthError::InvalidToken
    })?;

    Ok(AuthUser {
        user_id,
        email: user.email.clone(),
    })
}

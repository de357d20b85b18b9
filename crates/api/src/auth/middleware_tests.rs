// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Tests for bearer token verification against a mocked Supabase endpoint

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use super::middleware::{resolve_identity, AuthState};

fn auth_state(supabase_url: String) -> AuthState {
    AuthState {
        supabase_url,
        supabase_anon_key: "anon-key".to_string(),
        http_client: reqwest::Client::new(),
        token_cache: Arc::new(RwLock::new(HashMap::new())),
    }
}

#[tokio::test]
async fn test_valid_token_resolves_identity() {
    let mut server = mockito::Server::new_async().await;
    let user_id = Uuid::new_v4();

    let mock = server
        .mock("GET", "/auth/v1/user")
        .match_header("authorization", "Bearer good-token")
        .match_header("apikey", "anon-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"id":"{}","email":"dispatch@roadhawk.example"}}"#,
            user_id
        ))
        .create_async()
        .await;

    let state = auth_state(server.url());
    let auth_user = resolve_identity(&state, "good-token").await.unwrap();

    assert_eq!(auth_user.user_id, user_id);
    assert_eq!(auth_user.email.as_deref(), Some("dispatch@roadhawk.example"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_second_lookup_served_from_cache() {
    let mut server = mockito::Server::new_async().await;
    let user_id = Uuid::new_v4();

    // expect(1): the second resolve must not reach Supabase
    let mock = server
        .mock("GET", "/auth/v1/user")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(r#"{{"id":"{}","email":null}}"#, user_id))
        .expect(1)
        .create_async()
        .await;

    let state = auth_state(server.url());
    let first = resolve_identity(&state, "cached-token").await.unwrap();
    let second = resolve_identity(&state, "cached-token").await.unwrap();

    assert_eq!(first.user_id, second.user_id);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_rejected_token_is_unauthenticated() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("GET", "/auth/v1/user")
        .with_status(401)
        .with_body(r#"{"message":"invalid JWT"}"#)
        .create_async()
        .await;

    let state = auth_state(server.url());
    let result = resolve_identity(&state, "bad-token").await;

    assert!(result.is_err());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_non_uuid_user_id_rejected() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("GET", "/auth/v1/user")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"not-a-uuid","email":null}"#)
        .create_async()
        .await;

    let state = auth_state(server.url());
    let result = resolve_identity(&state, "weird-token").await;

    assert!(result.is_err());
    mock.assert_async().await;
}

// tests/token_tests.rs
//! Typed claims through `TokenService`

mod common;
mod support;

use std::sync::Arc;
use std::time::Duration;

use envelope_keyring::{IssueOptions, KeyringError, TokenService};
use serde::{Deserialize, Serialize};
use support::{issuer, memory_store, validator};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Claims {
    sub: String,
    roles: Vec<String>,
}

fn claims() -> Claims {
    Claims {
        sub: "u1".into(),
        roles: vec!["reader".into()],
    }
}

#[tokio::test]
async fn claims_round_trip() {
    common::setup();
    let store = memory_store();
    let tokens = TokenService::new(Arc::new(issuer(&store).await));

    let token = tokens.issue(&claims()).await.unwrap();
    let back: Claims = tokens.validate(&token).await.unwrap();
    assert_eq!(back, claims());
    tokens.manager().shutdown().await;
}

#[tokio::test]
async fn rotation_scenario() {
    let store = memory_store();
    let tokens = TokenService::new(Arc::new(issuer(&store).await));
    let manager = Arc::clone(tokens.manager());

    let token = tokens.issue(&serde_json::json!({"sub": "u1"})).await.unwrap();
    let check = |value: serde_json::Value| assert_eq!(value["sub"], "u1");
    check(tokens.validate(&token).await.unwrap());

    manager.rotate_key().await.unwrap();
    manager.rotate_key().await.unwrap();
    check(tokens.validate(&token).await.unwrap());

    manager.rotate_key().await.unwrap();
    assert!(matches!(
        tokens.validate::<serde_json::Value>(&token).await,
        Err(KeyringError::DecryptionFailed)
    ));
    manager.shutdown().await;
}

#[tokio::test]
async fn validator_refreshes_once_for_unknown_key() {
    common::setup();
    let store = memory_store();
    let issuing = TokenService::new(Arc::new(issuer(&store).await));
    let validating = TokenService::new(Arc::new(validator(&store).await));

    issuing.manager().rotate_key().await.unwrap();
    let token = issuing.issue(&claims()).await.unwrap();

    let back: Claims = validating.validate(&token).await.unwrap();
    assert_eq!(back, claims());
    assert_eq!(
        validating.manager().current_keys()[0].fingerprint(),
        issuing.manager().current_keys()[0].fingerprint()
    );
    issuing.manager().shutdown().await;
}

#[tokio::test]
async fn validator_still_fails_for_foreign_tokens() {
    let ours = memory_store();
    let theirs = memory_store();
    let _issuer = issuer(&ours).await;
    let foreign = TokenService::new(Arc::new(issuer(&theirs).await));
    let validating = TokenService::new(Arc::new(validator(&ours).await));

    let token = foreign.issue(&claims()).await.unwrap();
    assert!(matches!(
        validating.validate::<Claims>(&token).await,
        Err(KeyringError::DecryptionFailed)
    ));
}

#[tokio::test]
async fn expired_token_is_not_retried() {
    let store = memory_store();
    let issuing = TokenService::new(Arc::new(issuer(&store).await));
    let validating = TokenService::new(Arc::new(validator(&store).await));

    let token = issuing
        .issue_with(&claims(), &IssueOptions::new().expires_in(Duration::from_secs(1)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(matches!(
        validating.validate::<Claims>(&token).await,
        Err(KeyringError::TokenExpired(_))
    ));
    issuing.manager().shutdown().await;
}

#[tokio::test]
async fn wrong_claims_shape_is_a_payload_error() {
    let store = memory_store();
    let tokens = TokenService::new(Arc::new(issuer(&store).await));

    let token = tokens.issue(&serde_json::json!({"unexpected": true})).await.unwrap();
    assert!(matches!(
        tokens.validate::<Claims>(&token).await,
        Err(KeyringError::Payload(_))
    ));
    tokens.manager().shutdown().await;
}

// tests/store_tests.rs
//! Key store backends: memory, SQLite and the remote publishing endpoint

mod common;
mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use envelope_keyring::export::export_to_json;
use envelope_keyring::key_ops::generate_key;
use envelope_keyring::{
    render_key_descriptors, IssueOptions, KeyDescriptor, KeyEntry, KeyManager, KeyStore,
    KeyringError, MemoryKeyStore, RemoteFetchError, RemoteKeyStore, SqliteKeyStore, StoreError,
};
use rusqlite::Connection;
use support::{quiet_config, StubServer};
use tempfile::TempDir;

fn entry(label: &str, minutes: i64) -> KeyEntry {
    KeyEntry::new(
        generate_key(),
        label.as_bytes().to_vec(),
        Utc::now() + TimeDelta::minutes(minutes),
    )
}

fn labels(keys: &[KeyEntry]) -> Vec<String> {
    keys.iter().map(KeyEntry::label).collect()
}

#[tokio::test]
async fn memory_store_returns_keys_oldest_first() {
    let store = MemoryKeyStore::new();
    store.save_key(&entry("b", 20)).await.unwrap();
    store.save_key(&entry("a", 10)).await.unwrap();
    store.save_key(&entry("c", 30)).await.unwrap();

    assert_eq!(labels(&store.get_all_keys().await.unwrap()), ["a", "b", "c"]);
}

#[tokio::test]
async fn sqlite_store_persists_across_reopen() {
    common::setup();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("keys.db");

    let saved = entry("encryption-key-1", 60);
    {
        let store = SqliteKeyStore::open(&path, None).unwrap();
        store.save_key(&saved).await.unwrap();
    }

    let store = SqliteKeyStore::open(&path, None).unwrap();
    let keys = store.get_all_keys().await.unwrap();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].id.is_some());
    assert_eq!(keys[0].key.expose_secret(), saved.key.expose_secret());
    assert_eq!(keys[0].info, saved.info);
    assert_eq!(
        keys[0].expiry.timestamp_millis(),
        saved.expiry.timestamp_millis()
    );
}

#[tokio::test]
async fn sqlite_store_returns_newest_window_ascending() {
    let store = SqliteKeyStore::open_in_memory().unwrap();
    for (label, minutes) in [("k2", 20), ("k4", 40), ("k1", 10), ("k3", 30)] {
        store.save_key(&entry(label, minutes)).await.unwrap();
    }

    assert_eq!(store.count().await.unwrap(), 4);
    assert_eq!(labels(&store.get_all_keys().await.unwrap()), ["k2", "k3", "k4"]);

    let wide = store.clone().with_query_limit(10);
    assert_eq!(
        labels(&wide.get_all_keys().await.unwrap()),
        ["k1", "k2", "k3", "k4"]
    );
}

#[tokio::test]
async fn sqlite_store_is_append_only() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("keys.db");
    let store = SqliteKeyStore::open(&path, None).unwrap();
    store.save_key(&entry("k1", 10)).await.unwrap();

    let raw = Connection::open(&path).unwrap();
    assert!(raw.execute("DELETE FROM encryption_keys", []).is_err());
    assert!(raw
        .execute("UPDATE encryption_keys SET expiry_ms = 0", [])
        .is_err());
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn sqlite_store_rejects_corrupt_rows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("keys.db");
    let store = SqliteKeyStore::open(&path, None).unwrap();

    let raw = Connection::open(&path).unwrap();
    raw.execute(
        "INSERT INTO encryption_keys (key_blob, info, expiry_ms) VALUES (?1, ?2, ?3)",
        rusqlite::params![vec![0u8; 16], b"short".to_vec(), Utc::now().timestamp_millis()],
    )
    .unwrap();

    assert!(matches!(
        store.get_all_keys().await,
        Err(KeyringError::Store(StoreError::Corrupt(_)))
    ));
}

#[tokio::test]
async fn issuer_and_validator_share_sqlite_store() {
    common::setup();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("keys.db");

    let issuer_store: Arc<dyn KeyStore> = Arc::new(SqliteKeyStore::open(&path, None).unwrap());
    let issuer = KeyManager::issuer(issuer_store, quiet_config()).await.unwrap();
    let token = issuer
        .issue(b"shared", &IssueOptions::default())
        .await
        .unwrap();

    let validator_store: Arc<dyn KeyStore> = Arc::new(SqliteKeyStore::open(&path, None).unwrap());
    let validator = KeyManager::validator(validator_store, quiet_config())
        .await
        .unwrap();
    assert_eq!(validator.decrypt(&token).unwrap(), b"shared");

    // A restarted issuer resumes the stored window instead of generating anew
    issuer.shutdown().await;
    drop(issuer);
    let reopened: Arc<dyn KeyStore> = Arc::new(SqliteKeyStore::open(&path, None).unwrap());
    let restarted = KeyManager::issuer(reopened, quiet_config()).await.unwrap();
    assert_eq!(restarted.decrypt(&token).unwrap(), b"shared");
    restarted.shutdown().await;
}

#[tokio::test]
async fn remote_store_fetches_with_bearer_token() {
    common::setup();
    let keys = vec![entry("old", 10), entry("new", 60)];
    let server = StubServer::start(200, render_key_descriptors(&keys).unwrap()).await;

    let store = RemoteKeyStore::new(&server.url, "secret-token", Duration::from_secs(60)).unwrap();
    let fetched = store.get_all_keys().await.unwrap();

    assert_eq!(labels(&fetched), ["old", "new"]);
    assert_eq!(fetched[1].key.expose_secret(), keys[1].key.expose_secret());

    let request = server.last_request().unwrap().to_ascii_lowercase();
    assert!(request.starts_with("get /keys"));
    assert!(request.contains("authorization: bearer secret-token"));
}

#[tokio::test]
async fn remote_store_serves_cache_within_ttl() {
    let server = StubServer::start(200, render_key_descriptors(&[entry("k1", 60)]).unwrap()).await;
    let store = RemoteKeyStore::new(&server.url, "key", Duration::from_secs(60)).unwrap();

    store.get_all_keys().await.unwrap();
    store.get_all_keys().await.unwrap();
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn remote_store_refetches_after_ttl() {
    let server = StubServer::start(200, render_key_descriptors(&[entry("k1", 60)]).unwrap()).await;
    let store = RemoteKeyStore::new(&server.url, "key", Duration::from_millis(100)).unwrap();

    store.get_all_keys().await.unwrap();
    server.set_response(
        200,
        render_key_descriptors(&[entry("k1", 60), entry("k2", 120)]).unwrap(),
    );
    tokio::time::sleep(Duration::from_millis(250)).await;

    let keys = store.get_all_keys().await.unwrap();
    assert_eq!(server.hits(), 2);
    assert_eq!(labels(&keys), ["k1", "k2"]);
}

#[tokio::test]
async fn remote_store_reports_error_status() {
    let server = StubServer::start(401, "unauthorized").await;
    let store = RemoteKeyStore::new(&server.url, "wrong", Duration::from_secs(60)).unwrap();

    match store.get_all_keys().await {
        Err(KeyringError::RemoteFetch(RemoteFetchError::Status { status, body })) => {
            assert_eq!(status, 401);
            assert_eq!(body, "unauthorized");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn remote_store_rejects_bad_descriptors() {
    let server = StubServer::start(200, r#"[{"key":"AAAA","info":"","expiry":0}]"#).await;
    let store = RemoteKeyStore::new(&server.url, "key", Duration::from_secs(60)).unwrap();

    assert!(matches!(
        store.get_all_keys().await,
        Err(KeyringError::RemoteFetch(RemoteFetchError::Decode(_)))
    ));
}

#[tokio::test]
async fn remote_store_is_read_only() {
    let server = StubServer::start(200, "[]").await;
    let store = RemoteKeyStore::new(&server.url, "key", Duration::from_secs(60)).unwrap();

    assert!(matches!(
        store.save_key(&entry("k1", 10)).await,
        Err(KeyringError::Store(StoreError::Unsupported(_)))
    ));
    assert_eq!(server.hits(), 0);
}

#[tokio::test]
async fn validator_over_remote_store_opens_issuer_tokens() {
    common::setup();
    let local: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new());
    let issuer = KeyManager::issuer(local, quiet_config()).await.unwrap();
    let token = issuer
        .issue(br#"{"sub":"u1"}"#, &IssueOptions::default())
        .await
        .unwrap();

    let published = serde_json::to_string(&issuer.published_keys()).unwrap();
    let server = StubServer::start(200, published).await;
    let remote: Arc<dyn KeyStore> =
        Arc::new(RemoteKeyStore::new(&server.url, "key", Duration::from_secs(60)).unwrap());

    let validator = KeyManager::validator(remote, quiet_config()).await.unwrap();
    assert_eq!(validator.decrypt(&token).unwrap(), br#"{"sub":"u1"}"#);
    issuer.shutdown().await;
}

#[test]
fn exported_key_file_reads_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("keys.json");
    let keys = vec![
        entry("encryption-key-new", 60),
        entry("encryption-key-old", 30),
    ];

    export_to_json(&path, &keys).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let descriptors: Vec<KeyDescriptor> = serde_json::from_str(&text).unwrap();
    let back: Vec<KeyEntry> = descriptors
        .into_iter()
        .map(|descriptor| descriptor.into_entry().unwrap())
        .collect();

    assert_eq!(labels(&back), labels(&keys));
    for (read, written) in back.iter().zip(&keys) {
        assert_eq!(read.fingerprint(), written.fingerprint());
        assert_eq!(read.expiry, written.expiry);
    }
}

#[test]
fn export_into_missing_directory_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent").join("keys.json");

    assert!(matches!(
        export_to_json(&path, &[entry("encryption-key-a", 10)]),
        Err(KeyringError::Store(StoreError::Io(_)))
    ));
}

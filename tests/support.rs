// tests/support.rs
//! Test fixtures: managers over shared stores and a stub key-publishing server

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use envelope_keyring::{KeyManager, KeyManagerConfig, KeyStore, MemoryKeyStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Rotation far enough out that the scheduler never fires during a test
pub fn quiet_config() -> KeyManagerConfig {
    KeyManagerConfig::default().with_rotation_period(Duration::from_secs(3600))
}

pub fn memory_store() -> Arc<dyn KeyStore> {
    Arc::new(MemoryKeyStore::new())
}

pub async fn issuer(store: &Arc<dyn KeyStore>) -> KeyManager {
    KeyManager::issuer(Arc::clone(store), quiet_config())
        .await
        .expect("issuer should start")
}

pub async fn validator(store: &Arc<dyn KeyStore>) -> KeyManager {
    KeyManager::validator(Arc::clone(store), quiet_config())
        .await
        .expect("validator should start")
}

struct StubState {
    status: u16,
    body: String,
    requests: Vec<String>,
}

/// Minimal HTTP/1.1 server answering every request with one canned response
pub struct StubServer {
    pub url: String,
    state: Arc<Mutex<StubState>>,
    handle: JoinHandle<()>,
}

impl StubServer {
    pub async fn start(status: u16, body: impl Into<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub server");
        let addr = listener.local_addr().expect("stub server address");
        let state = Arc::new(Mutex::new(StubState {
            status,
            body: body.into(),
            requests: Vec::new(),
        }));

        let shared = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            request.extend_from_slice(&buf[..n]);
                            if request.windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                    }
                }

                let (status, body) = {
                    let mut state = shared.lock().unwrap();
                    state
                        .requests
                        .push(String::from_utf8_lossy(&request).into_owned());
                    (state.status, state.body.clone())
                };

                let response = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            url: format!("http://{addr}/keys"),
            state,
            handle,
        }
    }

    pub fn set_response(&self, status: u16, body: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.status = status;
        state.body = body.into();
    }

    pub fn hits(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    pub fn last_request(&self) -> Option<String> {
        self.state.lock().unwrap().requests.last().cloned()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

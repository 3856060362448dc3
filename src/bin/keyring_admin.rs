// src/bin/keyring_admin.rs
//! Key store administration: inspect, rotate and publish keys, issue and open
//! tokens against the configured store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use envelope_keyring::config::{self, Config};
use envelope_keyring::export::export_to_json;
use envelope_keyring::{IssueOptions, KeyManager, TokenService};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "keyring_admin", version, about = "Manage envelope-keyring key stores")]
struct Cli {
    /// Config file (defaults to $EKR_CONFIG, then keyring.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show fingerprints, labels and expiry of the stored key window
    List,
    /// Generate and persist a new current key
    Rotate,
    /// Print the key-publishing JSON (contains raw key material)
    Publish {
        /// Write to this file instead of stdout
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
    /// Issue a token for a JSON payload
    Issue {
        payload: String,
        /// Token lifetime in seconds
        #[arg(long)]
        ttl: Option<u64>,
        /// Extra header as NAME=VALUE; repeatable
        #[arg(long = "header", value_name = "NAME=VALUE")]
        headers: Vec<String>,
    },
    /// Open a token and print its header and payload
    Decrypt { token: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    }
    .context("Failed to load configuration")?;

    match cli.command {
        Command::List => list(&config).await,
        Command::Rotate => rotate(&config).await,
        Command::Publish { out } => publish(&config, out.as_deref()).await,
        Command::Issue {
            payload,
            ttl,
            headers,
        } => issue(&config, &payload, ttl, &headers).await,
        Command::Decrypt { token } => decrypt(&config, &token).await,
    }
}

async fn list(config: &Config) -> Result<()> {
    let store = config.open_store().context("Failed to open key store")?;
    let keys = store.get_all_keys().await.context("Failed to read keys")?;
    if keys.is_empty() {
        println!("No keys stored");
        return Ok(());
    }

    let now = Utc::now();
    for (i, key) in keys.iter().rev().enumerate() {
        let role = if i == 0 { "current" } else { "history" };
        let state = if key.is_expired_at(now) { " (expired)" } else { "" };
        println!(
            "{role:<8} {}  {}  expires {}{state}",
            key.fingerprint(),
            key.label(),
            key.expiry.to_rfc3339()
        );
    }
    Ok(())
}

async fn rotate(config: &Config) -> Result<()> {
    let store = config.open_store().context("Failed to open key store")?;
    let manager = KeyManager::issuer(store, config.manager_config())
        .await
        .context("Failed to start issuer")?;

    let result = manager.rotate_key().await.context("Rotation failed");
    manager.shutdown().await;
    result?;

    let ring = manager.key_ring();
    info!(
        current = %ring.current().fingerprint(),
        expiry = %ring.current().expiry,
        "Rotation complete"
    );
    Ok(())
}

async fn publish(config: &Config, out: Option<&Path>) -> Result<()> {
    let store = config.open_store().context("Failed to open key store")?;
    let manager = KeyManager::validator(store, config.manager_config())
        .await
        .context("Failed to load keys")?;

    match out {
        Some(path) => {
            export_to_json(path, &manager.current_keys())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Key window exported");
        }
        None => println!("{}", serde_json::to_string_pretty(&manager.published_keys())?),
    }
    Ok(())
}

async fn issue(config: &Config, payload: &str, ttl: Option<u64>, headers: &[String]) -> Result<()> {
    let claims: Value = serde_json::from_str(payload).context("Payload must be valid JSON")?;

    let mut options = IssueOptions::new();
    if let Some(secs) = ttl {
        options = options.expires_in(Duration::from_secs(secs));
    }
    for header in headers {
        let Some((name, value)) = header.split_once('=') else {
            bail!("Header `{header}` must be NAME=VALUE");
        };
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::from(value));
        options = options.header(name, value);
    }

    let store = config.open_store().context("Failed to open key store")?;
    let manager = Arc::new(
        KeyManager::issuer(store, config.manager_config())
            .await
            .context("Failed to start issuer")?,
    );
    let tokens = TokenService::new(Arc::clone(&manager));

    let result = tokens.issue_with(&claims, &options).await;
    manager.shutdown().await;
    println!("{}", result.context("Failed to issue token")?);
    Ok(())
}

async fn decrypt(config: &Config, token: &str) -> Result<()> {
    let store = config.open_store().context("Failed to open key store")?;
    let manager = KeyManager::validator(store, config.manager_config())
        .await
        .context("Failed to load keys")?;

    let (header, payload) = manager
        .decrypt_with_header(token)
        .context("Failed to open token")?;

    println!("kid:    {}", String::from_utf8_lossy(&header.kid));
    println!("iat:    {}", header.issued_at.to_rfc3339());
    match header.expires_at {
        Some(exp) => println!("exp:    {}", exp.to_rfc3339()),
        None => println!("exp:    never"),
    }
    for (name, value) in &header.custom {
        println!("{name}: {value}");
    }
    match serde_json::from_slice::<Value>(&payload) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", String::from_utf8_lossy(&payload)),
    }
    Ok(())
}

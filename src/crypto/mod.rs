// src/crypto/mod.rs
//! Pure cryptographic operations. No I/O and no key store.
//!
//! A token is sealed with a one-time subkey: HKDF-SHA256 over the master key,
//! a fresh random salt and the master key's label. The subkey drives
//! AES-256-GCM with the encoded header as associated data.
//!
//! ```text
//! master key ──┐
//! salt (32B) ──┼─ HKDF-SHA256 ─> subkey ─ AES-256-GCM(aad = header) ─> token
//! key label ───┘
//! ```
mod decrypt;
mod derive;
mod encrypt;
mod envelope;

pub use decrypt::{check_expiry, open, open_with};
pub use derive::{derive_subkey, generate_salt};
pub use encrypt::seal;
pub use envelope::{Envelope, TokenHeader};

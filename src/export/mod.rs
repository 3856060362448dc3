// src/export/mod.rs
//! Key publishing for validators in other processes
//!
//! Everything exported here is raw key material. Serve it only to trusted
//! validators over an authenticated channel.

pub use json::{export_to_json, render_key_descriptors, KeyDescriptor};

pub mod json;

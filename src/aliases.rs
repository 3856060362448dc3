// src/aliases.rs
//! Fixed-size secret types
//!
//! These are the canonical key types used throughout envelope-keyring.
//! Every one of them zeroizes on drop and redacts itself in `Debug` output.

use std::fmt;

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::consts::KEY_LEN;

macro_rules! fixed_secret {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Zeroize, ZeroizeOnDrop)]
        pub struct $name([u8; $len]);

        impl $name {
            pub fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Fill from the thread-local CSPRNG
            pub fn random() -> Self {
                let mut bytes = [0u8; $len];
                rand::rng().fill_bytes(&mut bytes);
                Self(bytes)
            }

            /// `None` unless `bytes` is exactly the right length
            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                <[u8; $len]>::try_from(bytes).ok().map(Self)
            }

            pub fn expose_secret(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "([REDACTED])"))
            }
        }
    };
}

fixed_secret!(
    /// 256-bit master key of one key generation
    MasterKey32,
    KEY_LEN
);

fixed_secret!(
    /// One-time AES-256-GCM key derived for a single token
    DerivedKey32,
    KEY_LEN
);

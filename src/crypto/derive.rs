// src/crypto/derive.rs
//! Per-token subkey derivation using HKDF

use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::aliases::{DerivedKey32, MasterKey32};
use crate::consts::{KEY_LEN, SALT_LEN};

/// Fresh random salt from the thread-local CSPRNG.
///
/// Salts are only ever produced here, inside the seal path, so two tokens never
/// share a subkey even under the same master key.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}

/// Derive the 32-byte subkey for one token: HKDF-SHA256(salt, master, info).
pub fn derive_subkey(master: &MasterKey32, salt: &[u8; SALT_LEN], info: &[u8]) -> DerivedKey32 {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), master.expose_secret());

    let mut okm = Zeroizing::new([0u8; KEY_LEN]);
    let Ok(()) = hkdf.expand(info, &mut *okm) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    DerivedKey32::new(*okm)
}

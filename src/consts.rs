// src/consts.rs
//! Shared constants: security parameters and defaults

/// Master and derived key length (AES-256)
pub const KEY_LEN: usize = 32;

/// Per-token HKDF salt length
pub const SALT_LEN: usize = 32;

/// AES-GCM nonce length (96-bit)
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length
pub const TAG_LEN: usize = 16;

/// Historical keys kept next to the current key (3 keys in total)
pub const DEFAULT_RETENTION: usize = 2;

/// Rotate at startup when less than this fraction of the period remains
pub const DEFAULT_ROTATION_THRESHOLD: f64 = 0.1;

/// Default rotation period: one day
pub const DEFAULT_ROTATION_PERIOD_SECS: u64 = 24 * 60 * 60;

/// Default lifetime of issued tokens: one hour
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 60 * 60;

/// Remote key cache lifetime
pub const DEFAULT_CACHE_TTL_SECS: u64 = 5 * 60;

/// Remote key fetch timeout
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;

/// Prefix of generated key labels (`encryption-key-<unix millis>`)
pub const KEY_LABEL_PREFIX: &str = "encryption-key-";

/// Envelope header values
pub const HEADER_ALG: &str = "dir";
pub const HEADER_ENC: &str = "A256GCM";

/// Header names callers may not set through extra headers
pub const RESERVED_HEADERS: [&str; 6] = ["alg", "enc", "salt", "kid", "iat", "exp"];

/// Recommended KDF iterations for SQLCipher key databases
pub const DB_KDF_ITERATIONS: u32 = 256_000;

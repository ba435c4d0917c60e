//! # wow-keystore
//!
//! Persistent, encrypted HMAC key management (Section 4.2 of the design).
//!
//! Produces the raw 32-byte key used to sign challenges, and exposes both
//! the current and immediately-previous key so in-flight challenges survive
//! a rotation. Two persistence backends share the same wrapping/encryption
//! logic: [`sqlite`] (primary) and [`file`] (the documented migration
//! fallback when a database is unavailable).
//!
//! ## Modules
//!
//! - [`crypto`] — wrapping-key derivation (PBKDF2) and at-rest AES-GCM envelope
//! - [`sqlite`] — SQLite-backed `KeyStore`
//! - [`file`] — file-backed `KeyStore` with identical semantics

pub mod crypto;
pub mod file;
pub mod sqlite;

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Length of the raw HMAC signing key, in bytes.
pub const RAW_KEY_LEN: usize = 32;

/// A persisted key record (Section 3 of the design).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyRecord {
    pub version: u32,
    /// `base64(nonce || ciphertext || tag)` of the raw key.
    pub ciphertext: String,
    /// The ciphertext of the key this record superseded, if any.
    pub previous_ciphertext: Option<String>,
    pub is_active: bool,
    pub created_at: u64,
    pub rotated_at: u64,
}

/// Errors from key store operations.
///
/// `Decrypt`, `MultipleActiveRecords`, and `Config` are fatal at startup
/// (Section 7 of the design); at runtime, callers log and continue with the
/// currently-loaded in-memory keys rather than propagating.
#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("(de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("failed to decrypt key record (version {version})")]
    Decrypt { version: u32 },

    #[error("more than one active key record found")]
    MultipleActiveRecords,

    #[error("no active key record found")]
    NoActiveRecord,

    #[error("master secret must be at least 32 characters")]
    MasterSecretTooShort,
}

pub type Result<T> = std::result::Result<T, KeyStoreError>;

/// In-memory view of the currently-active and immediately-previous keys.
#[derive(Clone)]
pub(crate) struct KeyCache {
    pub current_version: u32,
    pub current_key: [u8; RAW_KEY_LEN],
    pub previous_key: Option<[u8; RAW_KEY_LEN]>,
    pub rotated_at: std::time::SystemTime,
}

/// The abstraction the rest of the system depends on (Section 4.2 and
/// Section 9 of the design: `KeyStore` is one of the two true interfaces,
/// the other being `BehaviorStore`).
pub trait KeyStore: Send + Sync {
    /// The active signing key.
    fn current_key(&self) -> [u8; RAW_KEY_LEN];

    /// `(current_version, current_key, previous_key)` — used by verification,
    /// which must accept either key during the post-rotation grace window.
    fn both_keys(&self) -> (u32, [u8; RAW_KEY_LEN], Option<[u8; RAW_KEY_LEN]>);

    /// Generate a new key, atomically superseding the current one.
    fn rotate(&self) -> Result<()>;

    /// How long the current key has been active.
    fn age(&self) -> Duration;
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

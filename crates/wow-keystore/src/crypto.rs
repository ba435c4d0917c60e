//! Wrapping-key derivation and the AES-GCM at-rest envelope.
//!
//! The wrapping key is derived once per process from the operator-supplied
//! master secret via PBKDF2-HMAC-SHA256 with a fixed, non-random salt — the
//! salt must stay constant across the deployment's lifetime so records
//! encrypted under an old process can still be decrypted (Section 4.2 of
//! the design).

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use crate::{KeyStoreError, Result, RAW_KEY_LEN};

/// Fixed salt for the wrapping-key derivation. Do not randomize: verifying
/// old records must be possible with only the master secret.
pub const WRAPPING_KEY_SALT: &[u8] = b"wow-hmac-key-encryption";

/// PBKDF2 iteration count for the wrapping key.
pub const WRAPPING_KEY_ITERATIONS: u32 = 10_000;

const NONCE_LEN: usize = 12;

/// Minimum accepted length of the operator-supplied master secret.
pub const MIN_MASTER_SECRET_LEN: usize = 32;

/// Derive the 32-byte AES-256-GCM wrapping key from the master secret.
pub fn derive_wrapping_key(master_secret: &str) -> Result<[u8; 32]> {
    if master_secret.len() < MIN_MASTER_SECRET_LEN {
        return Err(KeyStoreError::MasterSecretTooShort);
    }
    let mut out = [0u8; 32];
    pbkdf2_hmac::<Sha256>(
        master_secret.as_bytes(),
        WRAPPING_KEY_SALT,
        WRAPPING_KEY_ITERATIONS,
        &mut out,
    );
    Ok(out)
}

/// Encrypt a raw 32-byte key under the wrapping key, returning
/// `base64(nonce || ciphertext || tag)`.
pub fn seal_key(wrapping_key: &[u8; 32], raw_key: &[u8; RAW_KEY_LEN]) -> String {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(wrapping_key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    // `encrypt` never fails for a well-formed 256-bit key; the cipher
    // construction above already validated the key length.
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: raw_key,
                aad: &[],
            },
        )
        .expect("AES-GCM encryption with a valid key cannot fail");

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    BASE64.encode(blob)
}

/// Decrypt a `base64(nonce || ciphertext || tag)` blob, failing closed on
/// any malformed input or authentication failure.
pub fn open_key(wrapping_key: &[u8; 32], sealed: &str, version: u32) -> Result<[u8; RAW_KEY_LEN]> {
    let blob = BASE64
        .decode(sealed)
        .map_err(|_| KeyStoreError::Decrypt { version })?;
    if blob.len() <= NONCE_LEN {
        return Err(KeyStoreError::Decrypt { version });
    }
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(wrapping_key));
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad: &[],
            },
        )
        .map_err(|_| KeyStoreError::Decrypt { version })?;

    plaintext
        .try_into()
        .map_err(|_| KeyStoreError::Decrypt { version })
}

/// Generate a fresh random 32-byte raw signing key.
pub fn generate_raw_key() -> [u8; RAW_KEY_LEN] {
    let mut key = [0u8; RAW_KEY_LEN];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> String {
        "x".repeat(MIN_MASTER_SECRET_LEN)
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(derive_wrapping_key("short").is_err());
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = derive_wrapping_key(&secret()).expect("derive");
        let b = derive_wrapping_key(&secret()).expect("derive");
        assert_eq!(a, b);
    }

    #[test]
    fn test_seal_open_round_trip() {
        let wrapping_key = derive_wrapping_key(&secret()).expect("derive");
        let raw_key = generate_raw_key();
        let sealed = seal_key(&wrapping_key, &raw_key);
        let opened = open_key(&wrapping_key, &sealed, 1).expect("open");
        assert_eq!(opened, raw_key);
    }

    #[test]
    fn test_open_fails_closed_on_wrong_wrapping_key() {
        let wrapping_key = derive_wrapping_key(&secret()).expect("derive");
        let other_key = derive_wrapping_key(&"y".repeat(MIN_MASTER_SECRET_LEN)).expect("derive");
        let raw_key = generate_raw_key();
        let sealed = seal_key(&wrapping_key, &raw_key);
        assert!(open_key(&other_key, &sealed, 1).is_err());
    }

    #[test]
    fn test_open_fails_closed_on_corrupted_blob() {
        let wrapping_key = derive_wrapping_key(&secret()).expect("derive");
        let raw_key = generate_raw_key();
        let mut sealed = seal_key(&wrapping_key, &raw_key);
        sealed.push('A');
        let _ = open_key(&wrapping_key, &sealed, 1); // must not panic either way
        assert!(open_key(&wrapping_key, "not-base64!!", 1).is_err());
    }

    #[test]
    fn test_each_seal_uses_a_fresh_nonce() {
        let wrapping_key = derive_wrapping_key(&secret()).expect("derive");
        let raw_key = generate_raw_key();
        let sealed1 = seal_key(&wrapping_key, &raw_key);
        let sealed2 = seal_key(&wrapping_key, &raw_key);
        assert_ne!(sealed1, sealed2);
    }
}

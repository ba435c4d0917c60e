//! # wow-challenge
//!
//! The signed, time-bounded challenge envelope (Section 4.3 of the design)
//! and its two wire codecs (Section 4.4).
//!
//! ## Modules
//!
//! - [`codec`] — JSON and fixed-binary encode/decode
//! - [`frame`] — length-prefixed framing over an async stream

pub mod codec;
pub mod frame;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use wow_keystore::KeyStore;
use wow_pow::argon2id::Argon2Params;
use wow_pow::Algorithm;

type HmacSha256 = Hmac<Sha256>;

/// Current challenge format version.
pub const CURRENT_VERSION: u8 = 1;

/// Challenge lifetime: 5 minutes, in microseconds.
pub const CHALLENGE_LIFETIME_US: u64 = 5 * 60 * 1_000_000;

/// Forward clock-skew tolerance at verification, in microseconds.
pub const SKEW_FORWARD_US: u64 = 60 * 1_000_000;

/// Backward clock-skew tolerance at verification, in microseconds.
pub const SKEW_BACKWARD_US: u64 = 10 * 60 * 1_000_000;

/// Length of the random seed, in bytes.
pub const SEED_LEN: usize = 16;

/// Length of the per-challenge nonce salt, in bytes.
pub const NONCE_SALT_LEN: usize = 8;

/// Maximum length of a submitted solution nonce, in bytes.
pub const MAX_NONCE_LEN: usize = 64;

/// The signed envelope sent to clients (Section 3 of the design).
///
/// `client_id` is carried for human-debuggable (JSON) rendering only — it is
/// **not** part of the HMAC input or the fixed binary wire layout (which has
/// no room for a variable-length field). The client_id binding instead comes
/// from the `Solution` the client submits alongside the nonce, matched
/// against the `client_id` the connection handler assigned at accept time.
/// See DESIGN.md for why this resolves the ambiguity between Section 3's
/// field list and Section 4.4's fixed binary table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Challenge {
    pub version: u8,
    pub algorithm: Algorithm,
    pub difficulty: u8,
    pub seed: [u8; SEED_LEN],
    pub nonce_salt: [u8; NONCE_SALT_LEN],
    pub client_id: String,
    pub issued_at: u64,
    pub expires_at: u64,
    pub argon2_params: Option<Argon2Params>,
    pub signature: [u8; 32],
}

/// The client's submission (Section 3 of the design).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Solution {
    pub challenge: Challenge,
    pub nonce: String,
    pub client_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    #[error("invalid difficulty {0}")]
    InvalidDifficulty(u8),

    #[error("unrecognized algorithm version {0}")]
    InvalidVersion(u8),

    #[error("argon2 params missing for argon2id challenge")]
    MissingArgon2Params,

    #[error("challenge has expired")]
    Expired,

    #[error("issued_at is too far in the future")]
    ClockSkewFuture,

    #[error("issued_at is too far in the past")]
    ClockSkewPast,

    #[error("signature does not verify under the current or previous key")]
    SignatureMismatch,

    #[error("nonce exceeds {MAX_NONCE_LEN} bytes")]
    NonceTooLong,

    #[error("codec error: {0}")]
    Codec(String),

    #[error("framed payload exceeds the 10 KiB limit")]
    FrameTooLarge,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChallengeError>;

fn now_micros() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// Build the canonical HMAC input: the fields in binary-layout order,
/// excluding `client_id` and `signature` (Section 4.3 step 5, Section 4.4).
/// Both codecs route signing and verification through this single function,
/// guaranteeing byte-identical signatures regardless of wire format.
pub fn canonical_bytes(c: &Challenge) -> Vec<u8> {
    let mut buf = Vec::with_capacity(43 + 10);
    buf.push(c.version);
    buf.push(match c.algorithm {
        Algorithm::Sha256 => 0x01,
        Algorithm::Argon2id => 0x02,
    });
    buf.push(c.difficulty);
    buf.extend_from_slice(&c.issued_at.to_be_bytes());
    buf.extend_from_slice(&c.expires_at.to_be_bytes());
    buf.extend_from_slice(&c.seed);
    buf.extend_from_slice(&c.nonce_salt);
    if let Some(params) = &c.argon2_params {
        buf.extend_from_slice(&params.t.to_be_bytes());
        buf.extend_from_slice(&params.m_kib.to_be_bytes());
        buf.push(params.p as u8);
        buf.push(params.key_len as u8);
    }
    buf
}

fn hmac_sign(key: &[u8; 32], bytes: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(bytes);
    let result = mac.finalize().into_bytes();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

fn hmac_verify(key: &[u8; 32], bytes: &[u8], signature: &[u8; 32]) -> bool {
    let expected = hmac_sign(key, bytes);
    expected.ct_eq(signature).into()
}

/// Generate a fresh, signed challenge (Section 4.3 steps 1-6).
pub fn generate(
    difficulty: u8,
    algorithm: Algorithm,
    client_id: &str,
    key_store: &dyn KeyStore,
) -> Result<Challenge> {
    wow_pow::validate_difficulty(difficulty).map_err(|_| ChallengeError::InvalidDifficulty(difficulty))?;

    let mut seed = [0u8; SEED_LEN];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut seed);
    let mut nonce_salt = [0u8; NONCE_SALT_LEN];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut nonce_salt);

    let issued_at = now_micros();
    let expires_at = issued_at + CHALLENGE_LIFETIME_US;

    let argon2_params = match algorithm {
        Algorithm::Argon2id => Some(
            wow_pow::argon2id::params_for_difficulty(difficulty)
                .map_err(|_| ChallengeError::InvalidDifficulty(difficulty))?,
        ),
        Algorithm::Sha256 => None,
    };

    let mut challenge = Challenge {
        version: CURRENT_VERSION,
        algorithm,
        difficulty,
        seed,
        nonce_salt,
        client_id: client_id.to_string(),
        issued_at,
        expires_at,
        argon2_params,
        signature: [0u8; 32],
    };

    let key = key_store.current_key();
    challenge.signature = hmac_sign(&key, &canonical_bytes(&challenge));

    Ok(challenge)
}

/// Verify a challenge's format, expiry, and signature (Section 4.3 steps 1-3).
pub fn verify(challenge: &Challenge, key_store: &dyn KeyStore) -> Result<()> {
    if challenge.version != CURRENT_VERSION {
        return Err(ChallengeError::InvalidVersion(challenge.version));
    }
    wow_pow::validate_difficulty(challenge.difficulty)
        .map_err(|_| ChallengeError::InvalidDifficulty(challenge.difficulty))?;
    if matches!(challenge.algorithm, Algorithm::Argon2id) && challenge.argon2_params.is_none() {
        return Err(ChallengeError::MissingArgon2Params);
    }

    let now = now_micros();
    if now >= challenge.expires_at {
        return Err(ChallengeError::Expired);
    }
    if challenge.issued_at > now + SKEW_FORWARD_US {
        return Err(ChallengeError::ClockSkewFuture);
    }
    if challenge.issued_at < now.saturating_sub(SKEW_BACKWARD_US) {
        return Err(ChallengeError::ClockSkewPast);
    }

    let bytes = canonical_bytes(challenge);
    let (_, current_key, previous_key) = key_store.both_keys();

    if hmac_verify(&current_key, &bytes, &challenge.signature) {
        return Ok(());
    }
    if let Some(previous_key) = previous_key {
        if hmac_verify(&previous_key, &bytes, &challenge.signature) {
            return Ok(());
        }
    }
    Err(ChallengeError::SignatureMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wow_keystore::sqlite::SqliteKeyStore;

    fn secret() -> String {
        "x".repeat(wow_keystore::crypto::MIN_MASTER_SECRET_LEN)
    }

    #[test]
    fn test_generate_then_verify_succeeds() {
        let store = SqliteKeyStore::open_memory(&secret()).expect("open");
        let challenge = generate(2, Algorithm::Sha256, "client-1", &store).expect("generate");
        assert!(verify(&challenge, &store).is_ok());
    }

    #[test]
    fn test_tampering_difficulty_flips_verification() {
        let store = SqliteKeyStore::open_memory(&secret()).expect("open");
        let mut challenge = generate(2, Algorithm::Sha256, "client-1", &store).expect("generate");
        challenge.difficulty = 1;
        assert!(verify(&challenge, &store).is_err());
    }

    #[test]
    fn test_tampering_signature_flips_verification() {
        let store = SqliteKeyStore::open_memory(&secret()).expect("open");
        let mut challenge = generate(2, Algorithm::Sha256, "client-1", &store).expect("generate");
        challenge.signature[0] ^= 0xFF;
        assert!(verify(&challenge, &store).is_err());
    }

    #[test]
    fn test_expired_challenge_rejected_regardless_of_signature() {
        let store = SqliteKeyStore::open_memory(&secret()).expect("open");
        let mut challenge = generate(2, Algorithm::Sha256, "client-1", &store).expect("generate");
        challenge.issued_at -= CHALLENGE_LIFETIME_US + 2 * 1_000_000;
        challenge.expires_at -= CHALLENGE_LIFETIME_US + 2 * 1_000_000;
        // Re-sign so the signature is valid — expiry must still reject it.
        let key = store.current_key();
        challenge.signature = hmac_sign(&key, &canonical_bytes(&challenge));
        assert!(matches!(verify(&challenge, &store), Err(ChallengeError::Expired)));
    }

    #[test]
    fn test_rotation_keeps_previous_key_valid_until_next_rotation() {
        let store = SqliteKeyStore::open_memory(&secret()).expect("open");
        let challenge = generate(1, Algorithm::Sha256, "client-1", &store).expect("generate");

        store.rotate().expect("rotate once");
        assert!(verify(&challenge, &store).is_ok(), "previous key must still verify");

        store.rotate().expect("rotate twice");
        assert!(verify(&challenge, &store).is_err(), "original key must now be out of the window");
    }

    #[test]
    fn test_argon2id_challenge_carries_params() {
        let store = SqliteKeyStore::open_memory(&secret()).expect("open");
        let challenge = generate(3, Algorithm::Argon2id, "client-2", &store).expect("generate");
        assert!(challenge.argon2_params.is_some());
        assert!(verify(&challenge, &store).is_ok());
    }
}

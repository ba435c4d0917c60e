//! # wow-pow
//!
//! Proof-of-Work primitives for the World of Wisdom quote server.
//!
//! Two interchangeable algorithms guard the admission handshake: a
//! lightweight SHA-256 search for everyday clients, and a memory-hard
//! Argon2id search whose verification cost is itself an admission price on
//! the server (Section 2.1 of the design — memory-hardness is the point).
//!
//! ## Modules
//!
//! - [`sha256`] — SHA-256 leading-zero-hex-char search
//! - [`argon2id`] — Argon2id leading-zero-hex-char search, difficulty-scaled params

pub mod argon2id;
pub mod sha256;

use serde::{Deserialize, Serialize};

/// The two supported PoW algorithms, tagged by variant rather than a trait
/// object — dispatch on the tag, not an interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    Sha256,
    Argon2id,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Argon2id => "argon2id",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sha256" => Some(Algorithm::Sha256),
            "argon2id" => Some(Algorithm::Argon2id),
            _ => None,
        }
    }
}

/// Lowest and highest valid difficulty levels (Section 3 of the design).
pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 6;

/// Error types for Proof-of-Work operations.
#[derive(Debug, thiserror::Error)]
pub enum PowError {
    /// The underlying Argon2id computation failed.
    #[error("argon2id computation failed: {0}")]
    Argon2(String),

    /// The proof did not meet the required difficulty target.
    #[error("proof does not meet difficulty target (need {required} leading zero hex chars, got {actual})")]
    InsufficientDifficulty { required: u8, actual: u8 },

    /// Difficulty outside [MIN_DIFFICULTY, MAX_DIFFICULTY].
    #[error("invalid difficulty {0}, must be in [1,6]")]
    InvalidDifficulty(u8),

    /// The nonce search exhausted its attempt ceiling without success.
    #[error("proof-of-work search exhausted after {attempts} attempts")]
    SolveExhausted { attempts: u64 },
}

/// Convenience result type for PoW operations.
pub type Result<T> = std::result::Result<T, PowError>;

/// Count leading '0' hex characters in a hex-encoded digest.
///
/// A `difficulty` of N requires N leading zero hex characters, i.e.
/// `4*N` leading zero bits.
pub(crate) fn leading_zero_hex_chars(hex_digest: &str) -> u8 {
    hex_digest
        .chars()
        .take_while(|c| *c == '0')
        .count()
        .min(u8::MAX as usize) as u8
}

pub fn validate_difficulty(difficulty: u8) -> Result<()> {
    if (MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&difficulty) {
        Ok(())
    } else {
        Err(PowError::InvalidDifficulty(difficulty))
    }
}

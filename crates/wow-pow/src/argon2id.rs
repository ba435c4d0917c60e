//! Argon2id proof-of-work: the memory-hard admission puzzle.
//!
//! `H = Argon2id(seed_hex || nonce_ascii, salt=FIXED_SALT, t, m, p, key_len=32)`.
//! A solution is accepted iff `H`'s hex encoding starts with `difficulty`
//! '0' characters. Parameters scale with difficulty per [`params_for_difficulty`]
//! and, once chosen for a challenge, are carried in the challenge so both
//! sides agree deterministically.
//!
//! The design specifies `salt=∅`; the `argon2` crate's low-level API requires
//! a concrete salt buffer, so a fixed 16-byte constant stands in for the
//! empty salt (domain separation is carried entirely by `seed_hex`/`nonce`).

use argon2::{Algorithm as Argon2Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

use crate::{leading_zero_hex_chars, validate_difficulty, PowError, Result};

/// Stand-in for the design's `salt=∅`; see module docs.
const FIXED_SALT: &[u8; 16] = b"wow-argon2idpow!";

/// Output length in bytes for all Argon2id PoW hashes.
pub const OUTPUT_LEN: usize = 32;

/// Hard ceiling on nonce search attempts, scaled by difficulty
/// (Section 4.1 of the design).
pub fn max_attempts(difficulty: u8) -> u64 {
    1_000_000u64 * difficulty as u64
}

/// Argon2id parameters embedded in a challenge when `algorithm=argon2id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2Params {
    pub t: u32,
    pub m_kib: u32,
    pub p: u32,
    pub key_len: u32,
}

/// Indicative difficulty -> parameter table (Section 4.1 of the design).
/// An implementation MAY tune these but MUST be deterministic once embedded
/// in a challenge.
pub fn params_for_difficulty(difficulty: u8) -> Result<Argon2Params> {
    validate_difficulty(difficulty)?;
    let (t, m_kib, p) = match difficulty {
        1 => (1, 32 * 1024, 4),
        2 => (1, 64 * 1024, 4),
        3 => (2, 128 * 1024, 4),
        4 => (2, 256 * 1024, 4),
        5 => (3, 512 * 1024, 4),
        6 => (3, 1024 * 1024, 4),
        _ => unreachable!("validate_difficulty already bounded this"),
    };
    Ok(Argon2Params {
        t,
        m_kib,
        p,
        key_len: OUTPUT_LEN as u32,
    })
}

fn digest_hex(seed_hex: &str, nonce: &str, params: &Argon2Params) -> Result<String> {
    let mut data = Vec::with_capacity(seed_hex.len() + nonce.len());
    data.extend_from_slice(seed_hex.as_bytes());
    data.extend_from_slice(nonce.as_bytes());

    let argon2_params = Params::new(
        params.m_kib,
        params.t,
        params.p,
        Some(params.key_len as usize),
    )
    .map_err(|e| PowError::Argon2(e.to_string()))?;
    let argon2 = Argon2::new(Argon2Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut output = vec![0u8; params.key_len as usize];
    argon2
        .hash_password_into(&data, FIXED_SALT, &mut output)
        .map_err(|e| PowError::Argon2(e.to_string()))?;

    Ok(hex::encode(output))
}

/// Verify that `nonce` solves the challenge `(seed_hex, difficulty, params)`.
pub fn verify(seed_hex: &str, nonce: &str, difficulty: u8, params: &Argon2Params) -> bool {
    if validate_difficulty(difficulty).is_err() {
        return false;
    }
    match digest_hex(seed_hex, nonce, params) {
        Ok(hex) => leading_zero_hex_chars(&hex) >= difficulty,
        Err(_) => false,
    }
}

/// Search for the smallest nonce solving `(seed_hex, difficulty, params)`.
pub fn solve(seed_hex: &str, difficulty: u8, params: &Argon2Params) -> Result<u64> {
    validate_difficulty(difficulty)?;
    let ceiling = max_attempts(difficulty);
    for nonce in 0..ceiling {
        let candidate = nonce.to_string();
        let hex = digest_hex(seed_hex, &candidate, params)?;
        if leading_zero_hex_chars(&hex) >= difficulty {
            return Ok(nonce);
        }
    }
    Err(PowError::SolveExhausted { attempts: ceiling })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_params() -> Argon2Params {
        // Parameters deliberately far below the production table so unit
        // tests stay fast; production difficulty -> params comes from
        // `params_for_difficulty`.
        Argon2Params {
            t: 1,
            m_kib: 8 * 1024,
            p: 1,
            key_len: 32,
        }
    }

    #[test]
    fn test_params_table_difficulty_one() {
        let p = params_for_difficulty(1).expect("params");
        assert_eq!(p.t, 1);
        assert_eq!(p.m_kib, 32 * 1024);
        assert_eq!(p.p, 4);
        assert_eq!(p.key_len, 32);
    }

    #[test]
    fn test_params_table_difficulty_six() {
        let p = params_for_difficulty(6).expect("params");
        assert_eq!(p.t, 3);
        assert_eq!(p.m_kib, 1024 * 1024);
    }

    #[test]
    fn test_invalid_difficulty() {
        assert!(params_for_difficulty(0).is_err());
        assert!(params_for_difficulty(7).is_err());
    }

    #[test]
    fn test_solve_and_verify_round_trip() {
        let params = tiny_params();
        let seed_hex = "aabbcc";
        let nonce = solve(seed_hex, 1, &params).expect("solve");
        assert!(verify(seed_hex, &nonce.to_string(), 1, &params));
    }

    #[test]
    fn test_verify_rejects_tampered_params() {
        let params = tiny_params();
        let mut other = params;
        other.m_kib = params.m_kib * 2;
        let seed_hex = "aabbcc";
        let nonce = solve(seed_hex, 1, &params).expect("solve");
        // Different params produce a different hash; verification under the
        // mismatched params must fail.
        assert!(!verify(seed_hex, &nonce.to_string(), 1, &other));
    }

    #[test]
    fn test_deterministic_digest() {
        let params = tiny_params();
        let a = digest_hex("seed", "7", &params).expect("digest");
        let b = digest_hex("seed", "7", &params).expect("digest");
        assert_eq!(a, b);
    }
}

//! SHA-256 proof-of-work: the everyday-client admission puzzle.
//!
//! `H = SHA256(seed_hex || nonce_ascii)`. A solution is accepted iff `H`'s
//! hex encoding starts with `difficulty` '0' characters (`4*difficulty`
//! leading zero bits). Solving is a linear search over the integers
//! `0, 1, 2, ...`, capped at [`MAX_ATTEMPTS`] above which the search fails.

use sha2::{Digest, Sha256};

use crate::{leading_zero_hex_chars, validate_difficulty, PowError, Result};

/// Hard ceiling on nonce search attempts (Section 4.1 of the design).
pub const MAX_ATTEMPTS: u64 = 100_000_000;

fn digest_hex(seed_hex: &str, nonce: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed_hex.as_bytes());
    hasher.update(nonce.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify that `nonce` (its ASCII-decimal rendering) solves the challenge
/// `(seed_hex, difficulty)`.
pub fn verify(seed_hex: &str, nonce: &str, difficulty: u8) -> bool {
    if validate_difficulty(difficulty).is_err() {
        return false;
    }
    leading_zero_hex_chars(&digest_hex(seed_hex, nonce)) >= difficulty
}

/// Search for the smallest nonce solving `(seed_hex, difficulty)`.
pub fn solve(seed_hex: &str, difficulty: u8) -> Result<u64> {
    validate_difficulty(difficulty)?;
    for nonce in 0..MAX_ATTEMPTS {
        let candidate = nonce.to_string();
        if leading_zero_hex_chars(&digest_hex(seed_hex, &candidate)) >= difficulty {
            return Ok(nonce);
        }
    }
    Err(PowError::SolveExhausted {
        attempts: MAX_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_one_solves_quickly() {
        let seed_hex = "00112233445566778899aabbccddeeff";
        let nonce = solve(seed_hex, 1).expect("solve");
        assert!(verify(seed_hex, &nonce.to_string(), 1));
    }

    #[test]
    fn test_worked_example_difficulty_two() {
        // Literal seed from the design's end-to-end scenario 1.
        let seed_hex = "00112233445566778899aabbccddeeff";
        let nonce = solve(seed_hex, 2).expect("solve");
        let hex = digest_hex(seed_hex, &nonce.to_string());
        assert!(hex.starts_with("00"));
        assert!(verify(seed_hex, &nonce.to_string(), 2));
    }

    #[test]
    fn test_verify_rejects_wrong_nonce() {
        let seed_hex = "aabbccdd";
        let solved = solve(seed_hex, 1).expect("solve");
        let wrong = solved.wrapping_add(1).to_string();
        // Overwhelmingly likely the adjacent nonce does not also satisfy.
        assert!(!verify(seed_hex, &wrong, 6));
    }

    #[test]
    fn test_invalid_difficulty_rejected() {
        assert!(!verify("seed", "0", 0));
        assert!(!verify("seed", "0", 7));
        assert!(solve("seed", 0).is_err());
    }

    #[test]
    fn test_idempotent_verify() {
        let seed_hex = "deadbeef";
        let nonce = solve(seed_hex, 1).expect("solve");
        let n = nonce.to_string();
        assert_eq!(verify(seed_hex, &n, 1), verify(seed_hex, &n, 1));
    }
}

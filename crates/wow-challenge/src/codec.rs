//! Two wire formats for a [`Challenge`] (Section 4.4 of the design): a
//! human-debuggable JSON text form, and a fixed-layout binary form.
//!
//! Both formats decode back to an identical [`Challenge`] (`decode(encode(c,
//! fmt)) ≡ c`), and both derive their HMAC input from the single
//! [`canonical_bytes`] function, so a challenge signed and sent as JSON
//! verifies identically to one sent as binary.

use serde::{Deserialize, Serialize};

use wow_pow::argon2id::Argon2Params;
use wow_pow::Algorithm;

use crate::{
    Challenge, ChallengeError, Result, Solution, CURRENT_VERSION, NONCE_SALT_LEN, SEED_LEN,
};

/// Binary layout offsets (Section 4.4 table).
mod layout {
    pub const VERSION: usize = 0;
    pub const ALGORITHM: usize = 1;
    pub const DIFFICULTY: usize = 2;
    pub const ISSUED_AT: usize = 3;
    pub const EXPIRES_AT: usize = 11;
    pub const SEED: usize = 19;
    pub const NONCE_SALT: usize = 35;
    pub const SIGNATURE: usize = 43;
    pub const ARGON2_PARAMS: usize = 75;
    pub const SHA256_TOTAL_LEN: usize = 75;
    pub const ARGON2_TOTAL_LEN: usize = 85;
}

/// The wire format a challenge is encoded in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Json,
    Binary,
}

impl Format {
    pub fn tag(&self) -> u8 {
        match self {
            Format::Json => 1,
            Format::Binary => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Format::Json),
            2 => Some(Format::Binary),
            _ => None,
        }
    }
}

/// Encode a challenge in the given wire format.
pub fn encode(challenge: &Challenge, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => encode_json(challenge),
        Format::Binary => encode_binary(challenge),
    }
}

/// Decode a challenge from the given wire format.
pub fn decode(bytes: &[u8], format: Format) -> Result<Challenge> {
    match format {
        Format::Json => decode_json(bytes),
        Format::Binary => decode_binary(bytes),
    }
}

// --- JSON form -------------------------------------------------------------

/// On-wire JSON shape: byte fields rendered as lower-case hex, per Section
/// 4.4 ("Canonical order for signing ... lower-case hex encoding of byte
/// fields and stable numeric rendering").
#[derive(Serialize, Deserialize)]
struct JsonChallenge {
    version: u8,
    algorithm: String,
    difficulty: u8,
    seed: String,
    nonce_salt: String,
    client_id: String,
    issued_at: u64,
    expires_at: u64,
    argon2_params: Option<Argon2Params>,
    signature: String,
}

fn encode_json(c: &Challenge) -> Result<Vec<u8>> {
    let wire = JsonChallenge {
        version: c.version,
        algorithm: c.algorithm.as_str().to_string(),
        difficulty: c.difficulty,
        seed: hex::encode(c.seed),
        nonce_salt: hex::encode(c.nonce_salt),
        client_id: c.client_id.clone(),
        issued_at: c.issued_at,
        expires_at: c.expires_at,
        argon2_params: c.argon2_params,
        signature: hex::encode(c.signature),
    };
    serde_json::to_vec(&wire).map_err(|e| ChallengeError::Codec(e.to_string()))
}

fn decode_json(bytes: &[u8]) -> Result<Challenge> {
    let wire: JsonChallenge =
        serde_json::from_slice(bytes).map_err(|e| ChallengeError::Codec(e.to_string()))?;

    let algorithm = Algorithm::from_str(&wire.algorithm)
        .ok_or_else(|| ChallengeError::Codec(format!("unknown algorithm {}", wire.algorithm)))?;

    let seed = decode_fixed::<SEED_LEN>(&wire.seed)?;
    let nonce_salt = decode_fixed::<NONCE_SALT_LEN>(&wire.nonce_salt)?;
    let signature = decode_fixed::<32>(&wire.signature)?;

    Ok(Challenge {
        version: wire.version,
        algorithm,
        difficulty: wire.difficulty,
        seed,
        nonce_salt,
        client_id: wire.client_id,
        issued_at: wire.issued_at,
        expires_at: wire.expires_at,
        argon2_params: wire.argon2_params,
        signature,
    })
}

fn decode_fixed<const N: usize>(hex_str: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(hex_str).map_err(|e| ChallengeError::Codec(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| ChallengeError::Codec(format!("expected {N} bytes, got a different length")))
}

// --- Binary form ------------------------------------------------------------

fn encode_binary(c: &Challenge) -> Result<Vec<u8>> {
    let is_argon2 = matches!(c.algorithm, Algorithm::Argon2id);
    let total_len = if is_argon2 {
        layout::ARGON2_TOTAL_LEN
    } else {
        layout::SHA256_TOTAL_LEN
    };
    let mut buf = vec![0u8; total_len];

    buf[layout::VERSION] = c.version;
    buf[layout::ALGORITHM] = match c.algorithm {
        Algorithm::Sha256 => 0x01,
        Algorithm::Argon2id => 0x02,
    };
    buf[layout::DIFFICULTY] = c.difficulty;
    buf[layout::ISSUED_AT..layout::ISSUED_AT + 8].copy_from_slice(&c.issued_at.to_be_bytes());
    buf[layout::EXPIRES_AT..layout::EXPIRES_AT + 8].copy_from_slice(&c.expires_at.to_be_bytes());
    buf[layout::SEED..layout::SEED + SEED_LEN].copy_from_slice(&c.seed);
    buf[layout::NONCE_SALT..layout::NONCE_SALT + NONCE_SALT_LEN].copy_from_slice(&c.nonce_salt);
    buf[layout::SIGNATURE..layout::SIGNATURE + 32].copy_from_slice(&c.signature);

    if is_argon2 {
        let params = c.argon2_params.ok_or(ChallengeError::MissingArgon2Params)?;
        let base = layout::ARGON2_PARAMS;
        buf[base..base + 4].copy_from_slice(&params.t.to_be_bytes());
        buf[base + 4..base + 8].copy_from_slice(&params.m_kib.to_be_bytes());
        buf[base + 8] = params.p as u8;
        buf[base + 9] = params.key_len as u8;
    }

    // client_id is intentionally absent from the binary wire layout; see
    // the `Challenge` doc comment.
    Ok(buf)
}

/// Extract a fixed-width big-endian integer from `bytes[start..start+N]`.
/// The length is already checked by the caller against the total-size
/// constants above, so a mismatch here means the layout constants
/// themselves are wrong, not untrusted input — still reported as a
/// `Codec` error rather than panicking.
fn read_be_bytes<const N: usize>(bytes: &[u8], start: usize) -> Result<[u8; N]> {
    bytes[start..start + N]
        .try_into()
        .map_err(|_| ChallengeError::Codec(format!("truncated field at offset {start}")))
}

fn decode_binary(bytes: &[u8]) -> Result<Challenge> {
    if bytes.len() != layout::SHA256_TOTAL_LEN && bytes.len() != layout::ARGON2_TOTAL_LEN {
        return Err(ChallengeError::Codec(format!(
            "binary challenge must be {} or {} bytes, got {}",
            layout::SHA256_TOTAL_LEN,
            layout::ARGON2_TOTAL_LEN,
            bytes.len()
        )));
    }

    let version = bytes[layout::VERSION];
    let algorithm = match bytes[layout::ALGORITHM] {
        0x01 => Algorithm::Sha256,
        0x02 => Algorithm::Argon2id,
        tag => return Err(ChallengeError::Codec(format!("unknown algorithm tag {tag}"))),
    };
    let difficulty = bytes[layout::DIFFICULTY];
    let issued_at = u64::from_be_bytes(read_be_bytes(bytes, layout::ISSUED_AT)?);
    let expires_at = u64::from_be_bytes(read_be_bytes(bytes, layout::EXPIRES_AT)?);
    let mut seed = [0u8; SEED_LEN];
    seed.copy_from_slice(&bytes[layout::SEED..layout::SEED + SEED_LEN]);
    let mut nonce_salt = [0u8; NONCE_SALT_LEN];
    nonce_salt.copy_from_slice(&bytes[layout::NONCE_SALT..layout::NONCE_SALT + NONCE_SALT_LEN]);
    let mut signature = [0u8; 32];
    signature.copy_from_slice(&bytes[layout::SIGNATURE..layout::SIGNATURE + 32]);

    let argon2_params = if algorithm == Algorithm::Argon2id {
        if bytes.len() != layout::ARGON2_TOTAL_LEN {
            return Err(ChallengeError::MissingArgon2Params);
        }
        let base = layout::ARGON2_PARAMS;
        Some(Argon2Params {
            t: u32::from_be_bytes(read_be_bytes(bytes, base)?),
            m_kib: u32::from_be_bytes(read_be_bytes(bytes, base + 4)?),
            p: bytes[base + 8] as u32,
            key_len: bytes[base + 9] as u32,
        })
    } else {
        None
    };

    Ok(Challenge {
        version,
        algorithm,
        difficulty,
        seed,
        nonce_salt,
        client_id: String::new(),
        issued_at,
        expires_at,
        argon2_params,
        signature,
    })
}

// --- Solution (JSON only — the binary table covers only Challenge) --------

#[derive(Serialize, Deserialize)]
struct JsonSolution {
    challenge: JsonChallenge,
    nonce: String,
    client_id: String,
}

/// Encode a [`Solution`] as JSON, matching the challenge's hex-string
/// convention for byte fields.
pub fn encode_solution(solution: &Solution) -> Result<Vec<u8>> {
    let wire = JsonSolution {
        challenge: JsonChallenge {
            version: solution.challenge.version,
            algorithm: solution.challenge.algorithm.as_str().to_string(),
            difficulty: solution.challenge.difficulty,
            seed: hex::encode(solution.challenge.seed),
            nonce_salt: hex::encode(solution.challenge.nonce_salt),
            client_id: solution.challenge.client_id.clone(),
            issued_at: solution.challenge.issued_at,
            expires_at: solution.challenge.expires_at,
            argon2_params: solution.challenge.argon2_params,
            signature: hex::encode(solution.challenge.signature),
        },
        nonce: solution.nonce.clone(),
        client_id: solution.client_id.clone(),
    };
    serde_json::to_vec(&wire).map_err(|e| ChallengeError::Codec(e.to_string()))
}

/// Decode a [`Solution`] from its JSON wire form.
pub fn decode_solution(bytes: &[u8]) -> Result<Solution> {
    let wire: JsonSolution =
        serde_json::from_slice(bytes).map_err(|e| ChallengeError::Codec(e.to_string()))?;

    let algorithm = Algorithm::from_str(&wire.challenge.algorithm).ok_or_else(|| {
        ChallengeError::Codec(format!("unknown algorithm {}", wire.challenge.algorithm))
    })?;
    let seed = decode_fixed::<SEED_LEN>(&wire.challenge.seed)?;
    let nonce_salt = decode_fixed::<NONCE_SALT_LEN>(&wire.challenge.nonce_salt)?;
    let signature = decode_fixed::<32>(&wire.challenge.signature)?;

    let challenge = Challenge {
        version: wire.challenge.version,
        algorithm,
        difficulty: wire.challenge.difficulty,
        seed,
        nonce_salt,
        client_id: wire.challenge.client_id,
        issued_at: wire.challenge.issued_at,
        expires_at: wire.challenge.expires_at,
        argon2_params: wire.challenge.argon2_params,
        signature,
    };

    Ok(Solution {
        challenge,
        nonce: wire.nonce,
        client_id: wire.client_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wow_keystore::sqlite::SqliteKeyStore;
    use wow_keystore::KeyStore;

    fn secret() -> String {
        "x".repeat(wow_keystore::crypto::MIN_MASTER_SECRET_LEN)
    }

    fn sample(algorithm: Algorithm) -> Challenge {
        let store = SqliteKeyStore::open_memory(&secret()).expect("open");
        crate::generate(2, algorithm, "client-xyz", &store).expect("generate")
    }

    #[test]
    fn test_json_round_trip_preserves_fields() {
        let original = sample(Algorithm::Sha256);
        let encoded = encode(&original, Format::Json).expect("encode");
        let decoded = decode(&encoded, Format::Json).expect("decode");
        assert_eq!(decoded.version, original.version);
        assert_eq!(decoded.algorithm, original.algorithm);
        assert_eq!(decoded.difficulty, original.difficulty);
        assert_eq!(decoded.seed, original.seed);
        assert_eq!(decoded.nonce_salt, original.nonce_salt);
        assert_eq!(decoded.client_id, original.client_id);
        assert_eq!(decoded.issued_at, original.issued_at);
        assert_eq!(decoded.expires_at, original.expires_at);
        assert_eq!(decoded.signature, original.signature);
    }

    #[test]
    fn test_binary_round_trip_sha256() {
        let original = sample(Algorithm::Sha256);
        let encoded = encode(&original, Format::Binary).expect("encode");
        assert_eq!(encoded.len(), layout::SHA256_TOTAL_LEN);
        let decoded = decode(&encoded, Format::Binary).expect("decode");
        assert_eq!(decoded.seed, original.seed);
        assert_eq!(decoded.signature, original.signature);
        assert_eq!(decoded.difficulty, original.difficulty);
    }

    #[test]
    fn test_binary_round_trip_argon2id() {
        let original = sample(Algorithm::Argon2id);
        let encoded = encode(&original, Format::Binary).expect("encode");
        assert_eq!(encoded.len(), layout::ARGON2_TOTAL_LEN);
        let decoded = decode(&encoded, Format::Binary).expect("decode");
        assert_eq!(decoded.argon2_params, original.argon2_params);
    }

    #[test]
    fn test_binary_and_json_sign_identically() {
        let original = sample(Algorithm::Sha256);
        // The signature travels in both forms; canonical bytes must match
        // regardless of which wire format produced the decoded Challenge.
        let via_json = decode(&encode(&original, Format::Json).unwrap(), Format::Json).unwrap();
        let via_binary =
            decode(&encode(&original, Format::Binary).unwrap(), Format::Binary).unwrap();
        assert_eq!(crate::canonical_bytes(&via_json), crate::canonical_bytes(&via_binary));
    }

    #[test]
    fn test_format_tag_round_trip() {
        assert_eq!(Format::from_tag(1), Some(Format::Json));
        assert_eq!(Format::from_tag(2), Some(Format::Binary));
        assert_eq!(Format::from_tag(9), None);
    }

    #[test]
    fn test_version_constant_used() {
        let original = sample(Algorithm::Sha256);
        assert_eq!(original.version, CURRENT_VERSION);
    }

    #[test]
    fn test_solution_round_trip() {
        let challenge = sample(Algorithm::Sha256);
        let solution = Solution {
            challenge,
            nonce: "42".to_string(),
            client_id: "client-xyz".to_string(),
        };
        let encoded = encode_solution(&solution).expect("encode");
        let decoded = decode_solution(&encoded).expect("decode");
        assert_eq!(decoded.nonce, solution.nonce);
        assert_eq!(decoded.client_id, solution.client_id);
        assert_eq!(decoded.challenge.seed, solution.challenge.seed);
        assert_eq!(decoded.challenge.signature, solution.challenge.signature);
    }
}

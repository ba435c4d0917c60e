//! The five-gate validation pipeline (Section 4.6 of the design):
//! rate limit -> format -> timestamp -> signature -> proof-of-work,
//! fail-fast on the first rejecting gate.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use wow_challenge::{canonical_bytes, Solution, CURRENT_VERSION, MAX_NONCE_LEN, SKEW_BACKWARD_US, SKEW_FORWARD_US};
use wow_keystore::KeyStore;
use wow_pow::{argon2id, sha256, Algorithm};

use crate::rate_limit::RateLimiter;
use crate::seen::SeenChallenges;
use crate::signature_cache::SignatureCache;

type HmacSha256 = Hmac<Sha256>;

/// Which gate rejected a solution (Section 7 of the design).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    RateLimit,
    Format,
    Timestamp,
    Signature,
    Pow,
}

#[derive(Debug, thiserror::Error)]
#[error("validation failed at {stage:?}: {reason}")]
pub struct ValidationError {
    pub stage: Stage,
    pub reason: String,
}

impl ValidationError {
    fn new(stage: Stage, reason: impl Into<String>) -> Self {
        Self { stage, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Which identity the rate limiter keys requests by (Section 9 of the
/// design flags client_id-only keying as a bug-smell and asks for both).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitKeyKind {
    ClientId,
    RemoteIp,
}

fn now_micros() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_micros() as u64
}

fn now_unix_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

fn hmac_verify(key: &[u8; 32], bytes: &[u8], signature: &[u8; 32]) -> bool {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(bytes);
    let expected = mac.finalize().into_bytes();
    let expected: [u8; 32] = expected.into();
    expected.ct_eq(signature).into()
}

/// Runs the five validation gates against submitted solutions.
pub struct Pipeline {
    key_store: Arc<dyn KeyStore>,
    rate_limiter: RateLimiter,
    signature_cache: SignatureCache,
    seen_challenges: SeenChallenges,
    rate_limit_key_kind: RateLimitKeyKind,
    replay_protection_enabled: bool,
}

impl Pipeline {
    pub fn new(
        key_store: Arc<dyn KeyStore>,
        rate_limit_key_kind: RateLimitKeyKind,
        replay_protection_enabled: bool,
    ) -> Self {
        Self {
            key_store,
            rate_limiter: RateLimiter::new(),
            signature_cache: SignatureCache::default(),
            seen_challenges: SeenChallenges::new(),
            rate_limit_key_kind,
            replay_protection_enabled,
        }
    }

    /// Evict rate-limiter and seen-challenge entries past their idle/slack
    /// windows. Intended to run on a periodic background tick.
    pub fn sweep(&self) {
        self.rate_limiter.sweep();
        self.seen_challenges.sweep(now_unix_secs());
    }

    #[tracing::instrument(skip(self, solution), fields(stage = "rate_limit"))]
    fn gate_rate_limit(&self, solution: &Solution, remote_ip: IpAddr) -> Result<()> {
        let key = match self.rate_limit_key_kind {
            RateLimitKeyKind::ClientId => solution.client_id.clone(),
            RateLimitKeyKind::RemoteIp => remote_ip.to_string(),
        };
        if self.rate_limiter.check(&key) {
            Ok(())
        } else {
            Err(ValidationError::new(Stage::RateLimit, "request budget exceeded for window"))
        }
    }

    #[tracing::instrument(skip(self, solution), fields(stage = "format"))]
    fn gate_format(&self, solution: &Solution) -> Result<()> {
        let challenge = &solution.challenge;
        if challenge.version != CURRENT_VERSION {
            return Err(ValidationError::new(Stage::Format, "unrecognized challenge version"));
        }
        if wow_pow::validate_difficulty(challenge.difficulty).is_err() {
            return Err(ValidationError::new(Stage::Format, "difficulty out of range"));
        }
        if matches!(challenge.algorithm, Algorithm::Argon2id) && challenge.argon2_params.is_none() {
            return Err(ValidationError::new(Stage::Format, "argon2id challenge missing params"));
        }
        if solution.nonce.is_empty() || solution.nonce.len() > MAX_NONCE_LEN {
            return Err(ValidationError::new(Stage::Format, "nonce length out of bounds"));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, solution), fields(stage = "timestamp"))]
    fn gate_timestamp(&self, solution: &Solution) -> Result<()> {
        let challenge = &solution.challenge;
        let now = now_micros();
        if now >= challenge.expires_at {
            return Err(ValidationError::new(Stage::Timestamp, "challenge has expired"));
        }
        if challenge.issued_at > now + SKEW_FORWARD_US {
            return Err(ValidationError::new(Stage::Timestamp, "issued_at too far in the future"));
        }
        if challenge.issued_at < now.saturating_sub(SKEW_BACKWARD_US) {
            return Err(ValidationError::new(Stage::Timestamp, "issued_at too far in the past"));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, solution), fields(stage = "signature"))]
    fn gate_signature(&self, solution: &Solution) -> Result<()> {
        let challenge = &solution.challenge;
        let challenge_id = hex::encode(challenge.signature);
        let (current_version, current_key, previous_key) = self.key_store.both_keys();

        if let Some(cached) = self.signature_cache.get(&challenge_id, current_version) {
            if !cached {
                return Err(ValidationError::new(Stage::Signature, "signature does not verify (memoized)"));
            }
        } else {
            let bytes = canonical_bytes(challenge);
            let verified = hmac_verify(&current_key, &bytes, &challenge.signature)
                || previous_key.is_some_and(|key| hmac_verify(&key, &bytes, &challenge.signature));
            self.signature_cache.insert(&challenge_id, current_version, verified);
            if !verified {
                return Err(ValidationError::new(Stage::Signature, "signature does not verify"));
            }
        }

        if self.replay_protection_enabled && self.seen_challenges.contains(&challenge_id) {
            return Err(ValidationError::new(Stage::Signature, "challenge already redeemed"));
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, solution), fields(stage = "pow"))]
    fn gate_pow(&self, solution: &Solution) -> Result<()> {
        let challenge = &solution.challenge;
        let seed_hex = hex::encode(challenge.seed);
        let solved = match challenge.algorithm {
            Algorithm::Sha256 => sha256::verify(&seed_hex, &solution.nonce, challenge.difficulty),
            Algorithm::Argon2id => {
                let params = challenge
                    .argon2_params
                    .as_ref()
                    .expect("format gate already rejected missing argon2 params");
                argon2id::verify(&seed_hex, &solution.nonce, challenge.difficulty, params)
            }
        };
        if solved {
            Ok(())
        } else {
            Err(ValidationError::new(Stage::Pow, "proof of work does not meet difficulty target"))
        }
    }

    /// Run all five gates in order, fail-fast. On full success, marks the
    /// challenge as redeemed so a resubmission is rejected by the replay
    /// check (when enabled).
    pub fn validate(&self, solution: &Solution, remote_ip: IpAddr) -> Result<()> {
        let start = Instant::now();
        self.gate_rate_limit(solution, remote_ip)?;
        self.gate_format(solution)?;
        self.gate_timestamp(solution)?;
        self.gate_signature(solution)?;
        self.gate_pow(solution)?;

        if self.replay_protection_enabled {
            let challenge_id = hex::encode(solution.challenge.signature);
            self.seen_challenges.insert(&challenge_id, solution.challenge.expires_at / 1_000_000);
        }

        tracing::debug!(duration_us = start.elapsed().as_micros() as u64, "validation succeeded");
        Ok(())
    }
}

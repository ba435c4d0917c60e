//! Replay protection: a set of already-accepted challenge ids (Section 9
//! of the design's open question, resolved on by default).

use dashmap::DashMap;

/// Seconds of slack added past a challenge's `expires_at` before its id is
/// safe to forget — covers clock skew between the moment a challenge is
/// marked seen and the sweep that evicts it.
pub const EXPIRY_SLACK_SECS: u64 = 5;

pub struct SeenChallenges {
    table: DashMap<String, u64>,
}

impl SeenChallenges {
    pub fn new() -> Self {
        Self { table: DashMap::new() }
    }

    pub fn contains(&self, challenge_id: &str) -> bool {
        self.table.contains_key(challenge_id)
    }

    /// Mark `challenge_id` seen, expiring it at `expires_at_unix_secs +
    /// EXPIRY_SLACK_SECS`.
    pub fn insert(&self, challenge_id: &str, expires_at_unix_secs: u64) {
        self.table
            .insert(challenge_id.to_string(), expires_at_unix_secs + EXPIRY_SLACK_SECS);
    }

    /// Evict entries whose slack has elapsed as of `now_unix_secs`.
    pub fn sweep(&self, now_unix_secs: u64) {
        self.table.retain(|_, expiry| *expiry > now_unix_secs);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }
}

impl Default for SeenChallenges {
    fn default() -> Self {
        Self::new()
    }
}

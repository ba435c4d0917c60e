//! # wow-tracker
//!
//! Per-IP behavior tracking and the adaptive difficulty function (Section
//! 4.5 of the design).
//!
//! [`BehaviorTracker`] wraps a persistence-agnostic [`BehaviorStore`] and
//! adds the per-IP serialization the design requires: concurrent
//! `record_connection`/`record_challenge_result` calls for the *same* IP
//! never interleave their read-modify-write, while different IPs proceed in
//! parallel.

pub mod difficulty;
mod store;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

pub use store::{BehaviorStore, InMemoryBehaviorStore};

/// Most recent connection timestamps kept per IP (Section 3 of the design).
pub const MAX_CONNECTION_HISTORY: usize = 64;

/// A reconnect pair's inter-arrival threshold, in seconds.
const RECONNECT_WINDOW_SECS: u64 = 5;

/// Reputation never exceeds this cap via natural recovery alone.
const NATURAL_RECOVERY_CEILING: u32 = 50;

/// Per-IP client reputation and solving history (Section 3 of the design).
#[derive(Clone, Debug, PartialEq)]
pub struct ClientBehavior {
    pub connection_count: u64,
    pub total_challenges: u64,
    pub successful_challenges: u64,
    pub failed_challenges: u64,
    pub total_solve_time_ms: u64,
    pub avg_solve_time_ms: f64,
    pub failure_rate: f64,
    pub reconnect_rate: f64,
    pub reputation: u32,
    pub suspicious_score: u32,
    pub difficulty: u8,
    pub last_connection: u64,
    pub last_reputation_update: u64,
}

impl Default for ClientBehavior {
    fn default() -> Self {
        let now = now_unix();
        Self {
            connection_count: 0,
            total_challenges: 0,
            successful_challenges: 0,
            failed_challenges: 0,
            total_solve_time_ms: 0,
            avg_solve_time_ms: 0.0,
            failure_rate: 0.0,
            reconnect_rate: 0.0,
            reputation: 50,
            suspicious_score: 0,
            difficulty: 1,
            last_connection: now,
            last_reputation_update: now,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("behavior store unavailable: {0}")]
    StoreUnavailable(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

pub(crate) fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Tracks per-IP behavior, serializing updates per IP over a
/// persistence-agnostic [`BehaviorStore`].
pub struct BehaviorTracker {
    store: Arc<dyn BehaviorStore>,
    ip_locks: DashMap<IpAddr, Arc<AsyncMutex<()>>>,
    initial_difficulty: u8,
}

impl BehaviorTracker {
    /// `initial_difficulty` governs a first-seen IP's difficulty until its
    /// own history has rules to apply (Section 6 of the design:
    /// `WOW_INITIAL_DIFFICULTY`, "until per-client tracking takes over").
    pub fn new(store: Arc<dyn BehaviorStore>, initial_difficulty: u8) -> Self {
        Self {
            store,
            ip_locks: DashMap::new(),
            initial_difficulty,
        }
    }

    fn lock_for(&self, ip: IpAddr) -> Arc<AsyncMutex<()>> {
        self.ip_locks.entry(ip).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Record a new connection from `ip`, updating `connection_count` and
    /// `reconnect_rate`, and recomputing `difficulty` (Section 4.5).
    pub async fn record_connection(&self, ip: IpAddr) -> ClientBehavior {
        let lock = self.lock_for(ip);
        let _guard = lock.lock().await;

        let existing = self.store.get(ip);
        let is_first_seen = existing.is_none();
        let mut behavior = existing.unwrap_or_default();
        if is_first_seen {
            behavior.difficulty = self.initial_difficulty;
        }
        let now = now_unix();

        self.store.append_timestamp(ip, now);
        let history = self.store.recent_timestamps(ip);
        behavior.reconnect_rate = reconnect_rate(&history);

        behavior.connection_count += 1;
        behavior.last_connection = now;
        behavior.difficulty = difficulty::adjust(difficulty::Inputs {
            failure_rate: behavior.failure_rate,
            avg_solve_time_ms: behavior.avg_solve_time_ms,
            reconnect_rate: behavior.reconnect_rate,
            connection_count: behavior.connection_count,
            reputation: behavior.reputation,
            current_difficulty: behavior.difficulty,
        });

        self.store.upsert(ip, behavior.clone());
        behavior
    }

    /// Record the outcome of a solved (or failed) challenge for `ip`,
    /// applying reputation recovery and the success/fail delta before
    /// recomputing `difficulty` (Section 4.5).
    pub async fn record_challenge_result(
        &self,
        ip: IpAddr,
        success: bool,
        solve_time_ms: u64,
    ) -> ClientBehavior {
        let lock = self.lock_for(ip);
        let _guard = lock.lock().await;

        let mut behavior = self.store.get(ip).unwrap_or_default();
        let now = now_unix();

        behavior.total_challenges += 1;
        if success {
            behavior.successful_challenges += 1;
            behavior.total_solve_time_ms += solve_time_ms;
        } else {
            behavior.failed_challenges += 1;
        }

        behavior.failure_rate = behavior.failed_challenges as f64 / behavior.total_challenges as f64;
        behavior.avg_solve_time_ms = if behavior.successful_challenges > 0 {
            behavior.total_solve_time_ms as f64 / behavior.successful_challenges as f64
        } else {
            0.0
        };

        if behavior.reputation < NATURAL_RECOVERY_CEILING {
            let hours_since = (now.saturating_sub(behavior.last_reputation_update)) / 3600;
            behavior.reputation = (behavior.reputation + hours_since as u32).min(NATURAL_RECOVERY_CEILING);
        }
        if success {
            behavior.reputation = (behavior.reputation + 5).min(100);
            behavior.suspicious_score = behavior.suspicious_score.saturating_sub(1);
        } else {
            behavior.reputation = behavior.reputation.saturating_sub(10);
            behavior.suspicious_score = behavior.suspicious_score.saturating_add(1);
        }
        behavior.last_reputation_update = now;

        behavior.difficulty = difficulty::adjust(difficulty::Inputs {
            failure_rate: behavior.failure_rate,
            avg_solve_time_ms: behavior.avg_solve_time_ms,
            reconnect_rate: behavior.reconnect_rate,
            connection_count: behavior.connection_count,
            reputation: behavior.reputation,
            current_difficulty: behavior.difficulty,
        });

        self.store.upsert(ip, behavior.clone());
        behavior
    }

    pub fn snapshot(&self, ip: IpAddr) -> Option<ClientBehavior> {
        self.store.get(ip)
    }
}

/// Fraction of consecutive connection-timestamp pairs whose gap is under
/// [`RECONNECT_WINDOW_SECS`] (Section 4.5: "fraction of pairs (prior
/// disconnect, next connect) whose inter-arrival is < 5 s" — approximated
/// here over consecutive connection timestamps for the same IP, since a
/// quick disconnect-then-reconnect shows up as two closely-spaced
/// connections).
fn reconnect_rate(history: &[u64]) -> f64 {
    if history.len() < 2 {
        return 0.0;
    }
    let total_pairs = history.len() - 1;
    let reconnects = history
        .windows(2)
        .filter(|pair| pair[1].saturating_sub(pair[0]) < RECONNECT_WINDOW_SECS)
        .count();
    reconnects as f64 / total_pairs.max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7))
    }

    fn tracker() -> BehaviorTracker {
        BehaviorTracker::new(Arc::new(InMemoryBehaviorStore::new()), 1)
    }

    #[tokio::test]
    async fn test_fresh_ip_defaults_to_reputation_50_difficulty_1() {
        let t = tracker();
        let behavior = t.record_connection(ip()).await;
        assert_eq!(behavior.connection_count, 1);
        assert_eq!(behavior.difficulty, 1);
    }

    #[tokio::test]
    async fn test_fresh_ip_starts_at_the_configured_initial_difficulty() {
        let t = BehaviorTracker::new(Arc::new(InMemoryBehaviorStore::new()), 2);
        let behavior = t.record_connection(ip()).await;
        assert_eq!(behavior.difficulty, 2);
    }

    #[tokio::test]
    async fn test_scenario_1_happy_path_reputation_55() {
        let t = tracker();
        t.record_connection(ip()).await;
        let behavior = t.record_challenge_result(ip(), true, 2_000).await;
        assert_eq!(behavior.successful_challenges, 1);
        assert_eq!(behavior.reputation, 55);
        assert!(behavior.difficulty <= 2);
    }

    #[tokio::test]
    async fn test_scenario_2_failure_reputation_40() {
        let t = tracker();
        t.record_connection(ip()).await;
        let behavior = t.record_challenge_result(ip(), false, 0).await;
        assert_eq!(behavior.failed_challenges, 1);
        assert_eq!(behavior.reputation, 40);
    }

    #[tokio::test]
    async fn test_scenario_5_escalation_to_difficulty_6() {
        let t = tracker();
        let target = ip();
        for _ in 0..21 {
            t.record_connection(target).await;
            t.record_challenge_result(target, false, 0).await;
        }
        let behavior = t.snapshot(target).expect("entry exists");
        assert_eq!(behavior.connection_count, 21);
        assert!(behavior.reconnect_rate > 0.8);
        assert_eq!(behavior.failure_rate, 1.0);
        assert_eq!(behavior.difficulty, 6);
    }

    #[tokio::test]
    async fn test_scenario_6_slow_solver_difficulty_drops_to_1() {
        let target = ip();
        let store = Arc::new(InMemoryBehaviorStore::new());
        // An established, legitimate client: 3 well-spaced prior
        // connections (reconnect_rate=0) at difficulty 3, about to solve
        // one slow (22s) challenge.
        store.upsert(
            target,
            ClientBehavior {
                connection_count: 3,
                difficulty: 3,
                ..Default::default()
            },
        );
        let t = BehaviorTracker::new(store, 1);

        let behavior = t.record_challenge_result(target, true, 22_000).await;
        assert_eq!(behavior.avg_solve_time_ms, 22_000.0);
        assert_eq!(behavior.difficulty, 1);
    }

    #[test]
    fn test_reconnect_rate_empty_and_singleton() {
        assert_eq!(reconnect_rate(&[]), 0.0);
        assert_eq!(reconnect_rate(&[100]), 0.0);
    }

    #[test]
    fn test_reconnect_rate_all_within_window() {
        let history = vec![0, 2, 4, 6];
        assert_eq!(reconnect_rate(&history), 1.0);
    }

    #[test]
    fn test_reconnect_rate_mixed() {
        let history = vec![0, 2, 100, 102];
        // pairs: (0,2)=2s reconnect, (2,100)=98s not, (100,102)=2s reconnect
        assert!((reconnect_rate(&history) - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_concurrent_updates_to_same_ip_do_not_lose_writes() {
        let t = Arc::new(tracker());
        let target = ip();
        let mut handles = Vec::new();
        for _ in 0..50 {
            let t = t.clone();
            handles.push(tokio::spawn(async move {
                t.record_connection(target).await;
            }));
        }
        for h in handles {
            h.await.expect("task panicked");
        }
        let behavior = t.snapshot(target).expect("entry exists");
        assert_eq!(behavior.connection_count, 50);
    }
}

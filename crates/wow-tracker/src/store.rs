//! Persistence-agnostic [`BehaviorStore`] trait (Section 6 of the design)
//! and its in-memory default, [`InMemoryBehaviorStore`].

use std::collections::VecDeque;
use std::net::IpAddr;

use dashmap::DashMap;

use crate::{ClientBehavior, MAX_CONNECTION_HISTORY};

/// The tracker's persistence boundary. An implementation need only provide
/// these three operations; [`BehaviorTracker`](crate::BehaviorTracker)
/// supplies the serialization and difficulty recomputation on top.
pub trait BehaviorStore: Send + Sync {
    fn get(&self, ip: IpAddr) -> Option<ClientBehavior>;
    fn upsert(&self, ip: IpAddr, behavior: ClientBehavior);
    fn append_timestamp(&self, ip: IpAddr, connected_at: u64);
    fn recent_timestamps(&self, ip: IpAddr) -> Vec<u64>;
}

/// A `dashmap`-backed in-memory [`BehaviorStore`] — sufficient for the
/// core's own tests and a reasonable default for a single-node deployment
/// (Section 6: "an in-memory implementation is sufficient for the core's
/// tests").
#[derive(Default)]
pub struct InMemoryBehaviorStore {
    behaviors: DashMap<IpAddr, ClientBehavior>,
    timestamps: DashMap<IpAddr, VecDeque<u64>>,
}

impl InMemoryBehaviorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BehaviorStore for InMemoryBehaviorStore {
    fn get(&self, ip: IpAddr) -> Option<ClientBehavior> {
        self.behaviors.get(&ip).map(|entry| entry.clone())
    }

    fn upsert(&self, ip: IpAddr, behavior: ClientBehavior) {
        self.behaviors.insert(ip, behavior);
    }

    fn append_timestamp(&self, ip: IpAddr, connected_at: u64) {
        let mut history = self.timestamps.entry(ip).or_default();
        history.push_back(connected_at);
        while history.len() > MAX_CONNECTION_HISTORY {
            history.pop_front();
        }
    }

    fn recent_timestamps(&self, ip: IpAddr) -> Vec<u64> {
        self.timestamps
            .get(&ip)
            .map(|entry| entry.iter().copied().collect())
            .unwrap_or_default()
    }
}

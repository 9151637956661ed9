use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::exchange::ExchangeRateSnapshot;

/// Eviction strategy for cached snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Entries stay valid for the process lifetime.
    #[default]
    KeepForever,
    /// Entries older than the given duration are treated as absent.
    ExpireAfter(Duration),
}

struct CacheEntry {
    snapshot: ExchangeRateSnapshot,
    inserted_at: Instant,
}

/// Per-provider snapshot cache keyed by base currency. Entries are only
/// replaced by later successful fetches, never dropped, unless the policy
/// expires them.
pub struct RateCache {
    entries: DashMap<String, CacheEntry>,
    policy: CachePolicy,
}

impl RateCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            entries: DashMap::new(),
            policy,
        }
    }

    pub fn get(&self, base_currency: &str) -> Option<ExchangeRateSnapshot> {
        let entry = match self.entries.get(base_currency) {
            Some(entry) => entry,
            None => {
                debug!(base = base_currency, "Cache MISS");
                return None;
            }
        };

        if let CachePolicy::ExpireAfter(ttl) = self.policy {
            if entry.inserted_at.elapsed() > ttl {
                debug!(base = base_currency, "Cache EXPIRED");
                // The shard read guard must go before remove takes it for
                // writing.
                drop(entry);
                self.entries.remove(base_currency);
                return None;
            }
        }

        debug!(base = base_currency, "Cache HIT");
        Some(entry.snapshot.clone())
    }

    pub fn insert(&self, base_currency: String, snapshot: ExchangeRateSnapshot) {
        debug!(base = %base_currency, "Cache PUT");
        self.entries.insert(
            base_currency,
            CacheEntry {
                snapshot,
                inserted_at: Instant::now(),
            },
        );
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new(CachePolicy::KeepForever)
    }
}

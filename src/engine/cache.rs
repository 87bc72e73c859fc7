// In-memory schedule cache keyed by (pilot, airline), with TTL expiry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::model::{Schedule, SessionKey};

struct CacheEntry {
    schedule: Arc<Schedule>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Sharded map of fresh schedules. Unrelated keys never contend on one lock.
pub struct ScheduleCache {
    entries: DashMap<SessionKey, CacheEntry>,
    ttl: Duration,
}

impl ScheduleCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Return the cached schedule if it has not expired. Expired entries are
    /// evicted on the way out.
    pub fn get(&self, key: &SessionKey) -> Option<Arc<Schedule>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_fresh(now) {
                return Some(Arc::clone(&entry.schedule));
            }
        }
        self.entries.remove_if(key, |_, entry| !entry.is_fresh(now));
        None
    }

    /// Store `schedule`, replacing any older entry for the same key.
    pub fn insert(&self, key: SessionKey, schedule: Arc<Schedule>) {
        let expires_at = Instant::now() + self.ttl;
        self.entries.insert(
            key,
            CacheEntry {
                schedule,
                expires_at,
            },
        );
    }

    pub fn invalidate(&self, key: &SessionKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

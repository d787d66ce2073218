//! Single-entry snapshot cache with a time-to-live.

use crate::clock::Clock;
use crate::snapshot::WeatherSnapshot;
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Default time-to-live for a cached snapshot.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: WeatherSnapshot,
    stored_at: DateTime<Utc>,
}

/// Holds the most recent snapshot and when it was stored.
///
/// An entry is only ever overwritten by `put`; nothing removes it.
pub struct SnapshotCache {
    entry: RwLock<Option<CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl SnapshotCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entry: RwLock::new(None),
            clock,
        }
    }

    /// The stored snapshot and its age, if any.
    pub fn get(&self) -> Option<(WeatherSnapshot, Duration)> {
        let guard = self.entry.read().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map(|entry| {
            let age = (self.clock.now() - entry.stored_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            (entry.snapshot.clone(), age)
        })
    }

    /// True iff a snapshot exists and is younger than `ttl`.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.get().is_some_and(|(_, age)| age < ttl)
    }

    /// The stored snapshot if it is younger than `ttl`.
    pub fn fresh(&self, ttl: Duration) -> Option<WeatherSnapshot> {
        if !self.is_fresh(ttl) {
            return None;
        }
        self.get().map(|(snapshot, _)| snapshot)
    }

    /// Replace the stored snapshot and reset its age.
    pub fn put(&self, snapshot: WeatherSnapshot) {
        let stored_at = self.clock.now();
        let mut guard = self.entry.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(CacheEntry {
            snapshot,
            stored_at,
        });
    }
}

impl std::fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.entry.read().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("SnapshotCache")
            .field("stored_at", &guard.as_ref().map(|e| e.stored_at))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::snapshot::{normalize, ExtractionMethod, RawExtraction};
    use serde_json::json;

    fn snapshot(clock: &ManualClock, temp: f64) -> WeatherSnapshot {
        normalize(
            RawExtraction {
                current: Some(json!({ "sicaklik": temp })),
                method: Some(ExtractionMethod::AngularScope),
                ..Default::default()
            },
            clock.now(),
        )
    }

    #[test]
    fn test_empty_cache_is_not_fresh() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = SnapshotCache::new(clock);
        assert!(cache.get().is_none());
        assert!(!cache.is_fresh(DEFAULT_TTL));
    }

    #[test]
    fn test_fresh_until_ttl_elapses() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = SnapshotCache::new(clock.clone());
        cache.put(snapshot(&clock, 20.0));

        clock.advance(chrono::Duration::seconds(299));
        assert!(cache.is_fresh(DEFAULT_TTL));
        assert!(cache.fresh(DEFAULT_TTL).is_some());

        clock.advance(chrono::Duration::seconds(1));
        assert!(!cache.is_fresh(DEFAULT_TTL));
        // Stale data is kept but not handed out as fresh
        assert!(cache.get().is_some());
        assert!(cache.fresh(DEFAULT_TTL).is_none());
    }

    #[test]
    fn test_put_overwrites_and_resets_age() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = SnapshotCache::new(clock.clone());
        cache.put(snapshot(&clock, 20.0));

        clock.advance(chrono::Duration::minutes(10));
        let newer = snapshot(&clock, 25.0);
        cache.put(newer.clone());

        let (stored, age) = cache.get().unwrap();
        assert_eq!(stored, newer);
        assert_eq!(age, Duration::ZERO);
    }

    #[test]
    fn test_get_reports_age() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = SnapshotCache::new(clock.clone());
        cache.put(snapshot(&clock, 20.0));
        clock.advance(chrono::Duration::seconds(42));

        let (_, age) = cache.get().unwrap();
        assert_eq!(age, Duration::from_secs(42));
    }
}

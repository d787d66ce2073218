//! Cache-aware access to the latest weather snapshot.
//!
//! On a cache miss the pipeline (source fetch, normalize, cache store) runs
//! once in a background task; callers arriving while it runs wait for the
//! same result instead of starting their own browser.

use crate::cache::SnapshotCache;
use crate::clock::Clock;
use crate::error::ScrapeError;
use crate::scraper::WeatherSource;
use crate::snapshot::{iso_timestamp, normalize, WeatherSnapshot};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fetch errors are shared between every caller of one in-flight fetch.
pub type SharedError = Arc<ScrapeError>;

type Flight = Shared<BoxFuture<'static, Result<WeatherSnapshot, SharedError>>>;

pub struct WeatherService {
    source: Arc<dyn WeatherSource>,
    cache: Arc<SnapshotCache>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    in_flight: Mutex<Option<(u64, Flight)>>,
    next_flight: AtomicU64,
}

impl WeatherService {
    pub fn new(source: Arc<dyn WeatherSource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            source,
            cache: Arc::new(SnapshotCache::new(clock.clone())),
            clock,
            ttl,
            in_flight: Mutex::new(None),
            next_flight: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// The cached snapshot while fresh, otherwise a newly fetched one.
    ///
    /// A failed fetch leaves the cache untouched.
    pub async fn current(&self) -> Result<WeatherSnapshot, SharedError> {
        if let Some(snapshot) = self.cache.fresh(self.ttl) {
            log::debug!(
                "Serving cached snapshot from {}",
                iso_timestamp(&snapshot.updated_at)
            );
            return Ok(snapshot);
        }

        let (id, flight) = self.join_or_start();
        let result = flight.await;

        let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|(current, _)| *current == id) {
            *slot = None;
        }
        result
    }

    fn join_or_start(&self) -> (u64, Flight) {
        let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        // A finished flight left behind by a cancelled caller is not reused
        if let Some((id, flight)) = slot.as_ref().filter(|(_, f)| f.peek().is_none()) {
            log::debug!("Joining in-flight fetch #{}", id);
            return (*id, flight.clone());
        }

        let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
        // Spawned so the fetch completes and fills the cache even if every
        // waiting client goes away
        let task = tokio::spawn(run_pipeline(
            self.source.clone(),
            self.cache.clone(),
            self.clock.clone(),
        ));
        let flight = task
            .map(|joined| match joined {
                Ok(result) => result,
                Err(e) => Err(Arc::new(ScrapeError::Task(e.to_string()))),
            })
            .boxed()
            .shared();
        *slot = Some((id, flight.clone()));
        (id, flight)
    }
}

async fn run_pipeline(
    source: Arc<dyn WeatherSource>,
    cache: Arc<SnapshotCache>,
    clock: Arc<dyn Clock>,
) -> Result<WeatherSnapshot, SharedError> {
    let raw = source.fetch().await.map_err(Arc::new)?;
    let snapshot = normalize(raw, clock.now());
    cache.put(snapshot.clone());
    log::info!(
        "Weather data updated ({}) at {}",
        snapshot.method,
        iso_timestamp(&snapshot.updated_at)
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::snapshot::{ExtractionMethod, RawExtraction};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;

    /// Source double that counts fetches and can be held open.
    struct FakeSource {
        calls: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
        gate: Option<Arc<Semaphore>>,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: std::sync::atomic::AtomicBool::new(false),
                gate: None,
            }
        }

        fn gated(gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherSource for FakeSource {
        async fn fetch(&self) -> Result<RawExtraction, ScrapeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await.map_err(|e| ScrapeError::Launch(e.to_string()))?;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(ScrapeError::Navigation("net::ERR_CONNECTION_RESET".into()));
            }
            Ok(RawExtraction {
                current: Some(json!({ "fetch": n })),
                method: Some(ExtractionMethod::AngularScope),
                ..Default::default()
            })
        }
    }

    fn service(source: Arc<FakeSource>, clock: Arc<ManualClock>) -> WeatherService {
        WeatherService::new(source, clock, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_fetch() {
        let source = Arc::new(FakeSource::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let svc = service(source.clone(), clock.clone());

        let first = svc.current().await.unwrap();
        clock.advance(chrono::Duration::minutes(4));
        let second = svc.current().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_cache_refetches() {
        let source = Arc::new(FakeSource::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let svc = service(source.clone(), clock.clone());

        let first = svc.current().await.unwrap();
        clock.advance(chrono::Duration::minutes(5));
        let second = svc.current().await.unwrap();

        assert_eq!(source.calls(), 2);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(second.current, Some(json!({ "fetch": 2 })));
    }

    #[tokio::test]
    async fn test_updated_at_is_fetch_time() {
        let source = Arc::new(FakeSource::new());
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let svc = service(source, clock);

        let snapshot = svc.current().await.unwrap();
        assert!(snapshot.updated_at >= start);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_stale_entry() {
        let source = Arc::new(FakeSource::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let svc = service(source.clone(), clock.clone());

        let first = svc.current().await.unwrap();
        clock.advance(chrono::Duration::minutes(6));
        source.fail.store(true, Ordering::SeqCst);

        let err = svc.current().await.unwrap_err();
        assert!(err.to_string().contains("net::ERR_CONNECTION_RESET"));
        let (cached, _) = svc.cache().get().unwrap();
        assert_eq!(cached, first);

        // Next request retries from scratch
        source.fail.store(false, Ordering::SeqCst);
        let third = svc.current().await.unwrap();
        assert_eq!(source.calls(), 3);
        assert_eq!(third.current, Some(json!({ "fetch": 3 })));
    }

    #[tokio::test]
    async fn test_failed_first_fetch_leaves_cache_empty() {
        let source = Arc::new(FakeSource::new());
        source.fail.store(true, Ordering::SeqCst);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let svc = service(source, clock);

        assert!(svc.current().await.is_err());
        assert!(svc.cache().get().is_none());
    }

    #[tokio::test]
    async fn test_fetch_outlives_cancelled_caller() {
        let gate = Arc::new(Semaphore::new(0));
        let source = Arc::new(FakeSource::gated(gate.clone()));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let svc = Arc::new(service(source.clone(), clock));

        let caller = tokio::spawn({
            let svc = svc.clone();
            async move { svc.current().await }
        });
        while source.calls() == 0 {
            tokio::task::yield_now().await;
        }
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());

        gate.add_permits(1);
        for _ in 0..100 {
            if svc.cache().get().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let (cached, _) = svc.cache().get().expect("fetch should still fill the cache");
        assert_eq!(cached.current, Some(json!({ "fetch": 1 })));

        // The finished fetch is served from cache, not run again
        let next = svc.current().await.unwrap();
        assert_eq!(next, cached);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let gate = Arc::new(Semaphore::new(0));
        let source = Arc::new(FakeSource::gated(gate.clone()));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let svc = Arc::new(service(source.clone(), clock));

        let a = tokio::spawn({
            let svc = svc.clone();
            async move { svc.current().await }
        });
        let b = tokio::spawn({
            let svc = svc.clone();
            async move { svc.current().await }
        });

        // Let both requests reach the in-flight fetch
        while source.calls() == 0 {
            tokio::task::yield_now().await;
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        gate.add_permits(1);

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(source.calls(), 1);
    }
}

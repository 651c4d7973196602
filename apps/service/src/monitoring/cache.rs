use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use super::checker::Prober;
use super::types::{ProbeOutcome, Tenant, TenantId, effective_interval};

/// Batch result for one tenant, keyed by URL
pub type BatchResult = BTreeMap<String, ProbeOutcome>;

/// Time source for cache expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Clock backed by the tokio timer (follows paused time in tests)
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { origin: Instant::now(), offset: Mutex::new(Duration::ZERO) }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.origin + offset
    }
}

struct CachedBatch {
    fetched_at: Instant,
    endpoints: Vec<String>,
    /// Interval of the tenant when the batch was fetched
    interval: Duration,
    results: BatchResult,
}

type Slot = Arc<tokio::sync::Mutex<Option<CachedBatch>>>;

/// Per-tenant memoization of batch probes with single-flight semantics.
///
/// Each tenant owns one async slot. The slot stays locked while a batch is
/// in flight, so concurrent callers queue behind it and are answered from
/// the batch it stores.
pub struct TenantCheckCache {
    prober: Arc<dyn Prober>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    slots: Mutex<HashMap<TenantId, Slot>>,
}

impl TenantCheckCache {
    pub fn new(prober: Arc<dyn Prober>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { prober, clock, ttl, slots: Mutex::new(HashMap::new()) }
    }

    /// Time source shared with the scheduler's elapsed-time accounting
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Return the tenant's batch result, probing every endpoint only if no
    /// fresh batch for the same endpoint set exists.
    ///
    /// Freshness is capped at the tenant's interval, both the current one and
    /// the one the batch was fetched under, so a cached batch never stands in
    /// for a whole scheduling cycle.
    pub async fn get_or_probe_all(&self, tenant: &Tenant) -> BatchResult {
        let slot = self.slot(tenant.id);
        let mut cached = slot.lock().await;

        let interval = effective_interval(tenant.interval_seconds, 1);
        let mut endpoints = tenant.endpoints.clone();
        endpoints.sort();
        endpoints.dedup();

        if let Some(batch) = cached.as_ref() {
            let window = self.ttl.min(interval).min(batch.interval);
            let age = self.clock.now().saturating_duration_since(batch.fetched_at);
            if age < window && batch.endpoints == endpoints {
                tracing::debug!(tenant = %tenant.id, "Serving cached batch");
                return batch.results.clone();
            }
        }

        let results = self.probe_all(&endpoints).await;
        *cached = Some(CachedBatch {
            fetched_at: self.clock.now(),
            endpoints,
            interval,
            results: results.clone(),
        });

        results
    }

    async fn probe_all(&self, endpoints: &[String]) -> BatchResult {
        let probes = endpoints.iter().map(|url| {
            let prober = Arc::clone(&self.prober);
            async move { (url.clone(), prober.probe(url).await) }
        });

        futures::future::join_all(probes).await.into_iter().collect()
    }

    fn slot(&self, tenant: TenantId) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(tenant).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and takes a while to answer
    struct CountingProber {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl CountingProber {
        fn new(delay: Duration) -> Self {
            Self { calls: AtomicUsize::new(0), delay }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Prober for CountingProber {
        async fn probe(&self, _url: &str) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            ProbeOutcome::up(200)
        }
    }

    fn tenant(endpoints: &[&str]) -> Tenant {
        Tenant::new(TenantId(7), 30, endpoints.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_batch() {
        let prober = Arc::new(CountingProber::new(Duration::from_millis(50)));
        let cache = Arc::new(TenantCheckCache::new(
            prober.clone(),
            Arc::new(ManualClock::new()),
            Duration::from_secs(60),
        ));
        let tenant = tenant(&["http://a.test", "http://b.test"]);

        let calls = (0..8).map(|_| {
            let cache = Arc::clone(&cache);
            let tenant = tenant.clone();
            tokio::spawn(async move { cache.get_or_probe_all(&tenant).await })
        });
        let results = futures::future::join_all(calls).await;

        // one batch of two endpoints
        assert_eq!(prober.calls(), 2);
        for result in results {
            let result = result.unwrap();
            assert_eq!(result.len(), 2);
            assert!(result.values().all(|o| o.reachable));
        }
    }

    #[tokio::test]
    async fn test_expired_batch_is_probed_again() {
        let prober = Arc::new(CountingProber::new(Duration::ZERO));
        let clock = Arc::new(ManualClock::new());
        let cache = TenantCheckCache::new(prober.clone(), clock.clone(), Duration::from_secs(20));
        let tenant = tenant(&["http://a.test"]);

        cache.get_or_probe_all(&tenant).await;
        clock.advance(Duration::from_secs(19));
        cache.get_or_probe_all(&tenant).await;
        assert_eq!(prober.calls(), 1);

        clock.advance(Duration::from_secs(1));
        cache.get_or_probe_all(&tenant).await;
        assert_eq!(prober.calls(), 2);
    }

    #[tokio::test]
    async fn test_window_is_capped_by_interval() {
        let prober = Arc::new(CountingProber::new(Duration::ZERO));
        let clock = Arc::new(ManualClock::new());
        let cache = TenantCheckCache::new(prober.clone(), clock.clone(), Duration::from_secs(60));
        let mut tenant = tenant(&["http://a.test"]);
        tenant.interval_seconds = 10;

        cache.get_or_probe_all(&tenant).await;
        clock.advance(Duration::from_secs(10));
        cache.get_or_probe_all(&tenant).await;

        assert_eq!(prober.calls(), 2);
    }

    #[tokio::test]
    async fn test_changed_endpoint_set_is_not_served_from_cache() {
        let prober = Arc::new(CountingProber::new(Duration::ZERO));
        let cache = TenantCheckCache::new(
            prober.clone(),
            Arc::new(ManualClock::new()),
            Duration::from_secs(60),
        );

        cache.get_or_probe_all(&tenant(&["http://a.test"])).await;
        let result = cache.get_or_probe_all(&tenant(&["http://a.test", "http://b.test"])).await;

        assert_eq!(prober.calls(), 3);
        assert!(result.contains_key("http://b.test"));
    }

    #[tokio::test]
    async fn test_tenants_are_cached_independently() {
        let prober = Arc::new(CountingProber::new(Duration::ZERO));
        let cache = TenantCheckCache::new(
            prober.clone(),
            Arc::new(ManualClock::new()),
            Duration::from_secs(60),
        );
        let first = tenant(&["http://a.test"]);
        let mut second = first.clone();
        second.id = TenantId(8);

        cache.get_or_probe_all(&first).await;
        cache.get_or_probe_all(&second).await;
        cache.get_or_probe_all(&first).await;
        cache.get_or_probe_all(&second).await;

        assert_eq!(prober.calls(), 2);
    }

    #[tokio::test]
    async fn test_longer_interval_does_not_extend_cached_batch() {
        let prober = Arc::new(CountingProber::new(Duration::ZERO));
        let clock = Arc::new(ManualClock::new());
        let cache = TenantCheckCache::new(prober.clone(), clock.clone(), Duration::from_secs(60));
        let mut tenant = tenant(&["http://a.test"]);
        tenant.interval_seconds = 10;

        cache.get_or_probe_all(&tenant).await;
        tenant.interval_seconds = 100;
        clock.advance(Duration::from_secs(10));
        cache.get_or_probe_all(&tenant).await;

        assert_eq!(prober.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_tenant_yields_empty_batch() {
        let prober = Arc::new(CountingProber::new(Duration::ZERO));
        let cache = TenantCheckCache::new(
            prober.clone(),
            Arc::new(ManualClock::new()),
            Duration::from_secs(60),
        );

        assert!(cache.get_or_probe_all(&tenant(&[])).await.is_empty());
        assert_eq!(prober.calls(), 0);
    }
}

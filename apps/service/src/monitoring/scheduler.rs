use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::cache::{Clock, TenantCheckCache};
use super::tracker::StatusTracker;
use super::types::{CycleReport, EndpointKey, Tenant, TenantId, effective_interval};
use crate::database::repository::DEFAULT_INTERVAL_SECONDS;
use crate::database::{DowntimeLedger, StoreResult, TenantStore};
use crate::notifier::{FormatHint, NotificationSink, compose_transition_message};

/// Scheduler tuning
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Lower bound for a tenant's interval
    pub min_interval_seconds: u64,

    /// How often the tenant list is polled for newly registered tenants
    pub reconcile_interval: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self { min_interval_seconds: 1, reconcile_interval: Duration::from_secs(5) }
    }
}

/// Monitoring scheduler - runs one check/sleep loop per tenant
pub struct MonitoringScheduler {
    store: Arc<dyn TenantStore>,
    ledger: Arc<dyn DowntimeLedger>,
    cache: Arc<TenantCheckCache>,
    tracker: Arc<StatusTracker>,
    sink: Arc<dyn NotificationSink>,
    settings: SchedulerSettings,
    clock: Arc<dyn Clock>,
    /// Start of each tenant's previous evaluation
    last_evaluated: Mutex<HashMap<TenantId, Instant>>,
}

impl MonitoringScheduler {
    pub fn new(
        store: Arc<dyn TenantStore>,
        ledger: Arc<dyn DowntimeLedger>,
        cache: Arc<TenantCheckCache>,
        tracker: Arc<StatusTracker>,
        sink: Arc<dyn NotificationSink>,
        settings: SchedulerSettings,
    ) -> Self {
        let clock = cache.clock();
        Self {
            store,
            ledger,
            cache,
            tracker,
            sink,
            settings,
            clock,
            last_evaluated: Mutex::new(HashMap::new()),
        }
    }

    /// Interval slept after a cycle; also the downtime of a first observation
    pub fn interval_for(&self, tenant: &Tenant) -> Duration {
        effective_interval(tenant.interval_seconds, self.settings.min_interval_seconds)
    }

    /// Evaluate one cycle of a tenant: probe (through the cache), detect
    /// transitions, notify, and account downtime.
    ///
    /// Every unreachable endpoint accrues the time since the tenant's previous
    /// evaluation; the first evaluation accrues one interval. Transitions are
    /// handled for the whole batch before the ledger is written, and a ledger
    /// failure does not stop the remaining writes. The first one is returned.
    pub async fn evaluate_tenant(&self, tenant: &Tenant) -> StoreResult<CycleReport> {
        let elapsed = self.elapsed_since_previous(tenant);
        let results = self.cache.get_or_probe_all(tenant).await;
        let mut report = CycleReport { checked: results.len(), ..CycleReport::default() };

        for (url, outcome) in &results {
            let key = EndpointKey::new(tenant.id, url.clone());
            let update = self.tracker.update(key, outcome.reachable, &outcome.reason);
            if !update.transitioned {
                continue;
            }

            info!(
                tenant = %tenant.id,
                url = %url,
                reachable = outcome.reachable,
                reason = %outcome.reason,
                "Endpoint status changed"
            );

            let message = compose_transition_message(url, outcome);
            if let Err(e) = self.sink.send(tenant.id, &message, FormatHint::Html).await {
                warn!(tenant = %tenant.id, url = %url, error = %e, "Failed to send notification");
            }
            report.notifications += 1;
        }

        let mut failure = None;
        for (url, _) in results.iter().filter(|(_, outcome)| !outcome.reachable) {
            match self.ledger.record_downtime(tenant.id, url, elapsed).await {
                Ok(()) => report.downtime_writes += 1,
                Err(e) => {
                    warn!(tenant = %tenant.id, url = %url, error = %e, "Failed to record downtime");
                    failure.get_or_insert(e);
                }
            }
        }

        debug!(
            tenant = %tenant.id,
            checked = report.checked,
            notifications = report.notifications,
            elapsed_secs = elapsed.as_secs_f64(),
            "Cycle evaluated"
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Time since the previous evaluation of `tenant`, or one interval if
    /// there was none. Marks now as the latest evaluation.
    fn elapsed_since_previous(&self, tenant: &Tenant) -> Duration {
        let now = self.clock.now();
        let mut last = self.last_evaluated.lock().unwrap_or_else(|e| e.into_inner());

        match last.insert(tenant.id, now) {
            Some(previous) => now.saturating_duration_since(previous),
            None => self.interval_for(tenant),
        }
    }

    /// Run until `shutdown` flips to true.
    ///
    /// Polls the tenant store and gives every tenant its own task, so a slow
    /// tenant never delays another tenant's cadence.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let mut tasks: HashMap<TenantId, JoinHandle<()>> = HashMap::new();
        let mut stop = shutdown.clone();

        info!("Monitoring scheduler started");

        loop {
            match self.store.list_tenants().await {
                Ok(tenants) => {
                    tasks.retain(|_, handle| !handle.is_finished());

                    for tenant in tenants {
                        if tasks.contains_key(&tenant.id) {
                            continue;
                        }
                        info!(tenant = %tenant.id, endpoints = tenant.endpoints.len(), "Scheduling tenant");
                        let handle = Arc::clone(&self).schedule_tenant(tenant.id, shutdown.clone());
                        tasks.insert(tenant.id, handle);
                    }
                }
                Err(e) => warn!(error = %e, "Failed to list tenants, retrying"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.reconcile_interval) => {}
                _ = shutdown_requested(&mut stop) => break,
            }
        }

        for (tenant, handle) in tasks {
            if let Err(e) = handle.await {
                warn!(%tenant, error = %e, "Tenant task ended abnormally");
            }
        }

        info!("Monitoring scheduler stopped");
    }

    /// Spawn the check/sleep loop of one tenant
    pub fn schedule_tenant(
        self: Arc<Self>,
        tenant: TenantId,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut delay = effective_interval(DEFAULT_INTERVAL_SECONDS, self.settings.min_interval_seconds);

            loop {
                let next = tokio::select! {
                    next = self.run_cycle(tenant, delay) => next,
                    _ = shutdown_requested(&mut shutdown) => break,
                };

                let Some(next) = next else {
                    info!(%tenant, "Tenant no longer registered, stopping its loop");
                    break;
                };
                delay = next;

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_requested(&mut shutdown) => break,
                }
            }
        })
    }

    /// One cycle of a tenant. Returns the delay until the next cycle, or
    /// `None` if the tenant disappeared from the store.
    async fn run_cycle(&self, tenant: TenantId, last_delay: Duration) -> Option<Duration> {
        let tenant = match self.store.get_tenant(tenant).await {
            Ok(Some(tenant)) => tenant,
            Ok(None) => {
                self.last_evaluated.lock().unwrap_or_else(|e| e.into_inner()).remove(&tenant);
                return None;
            }
            Err(e) => {
                warn!(%tenant, error = %e, "Failed to load tenant, skipping cycle");
                return Some(last_delay);
            }
        };

        if let Err(e) = self.evaluate_tenant(&tenant).await {
            warn!(tenant = %tenant.id, error = %e, "Store failure during cycle, skipping");
        }

        Some(self.interval_for(&tenant))
    }
}

/// Resolves once shutdown was requested or the sender is gone
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

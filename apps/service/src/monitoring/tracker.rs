use std::collections::HashMap;
use std::sync::Mutex;

use super::types::{EndpointKey, StatusRecord, StatusUpdate, TenantId};

/// Last known reachability per (tenant, endpoint), used to detect transitions.
///
/// State is process local. After a restart the first observation of each
/// endpoint only re-establishes the baseline.
#[derive(Debug, Default)]
pub struct StatusTracker {
    records: Mutex<HashMap<EndpointKey, StatusRecord>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation and report whether reachability changed.
    ///
    /// The first observation of a key never counts as a transition. The
    /// stored reason is always replaced so it follows the latest failure.
    pub fn update(&self, key: EndpointKey, reachable: bool, reason: &str) -> StatusUpdate {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let record = StatusRecord { reachable, reason: reason.to_string() };

        match records.insert(key, record) {
            None => StatusUpdate { transitioned: false, previous: None },
            Some(previous) => StatusUpdate {
                transitioned: previous.reachable != reachable,
                previous: Some(previous.reachable),
            },
        }
    }

    pub fn get(&self, key: &EndpointKey) -> Option<StatusRecord> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.get(key).cloned()
    }

    /// Known statuses of one tenant, sorted by URL
    pub fn snapshot(&self, tenant: TenantId) -> Vec<(String, StatusRecord)> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let mut statuses: Vec<_> = records
            .iter()
            .filter(|(key, _)| key.tenant == tenant)
            .map(|(key, record)| (key.url.clone(), record.clone()))
            .collect();
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        statuses
    }
}

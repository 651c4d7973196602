use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::monitoring::types::TenantId;

/// Endpoint model - a URL registered by a tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub id: Option<i64>,
    pub tenant_id: TenantId,
    /// Display name, metadata only
    pub name: Option<String>,
    pub url: String,
    pub created_at: SystemTime,
}

impl Endpoint {
    pub fn new(tenant_id: TenantId, url: String, name: Option<String>) -> Self {
        Self { id: None, tenant_id, name, url, created_at: SystemTime::now() }
    }
}

/// DowntimeEntry model - one row of the downtime ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DowntimeEntry {
    pub tenant_id: TenantId,
    pub url: String,
    pub downtime: Duration,
    pub updated_at: SystemTime,
}

/// Convert SystemTime to Unix timestamp
pub fn timestamp_to_i64(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// Convert Unix timestamp to SystemTime
pub fn i64_to_timestamp(timestamp: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(timestamp.max(0) as u64)
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifier of a tenant (the chat that registered the endpoints)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantId(pub i64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite key of a monitored endpoint: the owning tenant plus the URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey {
    pub tenant: TenantId,
    pub url: String,
}

impl EndpointKey {
    pub fn new(tenant: TenantId, url: impl Into<String>) -> Self {
        Self { tenant, url: url.into() }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tenant, self.url)
    }
}

/// A tenant as the scheduler sees it for one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub id: TenantId,

    /// Interval exactly as stored. Signed so a bad value still reaches the
    /// scheduler clamp instead of failing to load.
    pub interval_seconds: i64,

    /// Registered endpoint URLs
    pub endpoints: Vec<String>,
}

impl Tenant {
    pub fn new(id: TenantId, interval_seconds: i64, endpoints: Vec<String>) -> Self {
        Self { id, interval_seconds, endpoints }
    }
}

/// Clamp a raw interval to at least `min_seconds` (itself at least 1).
pub fn effective_interval(raw_seconds: i64, min_seconds: u64) -> Duration {
    let min = min_seconds.max(1);
    let secs = u64::try_from(raw_seconds).unwrap_or(0).max(min);
    Duration::from_secs(secs)
}

/// Which HTTP responses count as "reachable"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessPolicy {
    /// Only HTTP 200
    #[default]
    Strict,
    /// Any status below 400
    NonError,
    /// Any completed HTTP exchange
    AnyResponse,
}

impl SuccessPolicy {
    pub fn accepts(self, status: u16) -> bool {
        match self {
            SuccessPolicy::Strict => status == 200,
            SuccessPolicy::NonError => status < 400,
            SuccessPolicy::AnyResponse => true,
        }
    }
}

impl fmt::Display for SuccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuccessPolicy::Strict => write!(f, "strict"),
            SuccessPolicy::NonError => write!(f, "non_error"),
            SuccessPolicy::AnyResponse => write!(f, "any_response"),
        }
    }
}

/// Result of probing one URL. Transport failures are data, never errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub reachable: bool,

    /// Failure description, empty when reachable
    pub reason: String,

    /// HTTP status code when a response was received
    pub status_code: Option<u16>,
}

impl ProbeOutcome {
    pub fn up(status_code: u16) -> Self {
        Self { reachable: true, reason: String::new(), status_code: Some(status_code) }
    }

    pub fn down(reason: impl Into<String>) -> Self {
        Self { reachable: false, reason: reason.into(), status_code: None }
    }

    /// Unreachable because the policy rejected the status code
    pub fn rejected(status_code: u16, reason: impl Into<String>) -> Self {
        Self { reachable: false, reason: reason.into(), status_code: Some(status_code) }
    }

    /// "status code or error" as shown to a user
    pub fn detail(&self) -> String {
        match (self.reachable, self.status_code) {
            (true, Some(code)) => format!("status code {code}"),
            (true, None) => "reachable".to_string(),
            (false, _) => self.reason.clone(),
        }
    }
}

/// Last known status of one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    pub reachable: bool,
    pub reason: String,
}

/// What `StatusTracker::update` observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub transitioned: bool,
    pub previous: Option<bool>,
}

/// Summary of one evaluated cycle of a tenant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: usize,
    pub notifications: usize,
    pub downtime_writes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_interval_clamps() {
        assert_eq!(effective_interval(30, 1), Duration::from_secs(30));
        assert_eq!(effective_interval(0, 1), Duration::from_secs(1));
        assert_eq!(effective_interval(-5, 1), Duration::from_secs(1));
        assert_eq!(effective_interval(-5, 0), Duration::from_secs(1));
        assert_eq!(effective_interval(3, 10), Duration::from_secs(10));
    }

    #[test]
    fn test_success_policies() {
        assert!(SuccessPolicy::Strict.accepts(200));
        assert!(!SuccessPolicy::Strict.accepts(204));
        assert!(!SuccessPolicy::Strict.accepts(301));

        assert!(SuccessPolicy::NonError.accepts(204));
        assert!(SuccessPolicy::NonError.accepts(302));
        assert!(!SuccessPolicy::NonError.accepts(404));

        assert!(SuccessPolicy::AnyResponse.accepts(503));
    }

    #[test]
    fn test_endpoint_key_equality() {
        let a = EndpointKey::new(TenantId(1), "http://a.test");
        let b = EndpointKey::new(TenantId(1), String::from("http://a.test"));
        let c = EndpointKey::new(TenantId(2), "http://a.test");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_outcome_detail() {
        assert_eq!(ProbeOutcome::up(200).detail(), "status code 200");
        assert_eq!(ProbeOutcome::down("connection refused").detail(), "connection refused");
    }
}

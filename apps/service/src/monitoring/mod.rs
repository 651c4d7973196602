/// Monitoring engine module
///
/// This module is responsible for:
/// - Probing HTTP/HTTPS endpoints
/// - Memoizing a tenant's batch of probes (single-flight per tenant)
/// - Detecting reachability transitions
/// - Scheduling one check/sleep loop per tenant
pub mod cache;
pub mod checker;
pub mod scheduler;
pub mod tracker;
pub mod types;


pub use cache::{Clock, ManualClock, TenantCheckCache, TokioClock};
pub use checker::{HttpProber, Prober};
pub use scheduler::{MonitoringScheduler, SchedulerSettings};
pub use tracker::StatusTracker;
pub use types::{EndpointKey, ProbeOutcome, SuccessPolicy, Tenant, TenantId};

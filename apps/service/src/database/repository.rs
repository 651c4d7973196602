use async_trait::async_trait;
use libsql::params;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use super::error::{StoreError, StoreResult};
use super::models::{DowntimeEntry, Endpoint, i64_to_timestamp, timestamp_to_i64};
use crate::monitoring::types::{Tenant, TenantId};
use crate::pool::{LibsqlManager, LibsqlPool};

/// Interval given to tenants on first contact
pub const DEFAULT_INTERVAL_SECONDS: i64 = 30;

/// Tenants, their interval and their endpoints
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Every known tenant with its current endpoint set and interval
    async fn list_tenants(&self) -> StoreResult<Vec<Tenant>>;

    /// One tenant, fresh from the store
    async fn get_tenant(&self, tenant: TenantId) -> StoreResult<Option<Tenant>>;

    /// Register a tenant with the default interval unless it already exists
    async fn ensure_tenant(&self, tenant: TenantId) -> StoreResult<()>;

    /// Store the check interval, creating the tenant if needed
    async fn set_interval(&self, tenant: TenantId, seconds: i64) -> StoreResult<()>;

    async fn get_interval(&self, tenant: TenantId) -> StoreResult<Option<i64>>;

    /// Register an endpoint. Returns `false` if the URL was already registered.
    async fn add_endpoint(&self, endpoint: &Endpoint) -> StoreResult<bool>;

    /// Unregister an endpoint. Returns whether anything was removed.
    async fn remove_endpoint(&self, tenant: TenantId, url: &str) -> StoreResult<bool>;

    async fn list_endpoints(&self, tenant: TenantId) -> StoreResult<Vec<Endpoint>>;
}

/// Durable cumulative downtime per (tenant, url)
#[async_trait]
pub trait DowntimeLedger: Send + Sync {
    /// Add `increment` to the stored total, creating the entry at zero first.
    async fn record_downtime(
        &self,
        tenant: TenantId,
        url: &str,
        increment: Duration,
    ) -> StoreResult<()>;

    /// Total downtime, zero for pairs never written
    async fn get_cumulative(&self, tenant: TenantId, url: &str) -> StoreResult<Duration>;

    /// Full ledger rows of a tenant, including endpoints removed since
    async fn entries_for_tenant(&self, tenant: TenantId) -> StoreResult<Vec<DowntimeEntry>>;

    async fn get_all_for_tenant(&self, tenant: TenantId) -> StoreResult<BTreeMap<String, Duration>> {
        Ok(self
            .entries_for_tenant(tenant)
            .await?
            .into_iter()
            .map(|entry| (entry.url, entry.downtime))
            .collect())
    }
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
    default_interval: i64,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool, default_interval: DEFAULT_INTERVAL_SECONDS }
    }

    /// Interval given to tenants created implicitly
    pub fn with_default_interval(mut self, seconds: i64) -> Self {
        self.default_interval = seconds;
        self
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> StoreResult<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }
}

fn seconds_to_i64(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

fn i64_to_seconds(value: i64) -> Duration {
    Duration::from_secs(u64::try_from(value).unwrap_or(0))
}

#[async_trait]
impl TenantStore for DatabaseImpl {
    async fn list_tenants(&self) -> StoreResult<Vec<Tenant>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT t.tenant_id, t.interval_seconds, e.url FROM tenants AS t LEFT JOIN endpoints AS e ON e.tenant_id = t.tenant_id ORDER BY t.tenant_id, e.url",
                (),
            )
            .await?;

        let mut tenants: Vec<Tenant> = Vec::new();
        while let Some(row) = rows.next().await? {
            let id = TenantId(row.get::<i64>(0)?);
            let interval_seconds: i64 = row.get(1)?;
            let url: Option<String> = row.get(2)?;

            match tenants.last_mut() {
                Some(tenant) if tenant.id == id => tenant.endpoints.extend(url),
                _ => tenants.push(Tenant::new(id, interval_seconds, url.into_iter().collect())),
            }
        }

        Ok(tenants)
    }

    async fn get_tenant(&self, tenant: TenantId) -> StoreResult<Option<Tenant>> {
        let Some(interval_seconds) = self.get_interval(tenant).await? else {
            return Ok(None);
        };

        let endpoints = self.list_endpoints(tenant).await?.into_iter().map(|e| e.url).collect();
        Ok(Some(Tenant::new(tenant, interval_seconds, endpoints)))
    }

    async fn ensure_tenant(&self, tenant: TenantId) -> StoreResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT OR IGNORE INTO tenants (tenant_id, interval_seconds, created_at) VALUES (?, ?, ?)",
            params![tenant.0, self.default_interval, timestamp_to_i64(SystemTime::now())],
        )
        .await?;
        Ok(())
    }

    async fn set_interval(&self, tenant: TenantId, seconds: i64) -> StoreResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO tenants (tenant_id, interval_seconds, created_at) VALUES (?, ?, ?)
             ON CONFLICT(tenant_id) DO UPDATE SET interval_seconds = excluded.interval_seconds",
            params![tenant.0, seconds, timestamp_to_i64(SystemTime::now())],
        )
        .await?;
        Ok(())
    }

    async fn get_interval(&self, tenant: TenantId) -> StoreResult<Option<i64>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query("SELECT interval_seconds FROM tenants WHERE tenant_id = ?", params![tenant.0])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    async fn add_endpoint(&self, endpoint: &Endpoint) -> StoreResult<bool> {
        self.ensure_tenant(endpoint.tenant_id).await?;

        let conn = self.get_conn().await?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO endpoints (tenant_id, name, url, created_at) VALUES (?, ?, ?, ?)",
                params![
                    endpoint.tenant_id.0,
                    endpoint.name.clone(),
                    endpoint.url.clone(),
                    timestamp_to_i64(endpoint.created_at)
                ],
            )
            .await?;

        Ok(inserted > 0)
    }

    async fn remove_endpoint(&self, tenant: TenantId, url: &str) -> StoreResult<bool> {
        let conn = self.get_conn().await?;
        let removed = conn
            .execute(
                "DELETE FROM endpoints WHERE tenant_id = ? AND url = ?",
                params![tenant.0, url],
            )
            .await?;

        Ok(removed > 0)
    }

    async fn list_endpoints(&self, tenant: TenantId) -> StoreResult<Vec<Endpoint>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, name, url, created_at FROM endpoints WHERE tenant_id = ? ORDER BY url",
                params![tenant.0],
            )
            .await?;

        let mut endpoints = Vec::new();
        while let Some(row) = rows.next().await? {
            endpoints.push(Endpoint {
                id: Some(row.get(0)?),
                tenant_id: tenant,
                name: row.get(1)?,
                url: row.get(2)?,
                created_at: i64_to_timestamp(row.get(3)?),
            });
        }

        Ok(endpoints)
    }
}

#[async_trait]
impl DowntimeLedger for DatabaseImpl {
    async fn record_downtime(
        &self,
        tenant: TenantId,
        url: &str,
        increment: Duration,
    ) -> StoreResult<()> {
        let conn = self.get_conn().await?;

        // Single statement, so concurrent increments of one key serialize in SQLite
        conn.execute(
            "INSERT INTO downtime_logs (tenant_id, url, downtime_seconds, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(tenant_id, url) DO UPDATE SET
                downtime_seconds = downtime_seconds + excluded.downtime_seconds,
                updated_at = excluded.updated_at",
            params![
                tenant.0,
                url,
                seconds_to_i64(increment),
                timestamp_to_i64(SystemTime::now())
            ],
        )
        .await?;

        Ok(())
    }

    async fn get_cumulative(&self, tenant: TenantId, url: &str) -> StoreResult<Duration> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT downtime_seconds FROM downtime_logs WHERE tenant_id = ? AND url = ?",
                params![tenant.0, url],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(i64_to_seconds(row.get(0)?)),
            None => Ok(Duration::ZERO),
        }
    }

    async fn entries_for_tenant(&self, tenant: TenantId) -> StoreResult<Vec<DowntimeEntry>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT url, downtime_seconds, updated_at FROM downtime_logs WHERE tenant_id = ? ORDER BY url",
                params![tenant.0],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            let downtime: i64 = row.get(1)?;
            if downtime < 0 {
                return Err(StoreError::Decode(format!("negative downtime for tenant {tenant}")));
            }

            entries.push(DowntimeEntry {
                tenant_id: tenant,
                url: row.get(0)?,
                downtime: i64_to_seconds(downtime),
                updated_at: i64_to_timestamp(row.get(2)?),
            });
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::create_pool;
    use std::sync::Arc;
    use tempfile::{TempDir, tempdir};

    /// Helper to create a migrated test database. Keep the TempDir alive.
    async fn create_test_database() -> (DatabaseImpl, TempDir) {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let pool = create_pool(&db_path).await.unwrap();
        let conn = pool.get().await.unwrap();
        crate::database::initialize_database(&conn).await.unwrap();
        drop(conn);

        (DatabaseImpl::new_from_pool(pool), temp_dir)
    }

    #[tokio::test]
    async fn test_configured_default_interval() {
        let (db, _dir) = create_test_database().await;
        let db = db.with_default_interval(300);

        db.ensure_tenant(TenantId(9)).await.unwrap();
        assert_eq!(db.get_interval(TenantId(9)).await.unwrap(), Some(300));
    }

    fn endpoint(tenant: i64, url: &str) -> Endpoint {
        Endpoint::new(TenantId(tenant), url.to_string(), None)
    }

    #[tokio::test]
    async fn test_tenant_defaults_and_interval() {
        let (db, _dir) = create_test_database().await;

        assert_eq!(db.get_interval(TenantId(1)).await.unwrap(), None);

        db.ensure_tenant(TenantId(1)).await.unwrap();
        assert_eq!(db.get_interval(TenantId(1)).await.unwrap(), Some(DEFAULT_INTERVAL_SECONDS));

        db.set_interval(TenantId(1), 120).await.unwrap();
        db.ensure_tenant(TenantId(1)).await.unwrap();
        assert_eq!(db.get_interval(TenantId(1)).await.unwrap(), Some(120));

        db.set_interval(TenantId(2), 45).await.unwrap();
        assert_eq!(db.get_interval(TenantId(2)).await.unwrap(), Some(45));
    }

    #[tokio::test]
    async fn test_endpoints_crud() {
        let (db, _dir) = create_test_database().await;

        assert!(db.add_endpoint(&endpoint(1, "http://b.test")).await.unwrap());
        assert!(db.add_endpoint(&endpoint(1, "http://a.test")).await.unwrap());
        assert!(!db.add_endpoint(&endpoint(1, "http://a.test")).await.unwrap());

        let urls: Vec<_> =
            db.list_endpoints(TenantId(1)).await.unwrap().into_iter().map(|e| e.url).collect();
        assert_eq!(urls, vec!["http://a.test", "http://b.test"]);

        assert!(db.remove_endpoint(TenantId(1), "http://a.test").await.unwrap());
        assert!(!db.remove_endpoint(TenantId(1), "http://a.test").await.unwrap());
        assert_eq!(db.list_endpoints(TenantId(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_tenants_groups_endpoints() {
        let (db, _dir) = create_test_database().await;

        db.add_endpoint(&endpoint(1, "http://a.test")).await.unwrap();
        db.add_endpoint(&endpoint(1, "http://b.test")).await.unwrap();
        db.ensure_tenant(TenantId(2)).await.unwrap();
        db.set_interval(TenantId(3), -5).await.unwrap();
        db.add_endpoint(&endpoint(3, "http://c.test")).await.unwrap();

        let tenants = db.list_tenants().await.unwrap();
        assert_eq!(tenants.len(), 3);
        assert_eq!(tenants[0].endpoints, vec!["http://a.test", "http://b.test"]);
        assert!(tenants[1].endpoints.is_empty());
        assert_eq!(tenants[2].interval_seconds, -5);

        let fresh = db.get_tenant(TenantId(1)).await.unwrap().unwrap();
        assert_eq!(fresh, tenants[0]);
        assert!(db.get_tenant(TenantId(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ledger_reads_zero_for_unknown_pairs() {
        let (db, _dir) = create_test_database().await;

        assert_eq!(db.get_cumulative(TenantId(1), "http://a.test").await.unwrap(), Duration::ZERO);
        assert!(db.get_all_for_tenant(TenantId(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ledger_accumulates() {
        let (db, _dir) = create_test_database().await;
        let tenant = TenantId(1);

        db.record_downtime(tenant, "http://a.test", Duration::from_secs(10)).await.unwrap();
        db.record_downtime(tenant, "http://a.test", Duration::from_secs(30)).await.unwrap();
        db.record_downtime(tenant, "http://b.test", Duration::from_secs(5)).await.unwrap();
        db.record_downtime(TenantId(2), "http://a.test", Duration::from_secs(7)).await.unwrap();

        assert_eq!(db.get_cumulative(tenant, "http://a.test").await.unwrap(), Duration::from_secs(40));

        let all = db.get_all_for_tenant(tenant).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["http://b.test"], Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_ledger_concurrent_increments() {
        let (db, _dir) = create_test_database().await;
        let db = Arc::new(db);

        let writes = (0..20).map(|_| {
            let db = Arc::clone(&db);
            async move {
                db.record_downtime(TenantId(1), "http://a.test", Duration::from_secs(3)).await
            }
        });
        for result in futures::future::join_all(writes).await {
            result.unwrap();
        }

        assert_eq!(
            db.get_cumulative(TenantId(1), "http://a.test").await.unwrap(),
            Duration::from_secs(60)
        );
    }

    #[tokio::test]
    async fn test_removed_endpoint_keeps_ledger_entry() {
        let (db, _dir) = create_test_database().await;

        db.add_endpoint(&endpoint(1, "http://a.test")).await.unwrap();
        db.record_downtime(TenantId(1), "http://a.test", Duration::from_secs(15)).await.unwrap();
        db.remove_endpoint(TenantId(1), "http://a.test").await.unwrap();

        let entries = db.entries_for_tenant(TenantId(1)).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].downtime, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let (db, _dir) = create_test_database().await;
        db.record_downtime(TenantId(1), "http://a.test", Duration::from_secs(1)).await.unwrap();

        let conn = db.get_conn().await.unwrap();
        crate::database::initialize_database(&conn).await.unwrap();

        assert_eq!(db.get_cumulative(TenantId(1), "http://a.test").await.unwrap(), Duration::from_secs(1));
    }
}

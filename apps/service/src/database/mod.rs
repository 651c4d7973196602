/// Database abstraction layer
///
/// Tenants, their endpoints and the downtime ledger live in LibSQL
/// (SQLite). The schema is migrated once at startup; the repository code
/// assumes the tables exist.

pub mod error;
pub mod migrations;
pub mod models;
pub mod repository;

pub use error::{StoreError, StoreResult};
pub use repository::{DatabaseImpl, DowntimeLedger, TenantStore};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}

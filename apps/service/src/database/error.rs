use thiserror::Error;

/// Failures of the persistent stores (tenant store and downtime ledger)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database query failed: {0}")]
    QueryFailure(#[from] libsql::Error),

    #[error("Database connection unavailable: {0}")]
    Pool(#[from] deadpool::managed::PoolError<libsql::Error>),

    #[error("Malformed row: {0}")]
    Decode(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

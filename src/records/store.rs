// Collaborator interfaces: record store and audit sink
//
// Traits are mockable so each pipeline stage can be tested in isolation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{AuditEntry, LifecycleState, VoucherRecord};
use crate::extraction::VoucherCode;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store connection failed: {0}")]
    Connection(String),
    #[error("record store query failed: {0}")]
    Query(String),
    #[error("stored record is malformed: {0}")]
    Corrupt(String),
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Connection(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(err.to_string())
            }
            other => StoreError::Query(other.to_string()),
        }
    }
}

/// Result of the store's atomic re-check-and-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified {
        record_id: i64,
        verified_at: DateTime<Utc>,
    },
    AlreadyVerified {
        verified_by: Option<String>,
        verified_at: Option<DateTime<Utc>>,
    },
    InvalidState(LifecycleState),
    NotFound,
}

#[derive(Debug, Error)]
#[error("audit append failed: {0}")]
pub struct AuditError(pub String);

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait VoucherStore: Send + Sync {
    /// Hydrated voucher for `code`, or `None` when no voucher has it.
    async fn get_by_code(&self, code: &VoucherCode) -> Result<Option<VoucherRecord>, StoreError>;

    /// Atomically re-check that the voucher is issued and unverified, then
    /// mark it verified by `actor_id` with a store-assigned timestamp.
    async fn verify(&self, code: &VoucherCode, actor_id: &str) -> Result<VerifyOutcome, StoreError>;
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

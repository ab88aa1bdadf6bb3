// In-memory record store and audit sink

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use super::store::{AuditError, AuditSink, StoreError, VerifyOutcome, VoucherStore};
use super::types::{AuditEntry, LifecycleState, VoucherRecord};
use crate::extraction::VoucherCode;

/// Store backed by a mutex-guarded map. The mutex is the store-level lock
/// under which `verify` re-checks and mutates.
#[derive(Debug, Default)]
pub struct InMemoryVoucherStore {
    records: Mutex<HashMap<VoucherCode, VoucherRecord>>,
    audit_log: Mutex<Vec<AuditEntry>>,
}

impl InMemoryVoucherStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = VoucherRecord>,
    {
        let records = records
            .into_iter()
            .map(|record| (record.code.clone(), record))
            .collect();
        Self {
            records: Mutex::new(records),
            audit_log: Mutex::new(Vec::new()),
        }
    }

    pub async fn insert(&self, record: VoucherRecord) {
        self.records.lock().await.insert(record.code.clone(), record);
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Snapshot of the audit log in append order.
    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit_log.lock().await.clone()
    }
}

#[async_trait]
impl VoucherStore for InMemoryVoucherStore {
    async fn get_by_code(&self, code: &VoucherCode) -> Result<Option<VoucherRecord>, StoreError> {
        Ok(self.records.lock().await.get(code).cloned())
    }

    async fn verify(&self, code: &VoucherCode, actor_id: &str) -> Result<VerifyOutcome, StoreError> {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(code) else {
            return Ok(VerifyOutcome::NotFound);
        };

        if record.verified {
            return Ok(VerifyOutcome::AlreadyVerified {
                verified_by: record.verified_by.clone(),
                verified_at: record.verified_at,
            });
        }
        if record.state != LifecycleState::Issued {
            return Ok(VerifyOutcome::InvalidState(record.state));
        }

        let verified_at = Utc::now();
        record.verified = true;
        record.state = LifecycleState::Verified;
        record.verified_by = Some(actor_id.to_string());
        record.verified_at = Some(verified_at);
        debug!(code = %code, actor_id, "Voucher marked verified in memory");

        Ok(VerifyOutcome::Verified {
            record_id: record.id,
            verified_at,
        })
    }
}

#[async_trait]
impl AuditSink for InMemoryVoucherStore {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.audit_log.lock().await.push(entry);
        Ok(())
    }
}

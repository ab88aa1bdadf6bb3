// Record resolver: code -> fully hydrated voucher record

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::VerificationError;
use crate::extraction::VoucherCode;
use crate::records::{VoucherRecord, VoucherStore};

#[derive(Clone)]
pub struct RecordResolver {
    store: Arc<dyn VoucherStore>,
}

impl RecordResolver {
    pub fn new(store: Arc<dyn VoucherStore>) -> Self {
        Self { store }
    }

    /// Look up the voucher by code. A missing voucher is `NotFound`; a store
    /// failure is `StoreUnavailable` and never reported as `NotFound`.
    pub async fn resolve(&self, code: &VoucherCode) -> Result<VoucherRecord, VerificationError> {
        match self.store.get_by_code(code).await {
            Ok(Some(record)) => {
                debug!(code = %code, record_id = record.id, state = %record.state, "Voucher resolved");
                Ok(record)
            }
            Ok(None) => Err(VerificationError::NotFound { code: code.clone() }),
            Err(e) => {
                warn!(code = %code, error = %e, "Record store lookup failed");
                Err(VerificationError::StoreUnavailable {
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::test_support::issued_record;
    use crate::records::{InMemoryVoucherStore, MockVoucherStore, StoreError};

    #[tokio::test]
    async fn test_resolve_existing_record() {
        let store = InMemoryVoucherStore::with_records(vec![issued_record("CP-143-00001", Some(2))]);
        let resolver = RecordResolver::new(Arc::new(store));
        let code = VoucherCode::parse("CP-143-00001").unwrap();

        let record = resolver.resolve(&code).await.unwrap();
        assert_eq!(record.code, code);
        assert_eq!(record.operator.association_id, Some(2));
        assert_eq!(record.material_lines.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let resolver = RecordResolver::new(Arc::new(InMemoryVoucherStore::new()));
        let code = VoucherCode::parse("CP-143-00404").unwrap();

        let err = resolver.resolve(&code).await.unwrap_err();
        assert_eq!(err.kind(), "not-found");
    }

    #[tokio::test]
    async fn test_store_failure_is_not_reported_as_missing() {
        let mut store = MockVoucherStore::new();
        store
            .expect_get_by_code()
            .returning(|_| Err(StoreError::Connection("connection refused".to_string())));
        let resolver = RecordResolver::new(Arc::new(store));
        let code = VoucherCode::parse("CP-143-00001").unwrap();

        let err = resolver.resolve(&code).await.unwrap_err();
        assert_eq!(err.kind(), "store-unavailable");
        assert!(err.is_retryable());
    }
}

// Transition committer: atomic Issued -> Verified plus best-effort audit

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{AuthorizationError, VerificationError};
use crate::extraction::{ExtractionMethod, VoucherCode};
use crate::records::{AuditEntry, AuditSink, ClientMetadata, VerifyOutcome, VoucherStore};

/// Details recorded in the audit entry of a successful commit.
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub client: ClientMetadata,
    /// `None` for manual code entry
    pub method: Option<ExtractionMethod>,
    pub correlation_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitReceipt {
    pub record_id: i64,
    pub verified_at: DateTime<Utc>,
    /// Set when the state change landed but the audit entry could not be written
    pub audit_warning: Option<String>,
}

#[derive(Clone)]
pub struct TransitionCommitter {
    store: Arc<dyn VoucherStore>,
    audit: Arc<dyn AuditSink>,
}

impl TransitionCommitter {
    pub fn new(store: Arc<dyn VoucherStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Mark the voucher verified by `actor_id`. The store re-checks state
    /// atomically, so a concurrent verification yields `AlreadyVerified`
    /// here even if authorization passed. Audit failure never fails the
    /// commit.
    pub async fn commit(
        &self,
        code: &VoucherCode,
        actor_id: &str,
        audit: &AuditContext,
    ) -> Result<CommitReceipt, VerificationError> {
        let outcome = self
            .store
            .verify(code, actor_id)
            .await
            .map_err(|e| VerificationError::CommitFailed {
                code: code.clone(),
                reason: e.to_string(),
            })?;

        let (record_id, verified_at) = match outcome {
            VerifyOutcome::Verified {
                record_id,
                verified_at,
            } => (record_id, verified_at),
            VerifyOutcome::AlreadyVerified {
                verified_by,
                verified_at,
            } => {
                info!(code = %code, verified_by = ?verified_by, "Lost verification race");
                return Err(AuthorizationError::AlreadyVerified {
                    code: code.clone(),
                    verified_by,
                    verified_at,
                }
                .into());
            }
            VerifyOutcome::InvalidState(state) => {
                return Err(AuthorizationError::InvalidState {
                    code: code.clone(),
                    state,
                }
                .into());
            }
            VerifyOutcome::NotFound => {
                return Err(VerificationError::NotFound { code: code.clone() });
            }
        };

        let entry = AuditEntry::verification(
            record_id,
            actor_id,
            verified_at,
            &audit.client,
            audit.method,
            &audit.correlation_id,
        );

        let audit_warning = match self.audit.append(entry).await {
            Ok(()) => None,
            Err(e) => {
                warn!(code = %code, record_id, error = %e, "Audit entry not written");
                Some(format!("verification committed but audit entry was not recorded: {e}"))
            }
        };

        info!(code = %code, record_id, actor = %actor_id, "Voucher verified");
        Ok(CommitReceipt {
            record_id,
            verified_at,
            audit_warning,
        })
    }
}

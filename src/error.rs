// Error taxonomy of the verification pipeline
//
// Every failure maps to one stable kind tag that callers can branch on.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::extraction::VoucherCode;
use crate::records::LifecycleState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("document is {size} bytes, over the {limit} byte limit")]
    SizeExceeded { size: u64, limit: u64 },

    #[error("unsupported document type '{media_type}', expected {expected}")]
    UnsupportedFormat { media_type: String, expected: String },

    #[error("no voucher code found in the document text or its visual code")]
    NoCodeFound,
}

impl ExtractionError {
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionError::SizeExceeded { .. } => "size-exceeded",
            ExtractionError::UnsupportedFormat { .. } => "unsupported-format",
            ExtractionError::NoCodeFound => "no-code-found",
        }
    }
}

/// Reasons a resolved record may not be verified by an actor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("voucher {code} was already verified")]
    AlreadyVerified {
        code: VoucherCode,
        verified_by: Option<String>,
        verified_at: Option<DateTime<Utc>>,
    },

    #[error("voucher {code} is {state}; only issued vouchers can be verified")]
    InvalidState {
        code: VoucherCode,
        state: LifecycleState,
    },

    #[error("voucher {code} belongs to another association")]
    ForbiddenAssociation {
        code: VoucherCode,
        actor_association: Option<i64>,
        record_association: Option<i64>,
    },
}

impl AuthorizationError {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthorizationError::AlreadyVerified { .. } => "already-verified",
            AuthorizationError::InvalidState { .. } => "invalid-state",
            AuthorizationError::ForbiddenAssociation { .. } => "forbidden-association",
        }
    }
}

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("'{input}' is not a valid voucher code")]
    InvalidCode { input: String },

    #[error("no voucher found with code {code}")]
    NotFound { code: VoucherCode },

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error("verification of {code} could not be committed: {reason}")]
    CommitFailed { code: VoucherCode, reason: String },

    #[error("record store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("verification cancelled before {stage}")]
    Cancelled { stage: &'static str },

    #[error("pipeline invariant violated: {reason}")]
    Internal { reason: String },
}

impl VerificationError {
    /// Stable kebab-case tag for this failure.
    pub fn kind(&self) -> &'static str {
        match self {
            VerificationError::Extraction(e) => e.kind(),
            VerificationError::InvalidCode { .. } => "invalid-code",
            VerificationError::NotFound { .. } => "not-found",
            VerificationError::Authorization(e) => e.kind(),
            VerificationError::CommitFailed { .. } => "commit-failed",
            VerificationError::StoreUnavailable { .. } => "store-unavailable",
            VerificationError::Cancelled { .. } => "cancelled",
            VerificationError::Internal { .. } => "internal",
        }
    }

    /// Whether retrying the same request can succeed. Commits are safe to
    /// retry because the store re-checks state before mutating.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VerificationError::CommitFailed { .. } | VerificationError::StoreUnavailable { .. }
        )
    }

    pub fn to_report(&self) -> FailureReport {
        FailureReport {
            success: false,
            kind: self.kind(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        }
    }
}

/// Wire form of a failed verification.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub success: bool,
    pub kind: &'static str,
    pub message: String,
    pub retryable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> VoucherCode {
        VoucherCode::parse("CP-143-00001").unwrap()
    }

    #[test]
    fn test_kinds_are_stable() {
        let cases: Vec<(VerificationError, &str)> = vec![
            (ExtractionError::NoCodeFound.into(), "no-code-found"),
            (
                ExtractionError::SizeExceeded { size: 2, limit: 1 }.into(),
                "size-exceeded",
            ),
            (
                AuthorizationError::InvalidState {
                    code: code(),
                    state: LifecycleState::Paid,
                }
                .into(),
                "invalid-state",
            ),
            (VerificationError::NotFound { code: code() }, "not-found"),
            (VerificationError::Cancelled { stage: "resolving" }, "cancelled"),
        ];

        for (error, kind) in cases {
            assert_eq!(error.kind(), kind);
        }
    }

    #[test]
    fn test_only_commit_and_store_failures_are_retryable() {
        assert!(VerificationError::CommitFailed {
            code: code(),
            reason: "locked".to_string()
        }
        .is_retryable());
        assert!(!VerificationError::NotFound { code: code() }.is_retryable());
        assert!(!VerificationError::from(AuthorizationError::AlreadyVerified {
            code: code(),
            verified_by: None,
            verified_at: None,
        })
        .is_retryable());
    }

    #[test]
    fn test_failure_report_serializes_kind() {
        let report = VerificationError::from(ExtractionError::NoCodeFound).to_report();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["kind"], "no-code-found");
    }
}

// Voucher verification library
// Extraction, lookup, authorization and commit of printed voucher codes

pub mod cli;
pub mod config;
#[cfg(feature = "database")]
pub mod database;
pub mod error;
pub mod extraction;
pub mod observability;
pub mod pipeline;
pub mod records;
pub mod shutdown;
pub mod telemetry;

// Re-export key types for easy access
pub use config::{config, VoucherVerifyConfig};
pub use error::{AuthorizationError, ExtractionError, FailureReport, VerificationError};
pub use extraction::{
    build_extractor, CodeExtractor, Document, ExtractionMethod, ExtractionResult, VoucherCode,
};
pub use observability::{OperationTimer, PipelineMetrics};
pub use pipeline::{authorize, RecordResolver, TransitionCommitter, VerificationOrchestrator, VerificationReport};
pub use records::{Actor, InMemoryVoucherStore, Role, VoucherRecord, VoucherStore};
pub use shutdown::{CancellationSignal, ShutdownCoordinator};
pub use telemetry::{generate_correlation_id, init_telemetry};

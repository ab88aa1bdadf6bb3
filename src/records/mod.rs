// Voucher records: data model, store interfaces and store implementations

pub mod memory;
pub mod seed;
pub mod store;
pub mod types;

#[cfg(feature = "database")]
pub mod sqlite;

#[cfg(test)]
pub mod test_support;

pub use memory::InMemoryVoucherStore;
pub use seed::SeedFile;
pub use store::{AuditError, AuditSink, StoreError, VerifyOutcome, VoucherStore};
pub use types::{
    Actor, AuditAction, AuditEntry, ClientMetadata, LifecycleState, MaterialLine, Operator,
    RentalLine, Role, UserRef, Vehicle, VoucherCategory, VoucherRecord,
};

#[cfg(any(test, feature = "testing"))]
pub use store::{MockAuditSink, MockVoucherStore};

#[cfg(feature = "database")]
pub use sqlite::SqliteVoucherStore;

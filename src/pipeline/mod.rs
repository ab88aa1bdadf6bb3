// Verification pipeline: resolve, authorize and commit an extracted or
// manually entered voucher code.

pub mod authorization;
pub mod committer;
pub mod orchestrator;
pub mod resolver;
pub mod state_machine;

pub use authorization::authorize;
pub use committer::{AuditContext, CommitReceipt, TransitionCommitter};
pub use orchestrator::{VerificationOrchestrator, VerificationReport};
pub use resolver::RecordResolver;
pub use state_machine::{
    PipelineEvent, PipelineMachine, PipelineStage, StageTransitionRecord, TransitionError,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statig::prelude::*;
use std::fmt;
use thiserror::Error;

use crate::extraction::{ExtractionMethod, VoucherCode};

/// Stage of a single verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Extracting,
    Extracted,
    Resolving,
    Resolved,
    Authorizing,
    Authorized,
    Committing,
    Verified,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Extracting => "extracting",
            PipelineStage::Extracted => "extracted",
            PipelineStage::Resolving => "resolving",
            PipelineStage::Resolved => "resolved",
            PipelineStage::Authorizing => "authorizing",
            PipelineStage::Authorized => "authorized",
            PipelineStage::Committing => "committing",
            PipelineStage::Verified => "verified",
            PipelineStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Verified | PipelineStage::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    BeginExtraction,
    CodeExtracted {
        code: VoucherCode,
        method: ExtractionMethod,
    },
    /// From `Extracted`, or directly from `Idle` for manual code entry
    BeginResolution { code: VoucherCode },
    RecordResolved { record_id: i64 },
    BeginAuthorization,
    Authorized,
    BeginCommit,
    Committed { verified_at: DateTime<Utc> },
    Fail { kind: &'static str },
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("event {event:?} is not valid in stage {stage}")]
    InvalidTransition {
        stage: PipelineStage,
        event: PipelineEvent,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransitionRecord {
    pub from: PipelineStage,
    pub to: PipelineStage,
    pub at: DateTime<Utc>,
    /// Failure kind when `to` is `Failed`
    pub failure: Option<String>,
}

/// Data carried through a run. Stages themselves live in the generated
/// `State`; `stage` mirrors it so callers never depend on generated names.
#[derive(Debug, Default)]
pub struct VerificationRun {
    stage: Option<PipelineStage>,
    pub code: Option<VoucherCode>,
    pub method: Option<ExtractionMethod>,
    pub record_id: Option<i64>,
    pub verified_at: Option<DateTime<Utc>>,
    pub history: Vec<StageTransitionRecord>,
}

impl VerificationRun {
    pub fn stage(&self) -> PipelineStage {
        self.stage.unwrap_or(PipelineStage::Idle)
    }

    fn enter(&mut self, to: PipelineStage, failure: Option<&str>) {
        let from = self.stage();
        self.history.push(StageTransitionRecord {
            from,
            to,
            at: Utc::now(),
            failure: failure.map(str::to_string),
        });
        self.stage = Some(to);
        tracing::debug!(from = %from, to = %to, "Pipeline stage changed");
    }

    fn fail(&mut self, kind: &str) -> Outcome<State> {
        self.enter(PipelineStage::Failed, Some(kind));
        Transition(State::failed())
    }
}

#[state_machine(initial = "State::idle()")]
impl VerificationRun {
    #[state]
    fn idle(&mut self, event: &PipelineEvent) -> Outcome<State> {
        match event {
            PipelineEvent::BeginExtraction => {
                self.enter(PipelineStage::Extracting, None);
                Transition(State::extracting())
            }
            PipelineEvent::BeginResolution { code } => {
                self.code = Some(code.clone());
                self.enter(PipelineStage::Resolving, None);
                Transition(State::resolving())
            }
            PipelineEvent::Fail { kind } => self.fail(kind),
            _ => Handled,
        }
    }

    #[state]
    fn extracting(&mut self, event: &PipelineEvent) -> Outcome<State> {
        match event {
            PipelineEvent::CodeExtracted { code, method } => {
                self.code = Some(code.clone());
                self.method = Some(*method);
                self.enter(PipelineStage::Extracted, None);
                Transition(State::extracted())
            }
            PipelineEvent::Fail { kind } => self.fail(kind),
            _ => Handled,
        }
    }

    #[state]
    fn extracted(&mut self, event: &PipelineEvent) -> Outcome<State> {
        match event {
            PipelineEvent::BeginResolution { code } if self.code.as_ref() == Some(code) => {
                self.enter(PipelineStage::Resolving, None);
                Transition(State::resolving())
            }
            PipelineEvent::Fail { kind } => self.fail(kind),
            _ => Handled,
        }
    }

    #[state]
    fn resolving(&mut self, event: &PipelineEvent) -> Outcome<State> {
        match event {
            PipelineEvent::RecordResolved { record_id } => {
                self.record_id = Some(*record_id);
                self.enter(PipelineStage::Resolved, None);
                Transition(State::resolved())
            }
            PipelineEvent::Fail { kind } => self.fail(kind),
            _ => Handled,
        }
    }

    #[state]
    fn resolved(&mut self, event: &PipelineEvent) -> Outcome<State> {
        match event {
            PipelineEvent::BeginAuthorization => {
                self.enter(PipelineStage::Authorizing, None);
                Transition(State::authorizing())
            }
            PipelineEvent::Fail { kind } => self.fail(kind),
            _ => Handled,
        }
    }

    #[state]
    fn authorizing(&mut self, event: &PipelineEvent) -> Outcome<State> {
        match event {
            PipelineEvent::Authorized => {
                self.enter(PipelineStage::Authorized, None);
                Transition(State::authorized())
            }
            PipelineEvent::Fail { kind } => self.fail(kind),
            _ => Handled,
        }
    }

    #[state]
    fn authorized(&mut self, event: &PipelineEvent) -> Outcome<State> {
        match event {
            PipelineEvent::BeginCommit => {
                self.enter(PipelineStage::Committing, None);
                Transition(State::committing())
            }
            PipelineEvent::Fail { kind } => self.fail(kind),
            _ => Handled,
        }
    }

    #[state]
    fn committing(&mut self, event: &PipelineEvent) -> Outcome<State> {
        match event {
            PipelineEvent::Committed { verified_at } => {
                self.verified_at = Some(*verified_at);
                self.enter(PipelineStage::Verified, None);
                Transition(State::verified())
            }
            PipelineEvent::Fail { kind } => self.fail(kind),
            _ => Handled,
        }
    }

    #[state]
    fn verified(&mut self, event: &PipelineEvent) -> Outcome<State> {
        tracing::debug!(event = ?event, "Event ignored in terminal stage");
        Handled
    }

    #[state]
    fn failed(&mut self, event: &PipelineEvent) -> Outcome<State> {
        tracing::debug!(event = ?event, "Event ignored in terminal stage");
        Handled
    }
}

/// One verification run's state machine. Rejects events that are not valid
/// in the current stage instead of silently ignoring them.
pub struct PipelineMachine {
    machine: statig::blocking::StateMachine<VerificationRun>,
}

impl Default for PipelineMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMachine {
    pub fn new() -> Self {
        Self {
            machine: VerificationRun::default().state_machine(),
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.machine.inner().stage()
    }

    pub fn run(&self) -> &VerificationRun {
        self.machine.inner()
    }

    pub fn history(&self) -> &[StageTransitionRecord] {
        &self.machine.inner().history
    }

    /// Apply `event`. Every valid event moves the run to a new stage, so an
    /// unchanged stage means the event was rejected.
    pub fn handle(&mut self, event: PipelineEvent) -> Result<PipelineStage, TransitionError> {
        let before = self.stage();
        let recorded = self.history().len();
        self.machine.handle(&event);

        if self.history().len() == recorded {
            return Err(TransitionError::InvalidTransition {
                stage: before,
                event,
            });
        }
        Ok(self.stage())
    }

    /// Move to `Failed` from any non-terminal stage.
    pub fn fail(&mut self, kind: &'static str) -> Result<PipelineStage, TransitionError> {
        self.handle(PipelineEvent::Fail { kind })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> VoucherCode {
        VoucherCode::parse("CP-143-00001").unwrap()
    }

    fn stages(machine: &PipelineMachine) -> Vec<PipelineStage> {
        machine.history().iter().map(|t| t.to).collect()
    }

    #[test]
    fn test_document_path_reaches_verified() {
        let mut machine = PipelineMachine::new();
        assert_eq!(machine.stage(), PipelineStage::Idle);

        machine.handle(PipelineEvent::BeginExtraction).unwrap();
        machine
            .handle(PipelineEvent::CodeExtracted {
                code: code(),
                method: ExtractionMethod::VisualCode,
            })
            .unwrap();
        machine
            .handle(PipelineEvent::BeginResolution { code: code() })
            .unwrap();
        machine
            .handle(PipelineEvent::RecordResolved { record_id: 4 })
            .unwrap();
        machine.handle(PipelineEvent::BeginAuthorization).unwrap();
        machine.handle(PipelineEvent::Authorized).unwrap();
        machine.handle(PipelineEvent::BeginCommit).unwrap();
        let stage = machine
            .handle(PipelineEvent::Committed {
                verified_at: Utc::now(),
            })
            .unwrap();

        assert_eq!(stage, PipelineStage::Verified);
        assert_eq!(
            stages(&machine),
            vec![
                PipelineStage::Extracting,
                PipelineStage::Extracted,
                PipelineStage::Resolving,
                PipelineStage::Resolved,
                PipelineStage::Authorizing,
                PipelineStage::Authorized,
                PipelineStage::Committing,
                PipelineStage::Verified,
            ]
        );
        assert_eq!(machine.run().method, Some(ExtractionMethod::VisualCode));
        assert_eq!(machine.run().record_id, Some(4));
    }

    #[test]
    fn test_manual_entry_starts_at_resolving() {
        let mut machine = PipelineMachine::new();
        let stage = machine
            .handle(PipelineEvent::BeginResolution { code: code() })
            .unwrap();
        assert_eq!(stage, PipelineStage::Resolving);
        assert_eq!(machine.run().code, Some(code()));
        assert!(machine.run().method.is_none());
    }

    #[test]
    fn test_out_of_order_event_is_rejected() {
        let mut machine = PipelineMachine::new();
        let err = machine.handle(PipelineEvent::BeginCommit).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidTransition {
                stage: PipelineStage::Idle,
                ..
            }
        ));
        assert_eq!(machine.stage(), PipelineStage::Idle);
    }

    #[test]
    fn test_extracted_code_must_match_resolution() {
        let mut machine = PipelineMachine::new();
        machine.handle(PipelineEvent::BeginExtraction).unwrap();
        machine
            .handle(PipelineEvent::CodeExtracted {
                code: code(),
                method: ExtractionMethod::StructuredText,
            })
            .unwrap();
        let other = VoucherCode::parse("CP-143-00002").unwrap();
        assert!(machine
            .handle(PipelineEvent::BeginResolution { code: other })
            .is_err());
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut machine = PipelineMachine::new();
        machine.handle(PipelineEvent::BeginExtraction).unwrap();
        assert_eq!(machine.fail("no-code-found").unwrap(), PipelineStage::Failed);
        assert!(machine.stage().is_terminal());

        assert!(machine.handle(PipelineEvent::BeginExtraction).is_err());
        assert!(machine.fail("cancelled").is_err());

        let last = machine.history().last().unwrap();
        assert_eq!(last.failure.as_deref(), Some("no-code-found"));
    }
}

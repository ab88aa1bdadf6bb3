// Verification orchestrator: sequences extraction, resolution, authorization
// and commit for one request, tracking progress in a PipelineMachine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use super::authorization::authorize;
use super::committer::{AuditContext, TransitionCommitter};
use super::resolver::RecordResolver;
use super::state_machine::{PipelineEvent, PipelineMachine, StageTransitionRecord};
use crate::error::VerificationError;
use crate::extraction::{CodeExtractor, Document, ExtractionMethod, ExtractionResult, VoucherCode};
use crate::observability::{OperationTimer, PipelineMetrics};
use crate::records::{Actor, AuditSink, ClientMetadata, VoucherRecord, VoucherStore};
use crate::shutdown::CancellationSignal;
use crate::telemetry::{create_verification_span, generate_correlation_id};

/// Successful outcome of a full verification run.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub success: bool,
    pub code: VoucherCode,
    /// `None` when the code was entered manually
    pub method: Option<ExtractionMethod>,
    pub record_id: i64,
    pub verified_by: String,
    pub verified_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub correlation_id: String,
    #[serde(skip)]
    pub transitions: Vec<StageTransitionRecord>,
}

enum Entry<'a> {
    Document(Document),
    Manual(&'a str),
}

impl Entry<'_> {
    fn path(&self) -> &'static str {
        match self {
            Entry::Document(_) => "document",
            Entry::Manual(_) => "manual",
        }
    }
}

pub struct VerificationOrchestrator {
    extractor: Arc<CodeExtractor>,
    resolver: RecordResolver,
    committer: TransitionCommitter,
    metrics: Arc<PipelineMetrics>,
}

impl VerificationOrchestrator {
    pub fn new(
        extractor: CodeExtractor,
        store: Arc<dyn VoucherStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            extractor: Arc::new(extractor),
            resolver: RecordResolver::new(store.clone()),
            committer: TransitionCommitter::new(store, audit),
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Run the extractor on a blocking worker; parsing and rasterization
    /// are CPU-bound.
    pub async fn extract(&self, document: Document) -> Result<ExtractionResult, VerificationError> {
        let extractor = Arc::clone(&self.extractor);
        let timer = OperationTimer::new("extraction");
        let result = tokio::task::spawn_blocking(move || extractor.extract(&document))
            .await
            .map_err(|e| VerificationError::Internal {
                reason: format!("extraction worker failed: {e}"),
            })?;
        timer.finish();
        Ok(result?)
    }

    pub async fn resolve(&self, code: &VoucherCode) -> Result<VoucherRecord, VerificationError> {
        self.resolver.resolve(code).await
    }

    /// Full pipeline starting from an uploaded document.
    pub async fn verify_document(
        &self,
        document: Document,
        actor: &Actor,
        client: &ClientMetadata,
        cancel: &CancellationSignal,
    ) -> Result<VerificationReport, VerificationError> {
        self.run(Entry::Document(document), actor, client, cancel).await
    }

    /// Manual-entry pipeline: starts at resolution with a typed-in code.
    pub async fn verify_code(
        &self,
        input: &str,
        actor: &Actor,
        client: &ClientMetadata,
        cancel: &CancellationSignal,
    ) -> Result<VerificationReport, VerificationError> {
        self.run(Entry::Manual(input), actor, client, cancel).await
    }

    async fn run(
        &self,
        entry: Entry<'_>,
        actor: &Actor,
        client: &ClientMetadata,
        cancel: &CancellationSignal,
    ) -> Result<VerificationReport, VerificationError> {
        let correlation_id = generate_correlation_id();
        let span = create_verification_span(entry.path(), &actor.id, &correlation_id);
        self.metrics.record_start();

        async move {
            let mut machine = PipelineMachine::new();
            match self
                .drive(&mut machine, entry, actor, client, cancel, &correlation_id)
                .await
            {
                Ok(report) => {
                    self.metrics.record_verified();
                    Ok(report)
                }
                Err(e) => {
                    let kind = e.kind();
                    if !machine.stage().is_terminal() {
                        if let Err(transition) = machine.fail(kind) {
                            debug!(error = %transition, "Run already settled");
                        }
                    }
                    self.metrics.record_failure(kind);
                    warn!(kind, error = %e, "Verification failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        machine: &mut PipelineMachine,
        entry: Entry<'_>,
        actor: &Actor,
        client: &ClientMetadata,
        cancel: &CancellationSignal,
        correlation_id: &str,
    ) -> Result<VerificationReport, VerificationError> {
        let (code, method) = match entry {
            Entry::Document(document) => {
                checkpoint(cancel, "extraction")?;
                step(machine, PipelineEvent::BeginExtraction)?;
                let extracted = self.extract(document).await?;
                self.metrics.record_extraction(extracted.method);
                step(
                    machine,
                    PipelineEvent::CodeExtracted {
                        code: extracted.code.clone(),
                        method: extracted.method,
                    },
                )?;
                (extracted.code, Some(extracted.method))
            }
            Entry::Manual(input) => {
                let code = VoucherCode::parse(input)
                    .map_err(|e| VerificationError::InvalidCode { input: e.input })?;
                self.metrics.record_manual_entry();
                (code, None)
            }
        };
        tracing::Span::current().record("voucher.code", code.as_str());

        checkpoint(cancel, "resolution")?;
        step(machine, PipelineEvent::BeginResolution { code: code.clone() })?;
        let record = self.resolver.resolve(&code).await?;
        step(
            machine,
            PipelineEvent::RecordResolved {
                record_id: record.id,
            },
        )?;

        checkpoint(cancel, "authorization")?;
        step(machine, PipelineEvent::BeginAuthorization)?;
        authorize(actor, &record)?;
        step(machine, PipelineEvent::Authorized)?;

        checkpoint(cancel, "commit")?;
        step(machine, PipelineEvent::BeginCommit)?;
        let audit = AuditContext {
            client: client.clone(),
            method,
            correlation_id: correlation_id.to_string(),
        };
        let timer = OperationTimer::new("commit");
        let receipt = self.committer.commit(&code, &actor.id, &audit).await?;
        timer.finish();
        step(
            machine,
            PipelineEvent::Committed {
                verified_at: receipt.verified_at,
            },
        )?;

        let warnings: Vec<String> = receipt.audit_warning.into_iter().collect();
        if !warnings.is_empty() {
            self.metrics.record_audit_failure();
        }

        info!(code = %code, record_id = receipt.record_id, "Verification completed");
        Ok(VerificationReport {
            success: true,
            code,
            method,
            record_id: receipt.record_id,
            verified_by: actor.id.clone(),
            verified_at: receipt.verified_at,
            warnings,
            correlation_id: correlation_id.to_string(),
            transitions: machine.history().to_vec(),
        })
    }
}

fn checkpoint(cancel: &CancellationSignal, stage: &'static str) -> Result<(), VerificationError> {
    if cancel.is_cancelled() {
        return Err(VerificationError::Cancelled { stage });
    }
    Ok(())
}

fn step(machine: &mut PipelineMachine, event: PipelineEvent) -> Result<(), VerificationError> {
    machine
        .handle(event)
        .map(|_| ())
        .map_err(|e| VerificationError::Internal {
            reason: e.to_string(),
        })
}

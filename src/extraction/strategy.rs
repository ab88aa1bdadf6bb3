// Ordered extraction strategies and the extractor that runs them

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::code::VoucherCode;
use super::document::{Document, DocumentLimits};
use crate::error::ExtractionError;
use serde::{Deserialize, Serialize};

/// How a code was recovered from a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    StructuredText,
    VisualCode,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::StructuredText => "structured-text",
            ExtractionMethod::VisualCode => "visual-code",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub code: VoucherCode,
    pub method: ExtractionMethod,
}

/// Internal failure of a single strategy. Never surfaced to callers; the
/// extractor logs it and moves on to the next strategy.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("document could not be parsed: {0}")]
    Parse(String),
    #[error("page could not be rasterized: {0}")]
    Raster(String),
}

/// One way of recovering a code from a document.
pub trait ExtractionStrategy: Send + Sync {
    fn method(&self) -> ExtractionMethod;

    /// `Ok(None)` means the strategy ran but found nothing.
    fn attempt(&self, document: &Document) -> Result<Option<VoucherCode>, StrategyError>;
}

/// Runs strategies in order; the first one to produce a code wins and later
/// (costlier) strategies are never started.
pub struct CodeExtractor {
    limits: DocumentLimits,
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl fmt::Debug for CodeExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeExtractor")
            .field("limits", &self.limits)
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.method()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl CodeExtractor {
    pub fn new(limits: DocumentLimits, strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { limits, strategies }
    }

    pub fn limits(&self) -> &DocumentLimits {
        &self.limits
    }

    pub fn extract(&self, document: &Document) -> Result<ExtractionResult, ExtractionError> {
        self.limits.check(document)?;

        for strategy in &self.strategies {
            let method = strategy.method();
            match strategy.attempt(document) {
                Ok(Some(code)) => {
                    info!(code = %code, method = %method, "Voucher code extracted");
                    return Ok(ExtractionResult { code, method });
                }
                Ok(None) => {
                    debug!(method = %method, "Strategy found no voucher code");
                }
                Err(e) => {
                    warn!(method = %method, error = %e, "Extraction strategy failed, trying next");
                }
            }
        }

        Err(ExtractionError::NoCodeFound)
    }
}

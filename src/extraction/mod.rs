// Code extraction: turns an uploaded voucher document into its identifying code.
//
// Strategies are tried in a fixed order (embedded text, then the QR symbol on
// page one). Adding a strategy means adding an entry to the list built here.

pub mod code;
pub mod document;
pub mod filters;
pub mod raster;
pub mod strategy;
pub mod text;
pub mod visual;

pub use code::{find_in_text, InvalidCode, PayloadPattern, VoucherCode};
pub use document::{Document, DocumentLimits, DEFAULT_MAX_DOCUMENT_BYTES, PDF_MEDIA_TYPE};
pub use raster::{EmbeddedImageRasterizer, PageRasterizer};
pub use strategy::{CodeExtractor, ExtractionMethod, ExtractionResult, ExtractionStrategy, StrategyError};
pub use text::StructuredTextStrategy;
pub use visual::{QrDecoder, SymbolDecoder, VisualCodeStrategy};

use crate::config::ExtractionConfig;

/// Extractor with the standard strategy order: structured text, then QR.
pub fn build_extractor(config: &ExtractionConfig) -> Result<CodeExtractor, regex::Error> {
    let limits = DocumentLimits {
        max_bytes: config.max_document_bytes,
        accepted_media_type: config.accepted_media_type.clone(),
    };
    let payload_pattern = PayloadPattern::new(&config.visual_path_fragment)?;

    Ok(CodeExtractor::new(
        limits,
        vec![
            Box::new(StructuredTextStrategy),
            Box::new(VisualCodeStrategy::qr(config.raster_scale, payload_pattern)),
        ],
    ))
}

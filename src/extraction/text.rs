// Structured-text strategy: pattern matching over the embedded text layer

use tracing::debug;

use super::code::{find_in_text, VoucherCode};
use super::document::Document;
use super::strategy::{ExtractionMethod, ExtractionStrategy, StrategyError};

#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredTextStrategy;

impl ExtractionStrategy for StructuredTextStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::StructuredText
    }

    fn attempt(&self, document: &Document) -> Result<Option<VoucherCode>, StrategyError> {
        let text = extract_document_text(document.bytes())?;
        Ok(find_in_text(&text))
    }
}

/// Text of every page, concatenated in page order.
///
/// Pages whose text cannot be decoded are skipped; only a document that
/// cannot be loaded at all is an error.
pub fn extract_document_text(bytes: &[u8]) -> Result<String, StrategyError> {
    let pdf = lopdf::Document::load_mem(bytes).map_err(|e| StrategyError::Parse(e.to_string()))?;

    let mut text = String::new();
    // get_pages is keyed by page number, so iteration is already in page order
    for page_number in pdf.get_pages().keys() {
        match pdf.extract_text(&[*page_number]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => {
                debug!(page = page_number, error = %e, "Page has no decodable text");
            }
        }
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::document::PDF_MEDIA_TYPE;

    #[test]
    fn test_garbage_bytes_are_a_parse_error() {
        let document = Document::new(b"not a pdf at all".to_vec(), PDF_MEDIA_TYPE);
        assert!(matches!(
            StructuredTextStrategy.attempt(&document),
            Err(StrategyError::Parse(_))
        ));
    }
}

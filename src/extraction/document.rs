// Uploaded documents and the checks applied before any parsing

use crate::error::ExtractionError;
use std::path::Path;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// 5 MiB
pub const DEFAULT_MAX_DOCUMENT_BYTES: u64 = 5 * 1024 * 1024;

/// Raw document as received from the caller. Lives for one pipeline run.
#[derive(Debug, Clone)]
pub struct Document {
    bytes: Vec<u8>,
    declared_size: u64,
    media_type: String,
}

impl Document {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        let declared_size = bytes.len() as u64;
        Self {
            bytes,
            declared_size,
            media_type: media_type.into(),
        }
    }

    /// Use the size reported by the upload layer instead of the buffer length.
    pub fn with_declared_size(mut self, declared_size: u64) -> Self {
        self.declared_size = declared_size;
        self
    }

    /// Read a document from disk, guessing the media type from the extension.
    pub async fn from_path<P: AsRef<Path>>(path: P, media_type: Option<&str>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let media_type = media_type
            .map(str::to_string)
            .unwrap_or_else(|| guess_media_type(path).to_string());
        Ok(Self::new(bytes, media_type))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Largest of the declared size and the actual buffer length.
    pub fn size(&self) -> u64 {
        self.declared_size.max(self.bytes.len() as u64)
    }
}

fn guess_media_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => PDF_MEDIA_TYPE,
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Size and format limits enforced before extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLimits {
    pub max_bytes: u64,
    pub accepted_media_type: String,
}

impl Default for DocumentLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            accepted_media_type: PDF_MEDIA_TYPE.to_string(),
        }
    }
}

impl DocumentLimits {
    pub fn check(&self, document: &Document) -> Result<(), ExtractionError> {
        let size = document.size();
        if size > self.max_bytes {
            return Err(ExtractionError::SizeExceeded {
                size,
                limit: self.max_bytes,
            });
        }

        // Ignore parameters such as "; charset=binary"
        let essence = document
            .media_type()
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        if !essence.eq_ignore_ascii_case(&self.accepted_media_type) {
            return Err(ExtractionError::UnsupportedFormat {
                media_type: document.media_type().to_string(),
                expected: self.accepted_media_type.clone(),
            });
        }

        Ok(())
    }
}

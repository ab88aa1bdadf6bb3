// Visual-code strategy: QR symbol on page one

use image::GrayImage;
use tracing::debug;

use super::code::{PayloadPattern, VoucherCode};
use super::document::Document;
use super::raster::{EmbeddedImageRasterizer, PageRasterizer};
use super::strategy::{ExtractionMethod, ExtractionStrategy, StrategyError};

/// Decodes every 2D symbol found in a pixel buffer into its text payload.
pub trait SymbolDecoder: Send + Sync {
    fn decode(&self, image: &GrayImage) -> Vec<String>;
}

/// QR decoding backed by `rqrr`.
#[derive(Debug, Default, Clone, Copy)]
pub struct QrDecoder;

impl SymbolDecoder for QrDecoder {
    fn decode(&self, image: &GrayImage) -> Vec<String> {
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            image.width() as usize,
            image.height() as usize,
            |x, y| image.get_pixel(x as u32, y as u32).0[0],
        );

        prepared
            .detect_grids()
            .into_iter()
            .filter_map(|grid| match grid.decode() {
                Ok((_, content)) => Some(content),
                Err(e) => {
                    debug!(error = ?e, "Detected grid could not be decoded");
                    None
                }
            })
            .collect()
    }
}

pub struct VisualCodeStrategy {
    rasterizer: Box<dyn PageRasterizer>,
    decoder: Box<dyn SymbolDecoder>,
    scale: f32,
    pattern: PayloadPattern,
}

impl VisualCodeStrategy {
    pub fn new(
        rasterizer: Box<dyn PageRasterizer>,
        decoder: Box<dyn SymbolDecoder>,
        scale: f32,
        pattern: PayloadPattern,
    ) -> Self {
        Self {
            rasterizer,
            decoder,
            scale,
            pattern,
        }
    }

    /// Embedded-image rasterizer with QR decoding.
    pub fn qr(scale: f32, pattern: PayloadPattern) -> Self {
        Self::new(
            Box::new(EmbeddedImageRasterizer),
            Box::new(QrDecoder),
            scale,
            pattern,
        )
    }
}

impl ExtractionStrategy for VisualCodeStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::VisualCode
    }

    fn attempt(&self, document: &Document) -> Result<Option<VoucherCode>, StrategyError> {
        let Some(raster) = self
            .rasterizer
            .rasterize_first_page(document.bytes(), self.scale)?
        else {
            return Ok(None);
        };

        debug!(
            width = raster.width(),
            height = raster.height(),
            "Scanning first page for visual codes"
        );

        Ok(self
            .decoder
            .decode(&raster)
            .iter()
            .find_map(|payload| self.pattern.find(payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::document::PDF_MEDIA_TYPE;
    use image::Luma;
    use std::sync::{Arc, Mutex};

    struct BlankRasterizer {
        scales: Arc<Mutex<Vec<f32>>>,
    }

    impl PageRasterizer for BlankRasterizer {
        fn rasterize_first_page(&self, _pdf: &[u8], scale: f32) -> Result<Option<GrayImage>, StrategyError> {
            self.scales.lock().unwrap().push(scale);
            Ok(Some(GrayImage::from_pixel(4, 4, Luma([255]))))
        }
    }

    struct EmptyPage;

    impl PageRasterizer for EmptyPage {
        fn rasterize_first_page(&self, _pdf: &[u8], _scale: f32) -> Result<Option<GrayImage>, StrategyError> {
            Ok(None)
        }
    }

    struct FixedPayloads(Vec<&'static str>);

    impl SymbolDecoder for FixedPayloads {
        fn decode(&self, _image: &GrayImage) -> Vec<String> {
            self.0.iter().map(|p| p.to_string()).collect()
        }
    }

    fn document() -> Document {
        Document::new(b"%PDF-1.5".to_vec(), PDF_MEDIA_TYPE)
    }

    #[test]
    fn test_first_payload_with_a_code_wins() {
        let scales = Arc::new(Mutex::new(Vec::new()));
        let strategy = VisualCodeStrategy::new(
            Box::new(BlankRasterizer {
                scales: scales.clone(),
            }),
            Box::new(FixedPayloads(vec![
                "https://host/otra-cosa",
                "https://host/vale/RT-001-00099",
            ])),
            2.0,
            PayloadPattern::new("/vale/").unwrap(),
        );

        let code = strategy.attempt(&document()).unwrap().unwrap();
        assert_eq!(code.as_str(), "RT-001-00099");
        assert_eq!(*scales.lock().unwrap(), vec![2.0]);
    }

    #[test]
    fn test_page_without_images_finds_nothing() {
        let strategy = VisualCodeStrategy::new(
            Box::new(EmptyPage),
            Box::new(FixedPayloads(vec!["https://host/vale/RT-001-00099"])),
            2.0,
            PayloadPattern::new("/vale/").unwrap(),
        );
        assert!(strategy.attempt(&document()).unwrap().is_none());
    }

    #[test]
    fn test_blank_image_has_no_qr() {
        let image = GrayImage::from_pixel(64, 64, Luma([255]));
        assert!(QrDecoder.decode(&image).is_empty());
    }
}

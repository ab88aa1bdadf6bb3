// First-page rasterization for visual-code detection

use image::{imageops, GrayImage, Luma};
use lopdf::{Dictionary, Object, ObjectId, Stream};
use tracing::debug;

use super::filters::{decode_stream, Decoded};
use super::strategy::StrategyError;

/// Margin around each embedded image on the composed canvas, in pixels.
/// QR detectors need a light quiet zone around the symbol.
const CANVAS_MARGIN: u32 = 16;

/// Upper bound on the scaled canvas; larger pages are decoded unscaled.
const MAX_RASTER_PIXELS: u64 = 40_000_000;

const MAX_PAGE_TREE_DEPTH: usize = 32;

/// Named colour spaces may refer to other named colour spaces.
const MAX_COLOR_SPACE_DEPTH: usize = 8;

/// Turns page one of a document into a single greyscale pixel buffer.
pub trait PageRasterizer: Send + Sync {
    /// `Ok(None)` when the page has nothing to rasterize.
    fn rasterize_first_page(&self, pdf: &[u8], scale: f32) -> Result<Option<GrayImage>, StrategyError>;
}

/// Rasterizer that paints the image XObjects of page one onto a white canvas.
///
/// Printed vouchers carry their QR symbol as an embedded image, so painting
/// the page's images is enough for detection without a full PDF renderer.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedImageRasterizer;

impl PageRasterizer for EmbeddedImageRasterizer {
    fn rasterize_first_page(&self, pdf: &[u8], scale: f32) -> Result<Option<GrayImage>, StrategyError> {
        let document =
            lopdf::Document::load_mem(pdf).map_err(|e| StrategyError::Parse(e.to_string()))?;

        let Some(page_id) = document.get_pages().values().next().copied() else {
            return Ok(None);
        };

        let images = page_images(&document, page_id);
        debug!(count = images.len(), "Decoded images on first page");
        if images.is_empty() {
            return Ok(None);
        }

        let canvas = compose(&images);
        Ok(Some(scale_image(canvas, scale)))
    }
}

fn page_images(document: &lopdf::Document, page_id: ObjectId) -> Vec<GrayImage> {
    let Some(resources) = page_resources(document, page_id) else {
        return Vec::new();
    };
    let Some(xobjects) = resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| resolve(document, obj).as_dict().ok())
    else {
        return Vec::new();
    };

    xobjects
        .iter()
        .filter_map(|(_, obj)| resolve(document, obj).as_stream().ok())
        .filter(|stream| {
            stream
                .dict
                .get(b"Subtype")
                .and_then(Object::as_name)
                .map(|name| name == b"Image")
                .unwrap_or(false)
        })
        .filter_map(|stream| decode_image(document, resources, stream))
        .collect()
}

/// Resources of a page, following inheritance up the page tree.
fn page_resources(document: &lopdf::Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = document.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        if let Ok(resources) = node.get(b"Resources") {
            return resolve(document, resources).as_dict().ok();
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = document.get_dictionary(parent).ok()?;
    }
    None
}

fn resolve<'a>(document: &'a lopdf::Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => document.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

/// Colour spaces an image's samples can be expressed in.
#[derive(Debug, Clone, PartialEq)]
enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    /// Single colourant; a tint of 1 means full ink
    Separation,
    /// Palette of `base` colours, one entry per sample value
    Indexed { base: Box<ColorSpace>, lookup: Vec<u8> },
}

impl ColorSpace {
    fn components(&self) -> usize {
        match self {
            ColorSpace::Gray | ColorSpace::Separation | ColorSpace::Indexed { .. } => 1,
            ColorSpace::Rgb => 3,
            ColorSpace::Cmyk => 4,
        }
    }

    /// Luma of one pixel given its 8-bit component values.
    fn luma(&self, values: &[u8]) -> u8 {
        match (self, values) {
            (ColorSpace::Gray, [v]) => *v,
            (ColorSpace::Separation, [v]) => 255 - v,
            (ColorSpace::Rgb, [r, g, b]) => {
                ((*r as u32 * 299 + *g as u32 * 587 + *b as u32 * 114) / 1000) as u8
            }
            (ColorSpace::Cmyk, [c, m, y, k]) => {
                let ink = (*c as u32 * 30 + *m as u32 * 59 + *y as u32 * 11) / 100 + *k as u32;
                255u32.saturating_sub(ink) as u8
            }
            (ColorSpace::Indexed { base, lookup }, [index]) => {
                let width = base.components();
                let entries = lookup.len() / width;
                // Out-of-range indices clamp to the last palette entry
                let entry = (*index as usize).min(entries.saturating_sub(1));
                lookup
                    .get(entry * width..(entry + 1) * width)
                    .map(|color| base.luma(color))
                    .unwrap_or(255)
            }
            _ => 255,
        }
    }
}

fn color_space(
    document: &lopdf::Document,
    resources: &Dictionary,
    object: &Object,
    depth: usize,
) -> Option<ColorSpace> {
    if depth > MAX_COLOR_SPACE_DEPTH {
        return None;
    }
    match resolve(document, object) {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" | b"G" => Some(ColorSpace::Gray),
            b"DeviceRGB" | b"CalRGB" | b"RGB" => Some(ColorSpace::Rgb),
            b"DeviceCMYK" | b"CMYK" => Some(ColorSpace::Cmyk),
            // Named entry in the page's /ColorSpace resources
            other => {
                let named = resources
                    .get(b"ColorSpace")
                    .ok()
                    .and_then(|obj| resolve(document, obj).as_dict().ok())?
                    .get(other)
                    .ok()?;
                color_space(document, resources, named, depth + 1)
            }
        },
        Object::Array(items) => {
            let family = items.first()?.as_name().ok()?;
            match family {
                b"CalGray" => Some(ColorSpace::Gray),
                b"CalRGB" => Some(ColorSpace::Rgb),
                b"Separation" => Some(ColorSpace::Separation),
                b"ICCBased" => {
                    let profile = resolve(document, items.get(1)?).as_stream().ok()?;
                    match profile.dict.get(b"N").and_then(Object::as_i64).ok()? {
                        1 => Some(ColorSpace::Gray),
                        3 => Some(ColorSpace::Rgb),
                        4 => Some(ColorSpace::Cmyk),
                        _ => None,
                    }
                }
                b"Indexed" | b"I" => {
                    let base = color_space(document, resources, items.get(1)?, depth + 1)?;
                    if matches!(base, ColorSpace::Indexed { .. }) {
                        return None;
                    }
                    let lookup = lookup_table(document, items.get(3)?)?;
                    if lookup.len() < base.components() {
                        return None;
                    }
                    Some(ColorSpace::Indexed {
                        base: Box::new(base),
                        lookup,
                    })
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn lookup_table(document: &lopdf::Document, object: &Object) -> Option<Vec<u8>> {
    match resolve(document, object) {
        Object::String(bytes, _) => Some(bytes.clone()),
        Object::Stream(stream) => match decode_stream(&stream.dict, &stream.content).ok()? {
            Decoded::Samples(bytes) => Some(bytes),
            Decoded::Jpeg(_) => None,
        },
        _ => None,
    }
}

fn decode_image(
    document: &lopdf::Document,
    resources: &Dictionary,
    stream: &Stream,
) -> Option<GrayImage> {
    let dict = &stream.dict;
    let width = u32::try_from(dict.get(b"Width").and_then(Object::as_i64).ok()?).ok()?;
    let height = u32::try_from(dict.get(b"Height").and_then(Object::as_i64).ok()?).ok()?;
    if width == 0 || height == 0 {
        return None;
    }

    let samples = match decode_stream(dict, &stream.content) {
        Ok(Decoded::Samples(samples)) => samples,
        Ok(Decoded::Jpeg(jpeg)) => {
            return image::load_from_memory(&jpeg).ok().map(|img| img.to_luma8());
        }
        Err(e) => {
            debug!(error = %e, width, height, "Skipping undecodable image");
            return None;
        }
    };

    let is_mask = dict
        .get(b"ImageMask")
        .and_then(Object::as_bool)
        .unwrap_or(false);
    let default_bits = if is_mask { 1 } else { 8 };
    let bits = dict
        .get(b"BitsPerComponent")
        .and_then(Object::as_i64)
        .unwrap_or(default_bits);
    let bits = u32::try_from(bits).ok()?;

    let space = match dict.get(b"ColorSpace") {
        Ok(object) if !is_mask => color_space(document, resources, object, 0)?,
        _ if is_mask => ColorSpace::Gray,
        _ => guess_color_space(width, height, bits, samples.len()),
    };
    let inverted = !matches!(space, ColorSpace::Indexed { .. })
        && dict
            .get(b"Decode")
            .and_then(Object::as_array)
            .ok()
            .and_then(|decode| decode.first())
            .and_then(|first| first.as_float().ok())
            == Some(1.0);

    let mut image = to_luma(width, height, bits, &space, &samples)?;
    if inverted {
        imageops::invert(&mut image);
    }
    Some(image)
}

/// Images without a /ColorSpace entry: infer the component count from the
/// sample buffer length.
fn guess_color_space(width: u32, height: u32, bits: u32, len: usize) -> ColorSpace {
    let row_bits = width as usize * bits as usize;
    let per_component = row_bits.div_ceil(8) * height as usize;
    match len / per_component.max(1) {
        4.. => ColorSpace::Cmyk,
        3 => ColorSpace::Rgb,
        _ => ColorSpace::Gray,
    }
}

/// Convert packed samples to luma. Rows start on byte boundaries.
fn to_luma(
    width: u32,
    height: u32,
    bits: u32,
    space: &ColorSpace,
    samples: &[u8],
) -> Option<GrayImage> {
    if !matches!(bits, 1 | 2 | 4 | 8 | 16) {
        return None;
    }
    let components = space.components();
    let row_bytes = (width as usize * components * bits as usize).div_ceil(8);
    if samples.len() < row_bytes * height as usize {
        return None;
    }

    let max = (1u32 << bits) - 1;
    let indexed = matches!(space, ColorSpace::Indexed { .. });
    let mut values = vec![0u8; components];
    let mut luma = Vec::with_capacity(width as usize * height as usize);

    for row in samples.chunks_exact(row_bytes).take(height as usize) {
        for x in 0..width as usize {
            for (c, value) in values.iter_mut().enumerate() {
                let raw = sample_at(row, x * components + c, bits);
                *value = if indexed {
                    raw.min(255) as u8
                } else if bits == 16 {
                    (raw >> 8) as u8
                } else {
                    (raw * 255 / max) as u8
                };
            }
            luma.push(space.luma(&values));
        }
    }
    GrayImage::from_raw(width, height, luma)
}

fn sample_at(row: &[u8], index: usize, bits: u32) -> u32 {
    match bits {
        8 => row[index] as u32,
        16 => u16::from_be_bytes([row[2 * index], row[2 * index + 1]]) as u32,
        _ => {
            let bit = index * bits as usize;
            let shift = 8 - bits as usize - bit % 8;
            (row[bit / 8] as u32 >> shift) & ((1 << bits) - 1)
        }
    }
}

/// Stack images vertically on a white canvas, each surrounded by a margin.
fn compose(images: &[GrayImage]) -> GrayImage {
    let width = images.iter().map(GrayImage::width).max().unwrap_or(0) + 2 * CANVAS_MARGIN;
    let height = images.iter().map(GrayImage::height).sum::<u32>()
        + CANVAS_MARGIN * (images.len() as u32 + 1);

    let mut canvas = GrayImage::from_pixel(width, height, Luma([255]));
    let mut y = CANVAS_MARGIN;
    for image in images {
        imageops::overlay(&mut canvas, image, CANVAS_MARGIN as i64, y as i64);
        y += image.height() + CANVAS_MARGIN;
    }
    canvas
}

fn scale_image(image: GrayImage, scale: f32) -> GrayImage {
    if !(scale.is_finite() && scale > 0.0) || (scale - 1.0).abs() < f32::EPSILON {
        return image;
    }
    let width = ((image.width() as f32 * scale).round() as u32).max(1);
    let height = ((image.height() as f32 * scale).round() as u32).max(1);
    if width as u64 * height as u64 > MAX_RASTER_PIXELS {
        debug!(width, height, "Scaled raster too large, keeping original resolution");
        return image;
    }
    imageops::resize(&image, width, height, imageops::FilterType::Nearest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, StringFormat};

    fn indexed_black_white() -> ColorSpace {
        ColorSpace::Indexed {
            base: Box::new(ColorSpace::Rgb),
            lookup: vec![255, 255, 255, 0, 0, 0],
        }
    }

    #[test]
    fn test_one_bit_rows_are_byte_aligned() {
        // 10 px wide -> 2 bytes per row; first pixel black, rest white
        let samples = [0b0111_1111, 0b1100_0000, 0b1111_1111, 0b1100_0000];
        let image = to_luma(10, 2, 1, &ColorSpace::Gray, &samples).unwrap();
        assert_eq!(image.get_pixel(0, 0).0[0], 0);
        assert_eq!(image.get_pixel(9, 0).0[0], 255);
        assert_eq!(image.get_pixel(0, 1).0[0], 255);
    }

    #[test]
    fn test_rgb_samples_become_luma() {
        let samples = [255, 255, 255, 0, 0, 0];
        let image = to_luma(2, 1, 8, &ColorSpace::Rgb, &samples).unwrap();
        assert_eq!(image.get_pixel(0, 0).0[0], 255);
        assert_eq!(image.get_pixel(1, 0).0[0], 0);
    }

    #[test]
    fn test_two_and_four_bit_samples_are_scaled() {
        // 2-bit: 0b11_10_01_00 -> 255, 170, 85, 0
        let image = to_luma(4, 1, 2, &ColorSpace::Gray, &[0b1110_0100]).unwrap();
        let row: Vec<u8> = image.pixels().map(|p| p.0[0]).collect();
        assert_eq!(row, vec![255, 170, 85, 0]);

        let image = to_luma(2, 1, 4, &ColorSpace::Gray, &[0xf0]).unwrap();
        assert_eq!(image.get_pixel(0, 0).0[0], 255);
        assert_eq!(image.get_pixel(1, 0).0[0], 0);
    }

    #[test]
    fn test_sixteen_bit_samples_keep_high_byte() {
        let image = to_luma(2, 1, 16, &ColorSpace::Gray, &[0xff, 0x00, 0x12, 0x34]).unwrap();
        assert_eq!(image.get_pixel(0, 0).0[0], 0xff);
        assert_eq!(image.get_pixel(1, 0).0[0], 0x12);
    }

    #[test]
    fn test_indexed_samples_go_through_palette() {
        // Index 0 is white and index 1 is black, so raw values must not be read as grey
        let image = to_luma(2, 1, 8, &indexed_black_white(), &[0, 1]).unwrap();
        assert_eq!(image.get_pixel(0, 0).0[0], 255);
        assert_eq!(image.get_pixel(1, 0).0[0], 0);

        let image = to_luma(8, 1, 1, &indexed_black_white(), &[0b1000_0000]).unwrap();
        assert_eq!(image.get_pixel(0, 0).0[0], 0);
        assert_eq!(image.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn test_indexed_color_space_resolves_lookup_string() {
        let document = lopdf::Document::with_version("1.5");
        let object = Object::Array(vec![
            "Indexed".into(),
            "DeviceRGB".into(),
            1.into(),
            Object::String(vec![255, 255, 255, 0, 0, 0], StringFormat::Hexadecimal),
        ]);
        let space = color_space(&document, &Dictionary::new(), &object, 0).unwrap();
        assert_eq!(space, indexed_black_white());
    }

    #[test]
    fn test_named_color_space_comes_from_resources() {
        let document = lopdf::Document::with_version("1.5");
        let resources = dictionary! {
            "ColorSpace" => dictionary! { "CS0" => "DeviceGray" },
        };
        let space = color_space(&document, &resources, &Object::Name(b"CS0".to_vec()), 0);
        assert_eq!(space, Some(ColorSpace::Gray));

        let looping = dictionary! {
            "ColorSpace" => dictionary! { "CS0" => "CS0" },
        };
        assert_eq!(
            color_space(&document, &looping, &Object::Name(b"CS0".to_vec()), 0),
            None
        );
    }

    #[test]
    fn test_short_sample_buffer_is_rejected() {
        assert!(to_luma(4, 4, 8, &ColorSpace::Gray, &[0u8; 3]).is_none());
        assert!(to_luma(16, 4, 1, &ColorSpace::Gray, &[0u8; 3]).is_none());
        assert!(to_luma(1, 1, 3, &ColorSpace::Gray, &[0u8; 3]).is_none());
    }

    #[test]
    fn test_compose_adds_margins() {
        let images = vec![
            GrayImage::from_pixel(10, 5, Luma([0])),
            GrayImage::from_pixel(20, 5, Luma([0])),
        ];
        let canvas = compose(&images);
        assert_eq!(canvas.width(), 20 + 2 * CANVAS_MARGIN);
        assert_eq!(canvas.height(), 10 + 3 * CANVAS_MARGIN);
        assert_eq!(canvas.get_pixel(0, 0).0[0], 255);
        assert_eq!(canvas.get_pixel(CANVAS_MARGIN, CANVAS_MARGIN).0[0], 0);
    }

    #[test]
    fn test_scale_doubles_dimensions() {
        let scaled = scale_image(GrayImage::from_pixel(7, 3, Luma([0])), 2.0);
        assert_eq!((scaled.width(), scaled.height()), (14, 6));
        let unscaled = scale_image(GrayImage::from_pixel(7, 3, Luma([0])), 1.0);
        assert_eq!((unscaled.width(), unscaled.height()), (7, 3));
    }
}

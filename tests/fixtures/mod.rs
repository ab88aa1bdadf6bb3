#![allow(dead_code)]
/// Shared fixtures: voucher PDFs built with lopdf and QR images built with qrcode
use chrono::{TimeZone, Utc};
use lopdf::content::{Content, Operation};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Object, Stream, StringFormat};
use qrcode::{Color, QrCode};
use std::io::Write;

use voucher_verify::records::{
    LifecycleState, MaterialLine, Operator, UserRef, Vehicle, VoucherCategory, VoucherRecord,
};
use voucher_verify::VoucherCode;

/// Pixels per QR module in the embedded image
const MODULE_PIXELS: usize = 4;
/// Light modules around the symbol
const QUIET_ZONE: usize = 4;

/// How the QR image XObject is stored in the PDF.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QrEncoding {
    /// Uncompressed 8-bit DeviceGray
    #[default]
    Raw,
    /// 8-bit DeviceGray, FlateDecode
    Flate,
    /// 8-bit DeviceGray, FlateDecode with PNG row predictors
    PngPredicted,
    /// 8-bit palette indices over DeviceRGB (0 = white, 1 = black), FlateDecode
    Indexed,
    /// 1-bit DeviceGray, FlateDecode
    OneBit,
}

/// Builder for a single-page voucher PDF.
#[derive(Default)]
pub struct VoucherPdf {
    lines: Vec<String>,
    qr_payload: Option<String>,
    qr_encoding: QrEncoding,
}

impl VoucherPdf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, line: &str) -> Self {
        self.lines.push(line.to_string());
        self
    }

    pub fn qr(mut self, payload: &str) -> Self {
        self.qr_payload = Some(payload.to_string());
        self
    }

    pub fn qr_encoding(mut self, encoding: QrEncoding) -> Self {
        self.qr_encoding = encoding;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut resources = lopdf::Dictionary::new();
        let mut operations = Vec::new();

        if !self.lines.is_empty() {
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Courier",
                "Encoding" => "WinAnsiEncoding",
            });
            resources.set("Font", dictionary! { "F1" => font_id });

            for (index, line) in self.lines.iter().enumerate() {
                let y = 760 - 16 * index as i64;
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
                operations.push(Operation::new("Td", vec![72.into(), y.into()]));
                // Trailing space keeps adjacent lines from running together
                operations.push(Operation::new(
                    "Tj",
                    vec![Object::string_literal(format!("{line} "))],
                ));
                operations.push(Operation::new("ET", vec![]));
            }
        }

        if let Some(payload) = &self.qr_payload {
            let image_id = doc.add_object(qr_image(payload, self.qr_encoding));
            resources.set("XObject", dictionary! { "Im1" => image_id });

            operations.push(Operation::new("q", vec![]));
            operations.push(Operation::new(
                "cm",
                vec![144.into(), 0.into(), 0.into(), 144.into(), 400.into(), 600.into()],
            ));
            operations.push(Operation::new("Do", vec!["Im1".into()]));
            operations.push(Operation::new("Q", vec![]));
        }

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let resources_id = doc.add_object(resources);
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }
}

fn qr_image(payload: &str, encoding: QrEncoding) -> Stream {
    let (side, pixels) = qr_pixels(payload);
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => side as i64,
        "Height" => side as i64,
        "ColorSpace" => "DeviceGray",
        "BitsPerComponent" => 8,
    };

    match encoding {
        QrEncoding::Raw => Stream::new(dict, pixels),
        QrEncoding::Flate => {
            let mut stream = Stream::new(dict, pixels);
            stream.compress().unwrap();
            assert!(stream.dict.get(b"Filter").is_ok());
            stream
        }
        QrEncoding::PngPredicted => {
            dict.set("Filter", "FlateDecode");
            dict.set(
                "DecodeParms",
                dictionary! { "Predictor" => 15, "Colors" => 1, "Columns" => side as i64 },
            );
            Stream::new(dict, deflate(&png_up_rows(&pixels, side)))
        }
        QrEncoding::Indexed => {
            dict.set(
                "ColorSpace",
                vec![
                    "Indexed".into(),
                    "DeviceRGB".into(),
                    1.into(),
                    Object::String(vec![255, 255, 255, 0, 0, 0], StringFormat::Hexadecimal),
                ],
            );
            dict.set("Filter", "FlateDecode");
            let indices: Vec<u8> = pixels.iter().map(|&p| u8::from(p == 0)).collect();
            Stream::new(dict, deflate(&indices))
        }
        QrEncoding::OneBit => {
            dict.set("BitsPerComponent", 1);
            dict.set("Filter", "FlateDecode");
            Stream::new(dict, deflate(&pack_bits(&pixels, side)))
        }
    }
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Prefix every row with PNG filter 2 (Up) and store the difference from the row above.
fn png_up_rows(pixels: &[u8], side: usize) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(pixels.len() + side);
    let mut previous = vec![0u8; side];
    for row in pixels.chunks(side) {
        encoded.push(2);
        encoded.extend(row.iter().zip(&previous).map(|(v, above)| v.wrapping_sub(*above)));
        previous = row.to_vec();
    }
    encoded
}

/// 1 bit per pixel, rows padded to whole bytes; white is 1.
fn pack_bits(pixels: &[u8], side: usize) -> Vec<u8> {
    let row_bytes = side.div_ceil(8);
    let mut packed = vec![0u8; row_bytes * side];
    for (y, row) in pixels.chunks(side).enumerate() {
        for (x, &value) in row.iter().enumerate() {
            if value != 0 {
                packed[y * row_bytes + x / 8] |= 0x80 >> (x % 8);
            }
        }
    }
    packed
}

/// 8-bit greyscale pixels of a QR symbol with its quiet zone; returns the side length.
pub fn qr_pixels(payload: &str) -> (usize, Vec<u8>) {
    let code = QrCode::new(payload.as_bytes()).unwrap();
    let modules = code.width();
    let colors = code.to_colors();
    let side = (modules + 2 * QUIET_ZONE) * MODULE_PIXELS;

    let mut pixels = vec![255u8; side * side];
    for y in 0..side {
        for x in 0..side {
            let mx = (x / MODULE_PIXELS) as isize - QUIET_ZONE as isize;
            let my = (y / MODULE_PIXELS) as isize - QUIET_ZONE as isize;
            if mx < 0 || my < 0 || mx >= modules as isize || my >= modules as isize {
                continue;
            }
            if colors[my as usize * modules + mx as usize] == Color::Dark {
                pixels[y * side + x] = 0;
            }
        }
    }
    (side, pixels)
}

pub fn issued_record(id: i64, code: &str, association_id: Option<i64>) -> VoucherRecord {
    VoucherRecord {
        id,
        code: VoucherCode::parse(code).unwrap(),
        state: LifecycleState::Issued,
        category: VoucherCategory::Material,
        operator: Operator {
            id: 100 + id,
            name: "Materiales del Norte".to_string(),
            association_id,
        },
        vehicle: Some(Vehicle {
            id: 200 + id,
            plate: "XYZ-9876".to_string(),
            description: None,
        }),
        created_by: Some(UserRef {
            id: "clerk-1".to_string(),
            full_name: "Luis Ortega".to_string(),
        }),
        created_at: Utc.with_ymd_and_hms(2025, 4, 2, 8, 0, 0).unwrap(),
        material_lines: vec![MaterialLine {
            material: "Arena".to_string(),
            quantity: 7.0,
            unit: "m3".to_string(),
            unit_cost: 180.0,
            total_cost: 1260.0,
        }],
        rental_lines: Vec::new(),
        verified: false,
        verified_by: None,
        verified_at: None,
        notes: None,
    }
}

// Stream filters for embedded image data.
//
// lopdf refuses to decompress image streams, so image XObjects are decoded
// here: byte-level filters in order, then the optional row predictor.

use std::io::Read;

use flate2::read::ZlibDecoder;
use lopdf::filters::png::{self, FilterType};
use lopdf::{Dictionary, Object};
use thiserror::Error;
use tracing::debug;
use weezl::{decode::Decoder as LzwDecoder, BitOrder};

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("unsupported filter {0}")]
    Unsupported(String),
    #[error("corrupt {filter} data: {message}")]
    Corrupt { filter: &'static str, message: String },
}

/// Image data after the byte-level filters are undone.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    /// Raw samples, rows packed as described by the image dictionary
    Samples(Vec<u8>),
    /// A JPEG bitstream (`DCTDecode` was the last filter)
    Jpeg(Vec<u8>),
}

/// Apply the filters named by `dict` to `content`.
pub fn decode_stream(dict: &Dictionary, content: &[u8]) -> Result<Decoded, FilterError> {
    let filters = filter_names(dict);
    let params = decode_params(dict, filters.len());

    let mut data = content.to_vec();
    for (index, filter) in filters.iter().enumerate() {
        let params = params.get(index).copied().flatten();
        data = match filter.as_slice() {
            b"FlateDecode" | b"Fl" => undo_predictor(inflate(&data)?, params)?,
            b"LZWDecode" | b"LZW" => undo_predictor(lzw(&data, params)?, params)?,
            b"ASCIIHexDecode" | b"AHx" => ascii_hex(&data)?,
            b"DCTDecode" | b"DCT" if index + 1 == filters.len() => return Ok(Decoded::Jpeg(data)),
            other => return Err(FilterError::Unsupported(String::from_utf8_lossy(other).into_owned())),
        };
    }
    Ok(Decoded::Samples(data))
}

pub fn filter_names(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(filters)) => filters
            .iter()
            .filter_map(|f| f.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

/// One parameter dictionary per filter; `DecodeParms` may be a single
/// dictionary or an array parallel to `Filter`.
fn decode_params(dict: &Dictionary, count: usize) -> Vec<Option<&Dictionary>> {
    match dict.get(b"DecodeParms") {
        Ok(Object::Dictionary(params)) => {
            let mut all = vec![None; count];
            if let Some(first) = all.first_mut() {
                *first = Some(params);
            }
            all
        }
        Ok(Object::Array(items)) => items.iter().map(|item| item.as_dict().ok()).collect(),
        _ => Vec::new(),
    }
}

fn inflate(data: &[u8]) -> Result<Vec<u8>, FilterError> {
    let mut output = Vec::with_capacity(data.len() * 4);
    if let Err(e) = ZlibDecoder::new(data).read_to_end(&mut output) {
        // Truncated streams are common; keep whatever was recovered
        if output.is_empty() {
            return Err(FilterError::Corrupt {
                filter: "FlateDecode",
                message: e.to_string(),
            });
        }
        debug!(error = %e, recovered = output.len(), "Flate stream ended early");
    }
    Ok(output)
}

fn lzw(data: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>, FilterError> {
    let early_change = params
        .and_then(|p| p.get(b"EarlyChange").and_then(Object::as_i64).ok())
        .unwrap_or(1)
        != 0;
    let mut decoder = if early_change {
        LzwDecoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        LzwDecoder::new(BitOrder::Msb, 8)
    };

    let mut output = Vec::new();
    let result = decoder.into_stream(&mut output).decode_all(data);
    if let Err(e) = result.status {
        if output.is_empty() {
            return Err(FilterError::Corrupt {
                filter: "LZWDecode",
                message: e.to_string(),
            });
        }
        debug!(error = %e, recovered = output.len(), "LZW stream ended early");
    }
    Ok(output)
}

fn ascii_hex(data: &[u8]) -> Result<Vec<u8>, FilterError> {
    let mut digits = Vec::with_capacity(data.len());
    for &byte in data {
        match byte {
            b'>' => break,
            b if b.is_ascii_whitespace() => {}
            b if b.is_ascii_hexdigit() => digits.push(b),
            other => {
                return Err(FilterError::Corrupt {
                    filter: "ASCIIHexDecode",
                    message: format!("unexpected byte 0x{other:02x}"),
                })
            }
        }
    }
    // An odd final digit is followed by an implicit 0
    if digits.len() % 2 == 1 {
        digits.push(b'0');
    }
    Ok(digits
        .chunks_exact(2)
        .map(|pair| (hex_value(pair[0]) << 4) | hex_value(pair[1]))
        .collect())
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

fn undo_predictor(data: Vec<u8>, params: Option<&Dictionary>) -> Result<Vec<u8>, FilterError> {
    let Some(params) = params else {
        return Ok(data);
    };
    let number = |key: &[u8]| {
        params
            .get(key)
            .and_then(Object::as_i64)
            .ok()
            .map(|value| value.max(1) as usize)
    };
    let predictor = params.get(b"Predictor").and_then(Object::as_i64).unwrap_or(1);
    let colors = number(b"Colors").unwrap_or(1);
    let bits = number(b"BitsPerComponent").unwrap_or(8);
    let columns = number(b"Columns").unwrap_or(1);

    let row_bytes = (colors * bits * columns).div_ceil(8);
    let bytes_per_pixel = (colors * bits).div_ceil(8);

    match predictor {
        1 => Ok(data),
        2 if bits == 8 => Ok(undo_tiff(data, colors, row_bytes)),
        10..=15 => undo_png(&data, bytes_per_pixel, row_bytes),
        other => Err(FilterError::Unsupported(format!(
            "predictor {other} with {bits} bits per component"
        ))),
    }
}

/// TIFF predictor 2: each sample is stored as the difference from the
/// same component of the pixel to its left.
fn undo_tiff(mut data: Vec<u8>, colors: usize, row_bytes: usize) -> Vec<u8> {
    for row in data.chunks_mut(row_bytes) {
        for i in colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - colors]);
        }
    }
    data
}

/// PNG predictors: every row is prefixed with its own filter type byte.
fn undo_png(data: &[u8], bytes_per_pixel: usize, row_bytes: usize) -> Result<Vec<u8>, FilterError> {
    let mut previous = vec![0u8; row_bytes];
    let mut decoded = Vec::with_capacity(data.len());

    for chunk in data.chunks(row_bytes + 1) {
        let Some((&tag, samples)) = chunk.split_first() else {
            continue;
        };
        let filter = FilterType::try_from(tag).map_err(|_| FilterError::Corrupt {
            filter: "Predictor",
            message: format!("invalid PNG row filter {tag}"),
        })?;

        let mut current = samples.to_vec();
        current.resize(row_bytes, 0);
        png::decode_row(filter, bytes_per_pixel, &previous, &mut current);
        decoded.extend_from_slice(&current);
        previous = current;
    }
    Ok(decoded)
}

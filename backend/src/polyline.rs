//! Encoded polyline format at 1e-5 degree precision: each coordinate is the
//! zigzag-encoded delta from the previous one, split into 5-bit chunks offset
//! by 63 into printable ASCII.

use crate::models::Coordinate;

const FACTOR: f64 = 1e5;
const CHUNK_BITS: u32 = 5;
const CHUNK_MASK: i64 = 0x1f;
const CONTINUATION: i64 = 0x20;
const ASCII_OFFSET: i64 = 63;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolylineError {
    #[error("invalid polyline character {character:?} at byte {position}")]
    InvalidCharacter { character: char, position: usize },
    #[error("polyline ends in the middle of a value")]
    Truncated,
    #[error("polyline value at byte {position} overflows")]
    Overflow { position: usize },
    #[error("polyline has a latitude without a longitude")]
    DanglingLatitude,
}

pub fn encode(points: &[Coordinate]) -> String {
    let mut output = String::with_capacity(points.len() * 8);
    let mut previous = (0i64, 0i64);

    for point in points {
        let lat = quantize(point.lat);
        let lon = quantize(point.lon);
        encode_value(lat - previous.0, &mut output);
        encode_value(lon - previous.1, &mut output);
        previous = (lat, lon);
    }

    output
}

pub fn decode(encoded: &str) -> Result<Vec<Coordinate>, PolylineError> {
    let bytes = encoded.as_bytes();
    let mut position = 0;
    let mut lat = 0i64;
    let mut lon = 0i64;
    let mut points = Vec::with_capacity(bytes.len() / 4);

    while position < bytes.len() {
        lat += decode_value(encoded, &mut position)?;
        if position >= bytes.len() {
            return Err(PolylineError::DanglingLatitude);
        }
        lon += decode_value(encoded, &mut position)?;
        points.push(Coordinate::new(lat as f64 / FACTOR, lon as f64 / FACTOR));
    }

    Ok(points)
}

/// Largest per-axis error introduced by an encode/decode cycle.
pub fn precision_deg() -> f64 {
    0.5 / FACTOR
}

fn quantize(value: f64) -> i64 {
    (value * FACTOR).round() as i64
}

fn encode_value(delta: i64, output: &mut String) {
    let mut value = (delta << 1) ^ (delta >> 63);
    while value >= CONTINUATION {
        push_chunk(((value & CHUNK_MASK) | CONTINUATION) + ASCII_OFFSET, output);
        value >>= CHUNK_BITS;
    }
    push_chunk(value + ASCII_OFFSET, output);
}

fn push_chunk(chunk: i64, output: &mut String) {
    // Chunks are at most 63 + 63, always ASCII.
    output.push(char::from(chunk as u8));
}

fn decode_value(encoded: &str, position: &mut usize) -> Result<i64, PolylineError> {
    let bytes = encoded.as_bytes();
    let mut result = 0i64;
    let mut shift = 0u32;

    loop {
        let Some(&byte) = bytes.get(*position) else {
            return Err(PolylineError::Truncated);
        };
        let chunk = i64::from(byte) - ASCII_OFFSET;
        if !(0..64).contains(&chunk) {
            let character = encoded[*position..].chars().next().unwrap_or('\u{fffd}');
            return Err(PolylineError::InvalidCharacter {
                character,
                position: *position,
            });
        }
        if shift > 60 {
            return Err(PolylineError::Overflow {
                position: *position,
            });
        }
        result |= (chunk & CHUNK_MASK) << shift;
        shift += CHUNK_BITS;
        *position += 1;
        if chunk & CONTINUATION == 0 {
            break;
        }
    }

    Ok(if result & 1 != 0 {
        !(result >> 1)
    } else {
        result >> 1
    })
}

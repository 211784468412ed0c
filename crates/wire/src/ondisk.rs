//! On-disk field encoding
//!
//! Every field is a header byte followed by a fixed-width big-endian payload.
//! Payloads are transformed so that keys compare correctly as raw bytes:
//!
//! - signed integers and datetime seconds have their sign bit flipped
//! - reals use the usual order-preserving float transform
//! - strings are NUL-padded
//!
//! Null fields keep a zeroed payload.

use byteorder::{BigEndian, ByteOrder};
use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use fdb_core::{ConversionErrorKind, Field, FieldType};

use crate::row::WireValue;

/// Header byte of a null field
pub const HEADER_NULL: u8 = 0x00;
/// Header byte of a present field
pub const HEADER_PRESENT: u8 = 0x08;

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

type FieldResult<T> = Result<T, ConversionErrorKind>;

fn mismatch(field: &Field, value: &WireValue) -> ConversionErrorKind {
    ConversionErrorKind::TypeMismatch {
        expected: field.ty.name(),
        found: value.type_name(),
    }
}

fn out_of_range(field: &Field) -> ConversionErrorKind {
    ConversionErrorKind::OutOfRange {
        target: field.ty.name(),
    }
}

#[inline]
fn flip_i64(v: i64) -> u64 {
    (v as u64) ^ (1 << 63)
}

#[inline]
fn unflip_i64(v: u64) -> i64 {
    (v ^ (1 << 63)) as i64
}

#[inline]
fn sortable_f64(f: f64) -> u64 {
    let bits = f.to_bits();
    if bits >> 63 == 1 {
        !bits
    } else {
        bits ^ (1 << 63)
    }
}

#[inline]
fn unsortable_f64(bits: u64) -> f64 {
    if bits >> 63 == 1 {
        f64::from_bits(bits ^ (1 << 63))
    } else {
        f64::from_bits(!bits)
    }
}

#[inline]
fn sortable_f32(f: f32) -> u32 {
    let bits = f.to_bits();
    if bits >> 31 == 1 {
        !bits
    } else {
        bits ^ (1 << 31)
    }
}

#[inline]
fn unsortable_f32(bits: u32) -> f32 {
    if bits >> 31 == 1 {
        f32::from_bits(bits ^ (1 << 31))
    } else {
        f32::from_bits(!bits)
    }
}

/// Parse a datetime from text in either accepted layout
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

/// Encode one wire value into `out`, which is exactly the field's on-disk width
///
/// Blob payloads are pushed onto `blobs`; a null blob pushes `None`.
pub fn encode_field(
    field: &Field,
    value: WireValue,
    tz: Tz,
    out: &mut [u8],
    blobs: &mut Vec<Option<Vec<u8>>>,
) -> FieldResult<()> {
    debug_assert_eq!(out.len(), field.ty.on_disk_width());

    if matches!(value, WireValue::Null) {
        if !field.nullable {
            return Err(ConversionErrorKind::NullConstraint);
        }
        out.fill(0);
        out[0] = HEADER_NULL;
        if field.ty.is_blob() {
            blobs.push(None);
        }
        return Ok(());
    }

    let (header, payload) = out.split_at_mut(1);
    header[0] = HEADER_PRESENT;

    match field.ty {
        FieldType::Int16 | FieldType::Int32 | FieldType::Int64 | FieldType::UInt32 => {
            let v = match value {
                WireValue::Integer(v) => v,
                other => return Err(mismatch(field, &other)),
            };
            match field.ty {
                FieldType::Int16 => {
                    let v = i16::try_from(v).map_err(|_| out_of_range(field))?;
                    BigEndian::write_u16(payload, (v as u16) ^ 0x8000);
                }
                FieldType::Int32 => {
                    let v = i32::try_from(v).map_err(|_| out_of_range(field))?;
                    BigEndian::write_u32(payload, (v as u32) ^ 0x8000_0000);
                }
                FieldType::UInt32 => {
                    let v = u32::try_from(v).map_err(|_| out_of_range(field))?;
                    BigEndian::write_u32(payload, v);
                }
                _ => BigEndian::write_u64(payload, flip_i64(v)),
            }
        }
        FieldType::Real32 => {
            let f = match value {
                WireValue::Real(f) => f,
                WireValue::Integer(i) => i as f64,
                other => return Err(mismatch(field, &other)),
            };
            let narrowed = f as f32;
            if f.is_finite() && narrowed.is_infinite() {
                return Err(out_of_range(field));
            }
            BigEndian::write_u32(payload, sortable_f32(narrowed));
        }
        FieldType::Real64 => {
            let f = match value {
                WireValue::Real(f) => f,
                WireValue::Integer(i) => i as f64,
                other => return Err(mismatch(field, &other)),
            };
            BigEndian::write_u64(payload, sortable_f64(f));
        }
        FieldType::CString(width) => {
            let text = match value {
                WireValue::Text(s) => s,
                other => return Err(mismatch(field, &other)),
            };
            let bytes = text.as_bytes();
            if bytes.contains(&0) {
                return Err(ConversionErrorKind::TypeMismatch {
                    expected: field.ty.name(),
                    found: "text containing NUL",
                });
            }
            // Room for the terminator
            if bytes.len() >= width {
                return Err(out_of_range(field));
            }
            payload[..bytes.len()].copy_from_slice(bytes);
            payload[bytes.len()..].fill(0);
        }
        FieldType::Bytes(width) => {
            let bytes = match value {
                WireValue::Blob(b) => b,
                WireValue::Text(s) => s.into_bytes(),
                other => return Err(mismatch(field, &other)),
            };
            if bytes.len() != width {
                return Err(out_of_range(field));
            }
            payload.copy_from_slice(&bytes);
        }
        FieldType::Blob => {
            let bytes = match value {
                WireValue::Blob(b) => b,
                WireValue::Text(s) => s.into_bytes(),
                other => return Err(mismatch(field, &other)),
            };
            let len = u32::try_from(bytes.len()).map_err(|_| out_of_range(field))?;
            BigEndian::write_u32(payload, len);
            blobs.push(Some(bytes));
        }
        FieldType::Datetime => {
            let (secs, micros) = match value {
                WireValue::Datetime(local) => resolve_local(field, local, tz)?,
                WireValue::Text(s) => match parse_datetime(&s) {
                    Some(local) => resolve_local(field, local, tz)?,
                    None => return Err(mismatch(field, &WireValue::Text(s))),
                },
                WireValue::Integer(secs) => (secs, 0),
                other => return Err(mismatch(field, &other)),
            };
            BigEndian::write_u64(&mut payload[..8], flip_i64(secs));
            BigEndian::write_u32(&mut payload[8..], micros);
        }
    }
    Ok(())
}

/// Resolve a local wall-clock time in `tz` to UTC seconds and microseconds
fn resolve_local(field: &Field, local: NaiveDateTime, tz: Tz) -> FieldResult<(i64, u32)> {
    let instant = tz
        .from_local_datetime(&local)
        .earliest()
        .ok_or(ConversionErrorKind::TypeMismatch {
            expected: field.ty.name(),
            found: "nonexistent local time",
        })?;
    Ok((instant.timestamp(), instant.timestamp_subsec_micros()))
}

/// Decode one on-disk field back to a wire value
///
/// `blob` must be the payload belonging to this field when it is a blob.
pub fn decode_field(
    field: &Field,
    bytes: &[u8],
    blob: Option<&[u8]>,
    tz: Tz,
) -> FieldResult<WireValue> {
    if bytes.len() != field.ty.on_disk_width() {
        return Err(ConversionErrorKind::TruncatedInput);
    }
    let (header, payload) = bytes.split_at(1);
    match header[0] {
        HEADER_NULL => return Ok(WireValue::Null),
        HEADER_PRESENT => {}
        other => {
            return Err(ConversionErrorKind::Malformed(format!(
                "unknown field header 0x{:02x}",
                other
            )))
        }
    }

    let value = match field.ty {
        FieldType::Int16 => {
            WireValue::Integer((BigEndian::read_u16(payload) ^ 0x8000) as i16 as i64)
        }
        FieldType::Int32 => {
            WireValue::Integer((BigEndian::read_u32(payload) ^ 0x8000_0000) as i32 as i64)
        }
        FieldType::UInt32 => WireValue::Integer(BigEndian::read_u32(payload) as i64),
        FieldType::Int64 => WireValue::Integer(unflip_i64(BigEndian::read_u64(payload))),
        FieldType::Real32 => WireValue::Real(unsortable_f32(BigEndian::read_u32(payload)) as f64),
        FieldType::Real64 => WireValue::Real(unsortable_f64(BigEndian::read_u64(payload))),
        FieldType::CString(_) => {
            let end = payload.iter().position(|b| *b == 0).unwrap_or(payload.len());
            let text = std::str::from_utf8(&payload[..end])
                .map_err(|_| ConversionErrorKind::Malformed("cstring is not UTF-8".into()))?;
            WireValue::Text(text.to_string())
        }
        FieldType::Bytes(_) => WireValue::Blob(payload.to_vec()),
        FieldType::Blob => {
            let len = BigEndian::read_u32(payload) as usize;
            let data = blob.ok_or(ConversionErrorKind::TruncatedInput)?;
            if data.len() != len {
                return Err(ConversionErrorKind::Malformed(format!(
                    "blob length {} does not match payload of {} bytes",
                    len,
                    data.len()
                )));
            }
            WireValue::Blob(data.to_vec())
        }
        FieldType::Datetime => {
            let secs = unflip_i64(BigEndian::read_u64(&payload[..8]));
            let micros = BigEndian::read_u32(&payload[8..]);
            let instant = tz
                .timestamp_opt(secs, micros.saturating_mul(1000))
                .single()
                .ok_or(out_of_range(field))?;
            WireValue::Datetime(instant.naive_local())
        }
    };
    Ok(value)
}

//! Wire row format
//!
//! Rows exchanged with a remote peer are self-describing: a field count
//! followed by tagged, variable-length fields. Index keys use the same format
//! over the index's columns.
//!
//! ## Layout
//!
//! All integers are big-endian.
//!
//! | Tag | Value | Payload |
//! |-----|-------|---------|
//! | 0 | Null | none |
//! | 1 | Integer | i64 |
//! | 2 | Real | f64 |
//! | 3 | Text | u32 length + UTF-8 |
//! | 4 | Blob | u32 length + bytes |
//! | 5 | Datetime | i64 local wall-clock seconds + u32 microseconds |
//!
//! The row starts with a u16 field count, so a row holds at most 65535
//! fields and a text or blob payload at most `u32::MAX` bytes.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use chrono::{DateTime, NaiveDateTime};
use fdb_core::WireBuffer;
use thiserror::Error;

const TAG_NULL: u8 = 0;
const TAG_INTEGER: u8 = 1;
const TAG_REAL: u8 = 2;
const TAG_TEXT: u8 = 3;
const TAG_BLOB: u8 = 4;
const TAG_DATETIME: u8 = 5;

/// A single wire field value
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// SQL NULL
    Null,
    /// 64-bit integer
    Integer(i64),
    /// 64-bit float
    Real(f64),
    /// UTF-8 text
    Text(String),
    /// Raw bytes
    Blob(Vec<u8>),
    /// Local wall-clock time; the timezone is implied by the session
    Datetime(NaiveDateTime),
}

impl WireValue {
    /// Type name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            WireValue::Null => "null",
            WireValue::Integer(_) => "integer",
            WireValue::Real(_) => "real",
            WireValue::Text(_) => "text",
            WireValue::Blob(_) => "blob",
            WireValue::Datetime(_) => "datetime",
        }
    }
}

/// Wire decoding errors
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    /// Input ended inside a field
    #[error("unexpected end of input")]
    UnexpectedEnd,

    /// Unknown field tag
    #[error("unknown field tag {0}")]
    UnknownTag(u8),

    /// Text payload is not UTF-8
    #[error("text is not valid UTF-8")]
    InvalidUtf8,

    /// Datetime payload out of range
    #[error("datetime out of range: {0}s")]
    InvalidDatetime(i64),

    /// Bytes left over after the last field
    #[error("{0} trailing bytes after last field")]
    TrailingBytes(usize),
}

/// Wire encoding errors
#[derive(Debug, Error, PartialEq)]
pub enum EncodeError {
    /// More fields than the u16 count can express
    #[error("{0} fields exceed the wire row limit")]
    TooManyFields(usize),

    /// Text or blob longer than the u32 length can express
    #[error("{kind} of {len} bytes exceeds the wire length limit")]
    ValueTooLong {
        /// Value kind
        kind: &'static str,
        /// Payload length
        len: usize,
    },
}

/// Encode values into a wire row
pub fn encode_row(values: &[WireValue]) -> Result<WireBuffer, EncodeError> {
    let count = u16::try_from(values.len()).map_err(|_| EncodeError::TooManyFields(values.len()))?;
    let mut out = Vec::with_capacity(2 + values.len() * 9);
    // Writes into a Vec cannot fail
    let _ = out.write_u16::<BigEndian>(count);
    for value in values {
        encode_value(&mut out, value)?;
    }
    Ok(WireBuffer::new(out))
}

fn payload_len(kind: &'static str, len: usize) -> Result<u32, EncodeError> {
    u32::try_from(len).map_err(|_| EncodeError::ValueTooLong { kind, len })
}

fn encode_value(out: &mut Vec<u8>, value: &WireValue) -> Result<(), EncodeError> {
    match value {
        WireValue::Null => out.push(TAG_NULL),
        WireValue::Integer(i) => {
            out.push(TAG_INTEGER);
            let _ = out.write_i64::<BigEndian>(*i);
        }
        WireValue::Real(f) => {
            out.push(TAG_REAL);
            let _ = out.write_f64::<BigEndian>(*f);
        }
        WireValue::Text(s) => {
            let len = payload_len("text", s.len())?;
            out.push(TAG_TEXT);
            let _ = out.write_u32::<BigEndian>(len);
            out.extend_from_slice(s.as_bytes());
        }
        WireValue::Blob(b) => {
            let len = payload_len("blob", b.len())?;
            out.push(TAG_BLOB);
            let _ = out.write_u32::<BigEndian>(len);
            out.extend_from_slice(b);
        }
        WireValue::Datetime(dt) => {
            let utc = dt.and_utc();
            out.push(TAG_DATETIME);
            let _ = out.write_i64::<BigEndian>(utc.timestamp());
            let _ = out.write_u32::<BigEndian>(utc.timestamp_subsec_micros());
        }
    }
    Ok(())
}

/// Decode a whole wire row
pub fn decode_row(bytes: &[u8]) -> Result<Vec<WireValue>, DecodeError> {
    let mut reader = RowReader::new(bytes)?;
    let mut values = Vec::with_capacity(reader.field_count());
    while let Some(value) = reader.next_value() {
        values.push(value?);
    }
    reader.finish()?;
    Ok(values)
}

/// Field-by-field reader over a wire row
///
/// Lets the codec attribute a decoding failure to the schema field being
/// read.
pub struct RowReader<'a> {
    input: &'a [u8],
    pos: usize,
    count: usize,
    read: usize,
}

impl<'a> RowReader<'a> {
    /// Start reading a row; fails if the field count is missing
    pub fn new(input: &'a [u8]) -> Result<Self, DecodeError> {
        if input.len() < 2 {
            return Err(DecodeError::UnexpectedEnd);
        }
        Ok(RowReader {
            input,
            pos: 2,
            count: BigEndian::read_u16(input) as usize,
            read: 0,
        })
    }

    /// Number of fields the row declares
    pub fn field_count(&self) -> usize {
        self.count
    }

    /// Read the next field, or `None` once all declared fields are read
    pub fn next_value(&mut self) -> Option<Result<WireValue, DecodeError>> {
        if self.read == self.count {
            return None;
        }
        self.read += 1;
        Some(self.parse_value())
    }

    /// Check that nothing follows the last field
    pub fn finish(&self) -> Result<(), DecodeError> {
        match self.input.len() - self.pos {
            0 => Ok(()),
            rest => Err(DecodeError::TrailingBytes(rest)),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::UnexpectedEnd)?;
        if end > self.input.len() {
            return Err(DecodeError::UnexpectedEnd);
        }
        let slice = &self.input[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn parse_value(&mut self) -> Result<WireValue, DecodeError> {
        let tag = self.take(1)?[0];
        match tag {
            TAG_NULL => Ok(WireValue::Null),
            TAG_INTEGER => Ok(WireValue::Integer(BigEndian::read_i64(self.take(8)?))),
            TAG_REAL => Ok(WireValue::Real(BigEndian::read_f64(self.take(8)?))),
            TAG_TEXT => {
                let len = BigEndian::read_u32(self.take(4)?) as usize;
                let bytes = self.take(len)?;
                std::str::from_utf8(bytes)
                    .map(|s| WireValue::Text(s.to_string()))
                    .map_err(|_| DecodeError::InvalidUtf8)
            }
            TAG_BLOB => {
                let len = BigEndian::read_u32(self.take(4)?) as usize;
                Ok(WireValue::Blob(self.take(len)?.to_vec()))
            }
            TAG_DATETIME => {
                let secs = BigEndian::read_i64(self.take(8)?);
                let micros = BigEndian::read_u32(self.take(4)?);
                DateTime::from_timestamp(secs, micros.saturating_mul(1000))
                    .map(|dt| WireValue::Datetime(dt.naive_utc()))
                    .ok_or(DecodeError::InvalidDatetime(secs))
            }
            other => Err(DecodeError::UnknownTag(other)),
        }
    }
}

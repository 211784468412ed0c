//! Log entry framing
//!
//! Frame layout (big-endian):
//!
//! ```text
//! [u32 payload length][u32 CRC32 of payload][MessagePack payload]
//! ```

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use thiserror::Error;

use crate::wal::LogEntry;

/// Size of the frame header
pub const FRAME_HEADER_SIZE: usize = 8;

/// Framing errors
#[derive(Debug, Error, PartialEq)]
pub enum EntryError {
    /// Entry could not be serialized
    #[error("failed to serialize entry: {0}")]
    Serialize(String),

    /// Payload is not a valid entry
    #[error("failed to deserialize entry: {0}")]
    Deserialize(String),

    /// Frame extends past the end of the input
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes the frame needs
        needed: usize,
        /// Bytes available
        available: usize,
    },

    /// Payload checksum mismatch
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Checksum in the header
        stored: u32,
        /// Checksum of the payload read
        computed: u32,
    },
}

/// Encode one entry as a frame
pub fn encode_entry(entry: &LogEntry) -> Result<Vec<u8>, EntryError> {
    let payload = rmp_serde::to_vec(entry).map_err(|e| EntryError::Serialize(e.to_string()))?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    // Writes into a Vec cannot fail
    let _ = frame.write_u32::<BigEndian>(payload.len() as u32);
    let _ = frame.write_u32::<BigEndian>(crc32fast::hash(&payload));
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode the frame at the start of `bytes`, returning the entry and frame size
pub fn decode_entry(bytes: &[u8]) -> Result<(LogEntry, usize), EntryError> {
    if bytes.len() < FRAME_HEADER_SIZE {
        return Err(EntryError::Truncated {
            needed: FRAME_HEADER_SIZE,
            available: bytes.len(),
        });
    }
    let len = BigEndian::read_u32(&bytes[0..4]) as usize;
    let stored = BigEndian::read_u32(&bytes[4..8]);

    let end = FRAME_HEADER_SIZE + len;
    if bytes.len() < end {
        return Err(EntryError::Truncated {
            needed: end,
            available: bytes.len(),
        });
    }

    let payload = &bytes[FRAME_HEADER_SIZE..end];
    let computed = crc32fast::hash(payload);
    if stored != computed {
        return Err(EntryError::ChecksumMismatch { stored, computed });
    }

    let entry =
        rmp_serde::from_slice(payload).map_err(|e| EntryError::Deserialize(e.to_string()))?;
    Ok((entry, end))
}

/// Decode every frame in a buffer
pub fn decode_all(mut bytes: &[u8]) -> Result<Vec<LogEntry>, EntryError> {
    let mut entries = Vec::new();
    while !bytes.is_empty() {
        let (entry, used) = decode_entry(bytes)?;
        entries.push(entry);
        bytes = &bytes[used..];
    }
    Ok(entries)
}

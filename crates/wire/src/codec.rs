//! Row and index key conversion
//!
//! [`RowCodec`] turns wire rows and expression-index keys into this node's
//! on-disk layout, and on-disk rows back into wire rows.

use chrono_tz::Tz;
use fdb_core::{
    BackendConfig, ConversionError, ConversionErrorKind, IndexKeys, KeyBuffer, OnDiskBuffer,
    OnDiskRow, Schema, TableDef, WireBuffer,
};

use crate::ondisk::{decode_field, encode_field};
use crate::row::{encode_row, DecodeError, EncodeError, RowReader, WireValue};

/// Format name of the peer row format
pub const WIRE_FORMAT: &str = "wire";
/// Format name of the on-disk row layout
pub const ONDISK_FORMAT: &str = ".ONDISK";
/// Format name of the on-disk index key layout
pub const ONDISK_INDEX_FORMAT: &str = ".ONDISK_ix";

/// Wildcard field name for failures not tied to one field
const WHOLE_RECORD: &str = "*";

impl From<DecodeError> for ConversionErrorKind {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::UnexpectedEnd => ConversionErrorKind::TruncatedInput,
            other => ConversionErrorKind::Malformed(other.to_string()),
        }
    }
}

impl From<EncodeError> for ConversionErrorKind {
    fn from(err: EncodeError) -> Self {
        ConversionErrorKind::Malformed(err.to_string())
    }
}

/// Converts rows and index keys between wire and on-disk layouts
#[derive(Debug, Clone)]
pub struct RowCodec {
    expression_indexes: bool,
}

impl Default for RowCodec {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RowCodec {
    /// Create a codec; `expression_indexes` enables index key conversion
    pub fn new(expression_indexes: bool) -> Self {
        Self { expression_indexes }
    }

    /// Create a codec from backend configuration
    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(config.expression_indexes)
    }

    /// Check if expression-index keys are converted
    pub fn converts_expression_indexes(&self) -> bool {
        self.expression_indexes
    }

    /// Convert a wire row into the table's on-disk row
    ///
    /// Consumes the wire buffer. Datetimes are resolved in `tz`.
    pub fn convert_row(
        &self,
        table: &TableDef,
        wire: WireBuffer,
        tz: Tz,
    ) -> Result<OnDiskRow, ConversionError> {
        let (data, blobs) = encode_record(&table.name, &table.schema, &wire, tz, ONDISK_FORMAT)?;
        Ok(OnDiskRow::new(data, blobs))
    }

    /// Convert the wire keys of expression indexes to on-disk keys
    ///
    /// Returns the input untouched when conversion is disabled or the table
    /// has no expression indexes. Slots of plain indexes pass through.
    pub fn convert_index_keys(
        &self,
        table: &TableDef,
        keys: IndexKeys,
        tz: Tz,
    ) -> Result<IndexKeys, ConversionError> {
        if !self.expression_indexes || !table.has_expression_indexes() {
            return Ok(keys);
        }

        let mut slots = keys.into_slots();
        for (ix, slot) in slots.iter_mut().enumerate() {
            let index = match table.index(ix) {
                Some(index) if index.expression => index,
                _ => continue,
            };
            let wire = match slot.take() {
                Some(KeyBuffer::Wire(wire)) => wire,
                other => {
                    *slot = other;
                    continue;
                }
            };

            let (key, blobs) =
                encode_record(&table.name, &index.schema, &wire, tz, ONDISK_INDEX_FORMAT)?;
            if !blobs.is_empty() {
                return Err(ConversionError::new(
                    ConversionErrorKind::TypeMismatch {
                        expected: "fixed-width key",
                        found: "blob",
                    },
                    &table.name,
                    &index.name,
                    WIRE_FORMAT,
                    ONDISK_INDEX_FORMAT,
                ));
            }
            if key.len() != index.key_size() {
                return Err(ConversionError::new(
                    ConversionErrorKind::IndexSizeMismatch {
                        expected: index.key_size(),
                        actual: key.len(),
                    },
                    &table.name,
                    &index.name,
                    WIRE_FORMAT,
                    ONDISK_INDEX_FORMAT,
                ));
            }
            *slot = Some(KeyBuffer::OnDisk(key));
        }
        Ok(IndexKeys::from_slots(slots))
    }

    /// Convert an on-disk row back to a wire row
    pub fn row_to_wire(
        &self,
        table: &TableDef,
        row: &OnDiskRow,
        tz: Tz,
    ) -> Result<WireBuffer, ConversionError> {
        let fail = |kind: ConversionErrorKind, field: &str| {
            ConversionError::new(kind, &table.name, field, ONDISK_FORMAT, WIRE_FORMAT)
        };

        let data = row.data().as_bytes();
        if data.len() != table.row_size() {
            return Err(fail(ConversionErrorKind::TruncatedInput, WHOLE_RECORD));
        }

        let mut values = Vec::with_capacity(table.schema.len());
        let mut offset = 0;
        let mut blobs = row.blobs().iter();
        for field in &table.schema.fields {
            let width = field.ty.on_disk_width();
            let blob = if field.ty.is_blob() {
                match blobs.next() {
                    Some(blob) => blob.as_deref(),
                    None => return Err(fail(ConversionErrorKind::TruncatedInput, &field.name)),
                }
            } else {
                None
            };
            let value = decode_field(field, &data[offset..offset + width], blob, tz)
                .map_err(|kind| fail(kind, &field.name))?;
            values.push(value);
            offset += width;
        }
        encode_row(&values).map_err(|e| fail(e.into(), WHOLE_RECORD))
    }
}

/// Encode a wire record against a schema into a freshly allocated buffer
fn encode_record(
    table: &str,
    schema: &Schema,
    wire: &WireBuffer,
    tz: Tz,
    to: &'static str,
) -> Result<(OnDiskBuffer, Vec<Option<Vec<u8>>>), ConversionError> {
    let fail = |kind: ConversionErrorKind, field: &str| {
        ConversionError::new(kind, table, field, WIRE_FORMAT, to)
    };

    let size = schema.on_disk_size();
    let mut out = OnDiskBuffer::zeroed(size)
        .map_err(|_| fail(ConversionErrorKind::AllocationFailed { size }, WHOLE_RECORD))?;

    let mut reader =
        RowReader::new(wire.as_bytes()).map_err(|e| fail(e.into(), WHOLE_RECORD))?;
    if reader.field_count() > schema.len() {
        return Err(fail(
            ConversionErrorKind::FieldCountMismatch {
                expected: schema.len(),
                found: reader.field_count(),
            },
            WHOLE_RECORD,
        ));
    }

    let mut blobs = Vec::with_capacity(schema.blob_count());
    let mut offset = 0;
    for field in &schema.fields {
        let value: WireValue = match reader.next_value() {
            Some(value) => value.map_err(|e| fail(e.into(), &field.name))?,
            None => return Err(fail(ConversionErrorKind::TruncatedInput, &field.name)),
        };
        let width = field.ty.on_disk_width();
        encode_field(
            field,
            value,
            tz,
            &mut out.as_mut_bytes()[offset..offset + width],
            &mut blobs,
        )
        .map_err(|kind| fail(kind, &field.name))?;
        offset += width;
    }
    reader.finish().map_err(|e| fail(e.into(), WHOLE_RECORD))?;

    Ok((out, blobs))
}

//! Row codec for the federated backend
//!
//! Remote peers ship rows and index keys in a self-describing wire format;
//! this node stores them in a fixed, byte-comparable on-disk layout. This
//! crate converts between the two.
//!
//! - [`row`]: the wire row format
//! - [`ondisk`]: per-field on-disk encoding
//! - [`codec`]: [`RowCodec`], whole-row and index-key conversion
//!
//! ## Examples
//!
//! ```
//! use fdb_core::{Field, FieldType, TableDef};
//! use fdb_wire::{encode_row, RowCodec, WireValue};
//!
//! let table = TableDef::new("t", vec![Field::new("a", FieldType::Int64)]);
//! let codec = RowCodec::default();
//!
//! let wire = encode_row(&[WireValue::Integer(7)]).unwrap();
//! let row = codec.convert_row(&table, wire, chrono_tz::Tz::UTC).unwrap();
//! assert_eq!(row.data().len(), table.row_size());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod ondisk;
pub mod row;

pub use codec::{RowCodec, ONDISK_FORMAT, ONDISK_INDEX_FORMAT, WIRE_FORMAT};
pub use ondisk::parse_datetime;
pub use row::{decode_row, encode_row, DecodeError, EncodeError, RowReader, WireValue};

use chrono_tz::Tz;

/// Parse a timezone name
pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.parse().ok()
}

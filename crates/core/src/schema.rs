//! Table and index schemas
//!
//! The on-disk layout of a row is fully determined by its [`Schema`]: every
//! field is a one-byte header followed by a fixed-width payload. Blob fields
//! keep only their length inline; the payload travels out of line.
//!
//! Index key sizes are recorded separately on [`IndexDef`] because they come
//! from the local storage engine, while the index schema used to convert a
//! key may come from a peer. A disagreement between the two is a schema skew.

use serde::{Deserialize, Serialize};

/// Maximum number of out-of-line blob fields per table
pub const MAX_BLOBS: usize = 15;

/// Width of the per-field header byte
pub const FIELD_HEADER_WIDTH: usize = 1;

/// Physical field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 32-bit unsigned integer
    UInt32,
    /// 32-bit float
    Real32,
    /// 64-bit float
    Real64,
    /// NUL-padded string; width includes the terminator
    CString(usize),
    /// Fixed-length byte array
    Bytes(usize),
    /// Variable-length blob stored out of line
    Blob,
    /// UTC timestamp: seconds plus microseconds
    Datetime,
}

impl FieldType {
    /// Width of the payload after the header byte
    pub fn payload_width(&self) -> usize {
        match self {
            FieldType::Int16 => 2,
            FieldType::Int32 | FieldType::UInt32 | FieldType::Real32 => 4,
            FieldType::Int64 | FieldType::Real64 => 8,
            FieldType::CString(len) | FieldType::Bytes(len) => *len,
            FieldType::Blob => 4,
            FieldType::Datetime => 12,
        }
    }

    /// Total on-disk width including the header byte
    pub fn on_disk_width(&self) -> usize {
        FIELD_HEADER_WIDTH + self.payload_width()
    }

    /// Check if the payload is stored out of line
    pub fn is_blob(&self) -> bool {
        matches!(self, FieldType::Blob)
    }

    /// Type name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Int16 => "int16",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::UInt32 => "uint32",
            FieldType::Real32 => "real32",
            FieldType::Real64 => "real64",
            FieldType::CString(_) => "cstring",
            FieldType::Bytes(_) => "bytes",
            FieldType::Blob => "blob",
            FieldType::Datetime => "datetime",
        }
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column name
    pub name: String,
    /// Physical type
    pub ty: FieldType,
    /// Whether null is allowed
    pub nullable: bool,
}

impl Field {
    /// Create a nullable field
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
        }
    }

    /// Mark the field as non-nullable
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Ordered list of fields describing one physical layout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Fields in layout order
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a schema from fields
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Total on-disk size of a record with this layout
    pub fn on_disk_size(&self) -> usize {
        self.fields.iter().map(|f| f.ty.on_disk_width()).sum()
    }

    /// Number of out-of-line blob fields
    pub fn blob_count(&self) -> usize {
        self.fields.iter().filter(|f| f.ty.is_blob()).count()
    }

    /// Check if a column with this name exists (ASCII case-insensitive)
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Column names in layout order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the schema has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Secondary index definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name
    pub name: String,
    /// Key layout
    pub schema: Schema,
    /// Key is computed from expressions over row columns
    pub expression: bool,
    /// Index stores a copy of the full row
    pub datacopy: bool,
    key_size: usize,
}

impl IndexDef {
    /// Create a plain index whose key size follows its schema
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        let key_size = schema.on_disk_size();
        Self {
            name: name.into(),
            schema,
            expression: false,
            datacopy: false,
            key_size,
        }
    }

    /// Mark the index as an expression index
    pub fn with_expression(mut self) -> Self {
        self.expression = true;
        self
    }

    /// Mark the index as a datacopy (covering) index
    pub fn with_datacopy(mut self) -> Self {
        self.datacopy = true;
        self
    }

    /// Override the key size recorded by the storage engine
    pub fn with_key_size(mut self, key_size: usize) -> Self {
        self.key_size = key_size;
        self
    }

    /// On-disk key size recorded by the storage engine
    pub fn key_size(&self) -> usize {
        self.key_size
    }
}

/// Table definition: row layout plus secondary indexes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name
    pub name: String,
    /// Row layout
    pub schema: Schema,
    /// Secondary indexes, by index number
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    /// Create a table without indexes
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            schema: Schema::new(fields),
            indexes: Vec::new(),
        }
    }

    /// Add a secondary index
    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// On-disk row size
    pub fn row_size(&self) -> usize {
        self.schema.on_disk_size()
    }

    /// On-disk key size of an index
    pub fn key_size(&self, ix: usize) -> Option<usize> {
        self.indexes.get(ix).map(IndexDef::key_size)
    }

    /// Index definition by number
    pub fn index(&self, ix: usize) -> Option<&IndexDef> {
        self.indexes.get(ix)
    }

    /// Number of secondary indexes
    pub fn index_count(&self) -> usize {
        self.indexes.len()
    }

    /// Check if any index is an expression index
    pub fn has_expression_indexes(&self) -> bool {
        self.indexes.iter().any(|ix| ix.expression)
    }

    /// Number of out-of-line blob fields in a row
    pub fn blob_count(&self) -> usize {
        self.schema.blob_count()
    }
}

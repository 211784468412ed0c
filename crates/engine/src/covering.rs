//! Covering-index DDL rewrite
//!
//! A remote planner sees a local index through its schema record. When the
//! index is neither a base table nor a datacopy index, the record's
//! `CREATE INDEX` text is rewritten to list every table column the index
//! lacks, so the remote side treats the index as covering. The first
//! appended column carries `collate DATACOPY` as a marker.

use fdb_core::{Error, Result, Schema};
use fdb_storage::StorageEngine;
use fdb_wire::WireValue;
use std::sync::Arc;
use tracing::{debug, error};

/// Marker appended to the first added column
pub const DATACOPY_COLLATION: &str = "collate DATACOPY";

/// One row of the schema table
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaRecord {
    /// Object kind (`table` or `index`)
    pub kind: String,
    /// Object name
    pub name: String,
    /// Owning table
    pub table: String,
    /// Root page of the object
    pub root_page: i64,
    /// Creation DDL
    pub sql: String,
    /// Schema text carried by newer records
    pub csc2: Option<String>,
}

impl SchemaRecord {
    /// Validate and unpack a schema record
    ///
    /// A record has six or seven values; the root page must be an integer
    /// and the DDL must be text.
    pub fn from_values(values: &[WireValue]) -> Result<Self> {
        if values.len() != 6 && values.len() != 7 {
            return Err(Error::MalformedDdl(format!(
                "schema record has {} fields, expected 6 or 7",
                values.len()
            )));
        }
        let root_page = match &values[3] {
            WireValue::Integer(page) => *page,
            other => {
                return Err(Error::MalformedDdl(format!(
                    "schema record root page is {}, expected integer",
                    other.type_name()
                )))
            }
        };
        let sql = match &values[4] {
            WireValue::Text(sql) => sql.clone(),
            other => {
                return Err(Error::MalformedDdl(format!(
                    "schema record sql is {}, expected text",
                    other.type_name()
                )))
            }
        };
        Ok(Self {
            kind: text_or_empty(&values[0]),
            name: text_or_empty(&values[1]),
            table: text_or_empty(&values[2]),
            root_page,
            sql,
            csc2: match values.get(6) {
                Some(WireValue::Text(text)) => Some(text.clone()),
                _ => None,
            },
        })
    }
}

fn text_or_empty(value: &WireValue) -> String {
    match value {
        WireValue::Text(text) => text.clone(),
        _ => String::new(),
    }
}

/// Append the table columns missing from an index to its `CREATE INDEX` text
///
/// The column list closes either at `) where (` for partial indexes or at
/// the final `);`. Returns the text unchanged when the index already covers
/// every column.
///
/// ```
/// use fdb_core::{Field, FieldType, Schema};
/// use fdb_engine::append_covering_columns;
///
/// let table = Schema::new(vec![
///     Field::new("a", FieldType::Int32),
///     Field::new("b", FieldType::Int32),
///     Field::new("c", FieldType::Int32),
/// ]);
/// let index = Schema::new(vec![Field::new("a", FieldType::Int32)]);
/// let sql = append_covering_columns("CREATE INDEX ix1 ON t (a) where (b>0);", &table, &index)
///     .unwrap();
/// assert_eq!(sql, r#"CREATE INDEX ix1 ON t (a, "b" collate DATACOPY, "c") where (b>0);"#);
/// ```
pub fn append_covering_columns(sql: &str, table: &Schema, index: &Schema) -> Result<String> {
    let lower = sql.to_ascii_lowercase();
    let close = lower
        .find(") where (")
        .or_else(|| lower.rfind(");"))
        .ok_or_else(|| Error::MalformedDdl(format!("no column list terminator in '{}'", sql)))?;

    let missing: Vec<&str> = table
        .field_names()
        .filter(|name| !index.contains(name))
        .collect();
    if missing.is_empty() {
        return Ok(sql.to_string());
    }

    let (head, tail) = sql.split_at(close);
    let mut out = String::with_capacity(sql.len() + missing.len() * 8 + DATACOPY_COLLATION.len());
    out.push_str(head);
    for (i, column) in missing.iter().enumerate() {
        out.push_str(", \"");
        out.push_str(column);
        out.push('"');
        if i == 0 {
            out.push(' ');
            out.push_str(DATACOPY_COLLATION);
        }
    }
    out.push_str(tail);
    Ok(out)
}

/// Rewrites schema records of non-covering indexes
pub struct CoveringIndexRewriter {
    storage: Arc<dyn StorageEngine>,
}

impl CoveringIndexRewriter {
    /// Create a rewriter resolving root pages through `storage`
    pub fn new(storage: Arc<dyn StorageEngine>) -> Self {
        Self { storage }
    }

    /// DDL to present for a schema record
    pub fn rewrite(&self, record: &SchemaRecord) -> Result<String> {
        let (table, index) = self
            .storage
            .table_by_root_page(record.root_page)
            .ok_or(Error::RootPageNotFound(record.root_page))?;

        let index = match index.and_then(|ix| table.index(ix)) {
            Some(index) if !index.datacopy => index,
            _ => return Ok(record.sql.clone()),
        };

        let sql = append_covering_columns(&record.sql, &table.schema, &index.schema)?;
        debug!(table = %table.name, index = %index.name, root_page = record.root_page, "covering index ddl");
        Ok(sql)
    }

    /// Validate a raw schema record and rewrite it
    pub fn rewrite_values(&self, values: &[WireValue]) -> Result<String> {
        let record = SchemaRecord::from_values(values).map_err(|e| {
            error!(error = %e, "rejecting schema record");
            e
        })?;
        self.rewrite(&record)
    }
}

//! Shared fixtures for the federation tests

#![allow(dead_code)]

use fdb_bend::prelude::*;
use fdb_bend::fdb_storage::RootPages;
use std::sync::Arc;
use std::time::Duration;

/// Backend over in-memory collaborators, with the `orders` table registered
///
/// `orders` has a plain index on `id` (index 0) and an expression index
/// on `amount_cents` (index 1).
pub struct TestBackend {
    pub backend: Backend,
    pub storage: Arc<MemoryStorage>,
    pub log: Arc<MemoryLog>,
    pub orders: RootPages,
}

impl TestBackend {
    pub fn new() -> Self {
        Self::with_config(BackendConfig::new())
    }

    pub fn with_config(config: BackendConfig) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let log = Arc::new(MemoryLog::new());
        let orders = storage.register_table(orders_table());
        let backend = Backend::builder()
            .config(
                config
                    .drain_poll(Duration::from_millis(2))
                    .join_poll(Duration::from_millis(2)),
            )
            .storage(storage.clone())
            .log(log.clone())
            .build()
            .expect("backend builds");
        Self {
            backend,
            storage,
            log,
            orders,
        }
    }
}

pub fn orders_table() -> TableDef {
    TableDef::new(
        "orders",
        vec![
            Field::new("id", FieldType::Int64).not_null(),
            Field::new("customer", FieldType::CString(16)),
            Field::new("amount", FieldType::Real64),
            Field::new("placed", FieldType::Datetime),
            Field::new("note", FieldType::Blob),
        ],
    )
    .with_index(IndexDef::new(
        "orders_id",
        Schema::new(vec![Field::new("id", FieldType::Int64)]),
    ))
    .with_index(
        IndexDef::new(
            "orders_amount_cents",
            Schema::new(vec![Field::new("amount_cents", FieldType::Int64)]),
        )
        .with_expression(),
    )
}

pub fn order(id: i64, customer: &str) -> WireBuffer {
    encode_row(&[
        WireValue::Integer(id),
        WireValue::Text(customer.into()),
        WireValue::Real(12.5),
        WireValue::Text("2024-03-01 09:30:00".into()),
        WireValue::Blob(b"gift wrap".to_vec()),
    ])
    .unwrap()
}

pub fn insert(id: i64, sequence: SequenceNumber) -> InsertRequest {
    InsertRequest {
        target: CursorTarget::Table("orders".into()),
        row_id: RowId::new(id as u64),
        row: order(id, "acme"),
        index_keys: IndexKeys::new()
            .with_wire(1, encode_row(&[WireValue::Integer(1250)]).unwrap()),
        sequence,
    }
}

pub fn tid(n: u64) -> TransactionId {
    TransactionId::RequestId(n)
}

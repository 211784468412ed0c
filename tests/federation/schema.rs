//! Covering-index rewrite of schema records

use crate::common::*;
use fdb_bend::prelude::*;

fn record(root_page: i64, sql: &str) -> Vec<WireValue> {
    vec![
        WireValue::Text("index".into()),
        WireValue::Text("orders_id".into()),
        WireValue::Text("orders".into()),
        WireValue::Integer(root_page),
        WireValue::Text(sql.into()),
        WireValue::Null,
        WireValue::Null,
    ]
}

#[test]
fn plain_index_is_presented_as_covering() {
    let t = TestBackend::new();
    let sql = t
        .backend
        .rewriter()
        .rewrite_values(&record(t.orders.indexes[0], "create index orders_id on orders (id);"))
        .unwrap();
    assert_eq!(
        sql,
        r#"create index orders_id on orders (id, "customer" collate DATACOPY, "amount", "placed", "note");"#
    );
}

#[test]
fn partial_index_keeps_its_where_clause() {
    let t = TestBackend::new();
    let sql = t
        .backend
        .rewriter()
        .rewrite_values(&record(
            t.orders.indexes[0],
            "CREATE INDEX orders_id ON orders (id) WHERE (amount > 0);",
        ))
        .unwrap();
    assert!(sql.starts_with(r#"CREATE INDEX orders_id ON orders (id, "customer" collate DATACOPY,"#));
    assert!(sql.ends_with(r#""note") WHERE (amount > 0);"#));
    assert_eq!(sql.matches("DATACOPY").count(), 1);
}

#[test]
fn base_table_record_is_unchanged() {
    let t = TestBackend::new();
    let ddl = "CREATE TABLE orders (id int);";
    assert_eq!(
        t.backend
            .rewriter()
            .rewrite_values(&record(t.orders.table, ddl))
            .unwrap(),
        ddl
    );
}

#[test]
fn malformed_records_are_schema_errors() {
    let t = TestBackend::new();
    let rewriter = t.backend.rewriter();

    let err = rewriter.rewrite_values(&record(t.orders.indexes[0], "CREATE INDEX ix ON orders (id")).unwrap_err();
    assert!(matches!(err, Error::MalformedDdl(_)));
    assert_eq!(err.kind(), ErrorKind::SchemaResolution);

    let err = rewriter.rewrite_values(&record(t.orders.indexes[0], "x);")[..4]).unwrap_err();
    assert!(matches!(err, Error::MalformedDdl(_)));

    let err = rewriter.rewrite_values(&record(-1, "x);")).unwrap_err();
    assert!(matches!(err, Error::RootPageNotFound(-1)));
}

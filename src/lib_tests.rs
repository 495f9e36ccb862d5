use super::{DEFAULT_PAGE_SIZE, KeyBatch, Record, WalkOptions};
use crate::catalog::types::{Row, Value};
use crate::config::Pacing;
use std::sync::Arc;

fn columns(names: &[&str]) -> Arc<[String]> {
    names.iter().map(|n| (*n).to_string()).collect()
}

#[test]
fn default_options_page_and_pacing() {
    let options = WalkOptions::default();
    assert_eq!(options.page_size, DEFAULT_PAGE_SIZE);
    assert_eq!(options.pacing, Pacing::Auto);
    assert!(options.primary_key.is_none());
    assert!(options.snapshot_table.is_none());
}

#[test]
fn scalars_collapse_only_simple_keys() {
    let simple = KeyBatch::new(
        columns(&["id"]),
        vec![
            Row::from_values(vec![Value::Integer(2)]),
            Row::from_values(vec![Value::Integer(1)]),
        ],
    );
    let scalars = simple.scalars().expect("cardinality 1");
    assert_eq!(scalars, vec![&Value::Integer(2), &Value::Integer(1)]);

    let composite = KeyBatch::new(
        columns(&["geo", "nick"]),
        vec![Row::from_values(vec![
            Value::Text("us".into()),
            Value::Text("ann".into()),
        ])],
    );
    assert!(composite.scalars().is_none());
    assert_eq!(composite.len(), 1);
    assert!(!composite.is_empty());
}

#[test]
fn record_cells_are_addressable_by_name() {
    let record = Record {
        columns: columns(&["id", "email"]),
        row: Row::from_values(vec![Value::Integer(7), Value::Text("g@x.com".into())]),
    };
    assert_eq!(record.get("email"), Some(&Value::Text("g@x.com".into())));
    assert_eq!(record.get("id"), Some(&Value::Integer(7)));
    assert_eq!(record.get("missing"), None);
    assert_eq!(record.row().values.len(), 2);
}

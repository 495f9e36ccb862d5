use crate::catalog::schema::{ColumnDef, TableSchema, TableSpec};
use crate::catalog::types::{ColumnType, Row, Value};
use crate::error::StoreError;
use crate::query::operators::{compile_expr, eval_compiled_expr};
use crate::query::plan::Dataset;
use crate::storage::RelationalStore;
use crate::storage::encoded_key::EncodedKey;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug)]
struct MemTable {
    spec: TableSpec,
    rows: BTreeMap<EncodedKey, Row>,
    // Synthetic key counter for tables without a declared primary key.
    next_rowid: u64,
}

impl MemTable {
    fn new(spec: TableSpec) -> Self {
        Self {
            spec,
            rows: BTreeMap::new(),
            next_rowid: 0,
        }
    }

    fn key_indexes(&self) -> Vec<usize> {
        self.spec
            .schema
            .primary_key
            .iter()
            .filter_map(|name| self.spec.schema.column_index(name))
            .collect()
    }
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, MemTable>,
}

/// In-memory `RelationalStore` backed by one `BTreeMap` per table, keyed by
/// the order-preserving key encoding. Clones share the same tables. Every
/// method takes the table lock once and never holds it across an await, so
/// each call is one atomic step against the data.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts fully-materialized rows directly, bypassing the dataset layer.
    pub fn insert_rows(&self, table: &str, rows: Vec<Row>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let tbl = lookup_mut(&mut inner, table)?;
        for row in rows {
            insert_row(tbl, table, row)?;
        }
        Ok(())
    }

    /// Deletes rows by key tuple, bypassing the dataset layer. Returns how
    /// many rows matched.
    pub fn remove_rows(
        &self,
        table: &str,
        key_columns: &[String],
        keys: &[Row],
    ) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let tbl = lookup_mut(&mut inner, table)?;
        let indexes = resolve_columns(&tbl.spec.schema, table, key_columns)?;
        let victims: Vec<EncodedKey> = tbl
            .rows
            .iter()
            .filter(|(_, row)| keys.contains(&project(row, &indexes)))
            .map(|(stored, _)| stored.clone())
            .collect();
        for stored in &victims {
            tbl.rows.remove(stored);
        }
        Ok(victims.len())
    }

    pub fn row_count(&self, table: &str) -> Result<usize, StoreError> {
        let inner = self.inner.lock();
        Ok(lookup(&inner, table)?.rows.len())
    }

    /// All rows of `table` in ascending key order.
    pub fn rows(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let inner = self.inner.lock();
        Ok(lookup(&inner, table)?.rows.values().cloned().collect())
    }

    pub fn table_names(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut names: Vec<String> = inner.tables.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl RelationalStore for MemStore {
    async fn table_schema(&self, table: &str) -> Result<TableSchema, StoreError> {
        let inner = self.inner.lock();
        Ok(lookup(&inner, table)?.spec.schema.clone())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.tables.contains_key(table))
    }

    async fn create_table(&self, spec: TableSpec) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.tables.contains_key(&spec.name) {
            return Err(StoreError::TableAlreadyExists {
                table: spec.name.clone(),
            });
        }
        validate_spec(&spec)?;
        inner.tables.insert(spec.name.clone(), MemTable::new(spec));
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.tables.remove(table);
        Ok(())
    }

    async fn insert_from_query(
        &self,
        target: &str,
        dataset: &Dataset,
        columns: &[String],
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();

        let source = lookup(&inner, dataset.table_name())?;
        let source_columns: Vec<String> =
            source.spec.schema.column_names().map(str::to_string).collect();
        let compiled = dataset
            .predicate()
            .map(|expr| compile_expr(expr, &source_columns, dataset.table_name()))
            .transpose()?;
        let projection = resolve_columns(&source.spec.schema, dataset.table_name(), columns)?;
        let selected: Vec<Row> = source
            .rows
            .values()
            .filter(|row| {
                compiled
                    .as_ref()
                    .is_none_or(|expr| eval_compiled_expr(expr, row))
            })
            .map(|row| project(row, &projection))
            .collect();

        let tbl = lookup_mut(&mut inner, target)?;
        if columns.len() != tbl.spec.schema.columns.len() {
            return Err(StoreError::Validation(format!(
                "insert into '{target}' projects {} columns but the table has {}",
                columns.len(),
                tbl.spec.schema.columns.len()
            )));
        }
        let inserted = selected.len() as u64;
        for row in selected {
            insert_row(tbl, target, row)?;
        }
        Ok(inserted)
    }

    async fn pop_key_batch(
        &self,
        table: &str,
        key_columns: &[String],
        limit: usize,
    ) -> Result<Vec<Row>, StoreError> {
        let mut inner = self.inner.lock();
        let tbl = lookup_mut(&mut inner, table)?;
        let indexes = resolve_columns(&tbl.spec.schema, table, key_columns)?;

        // When the requested columns are the table's primary key, storage
        // order is already tuple order and the largest keys sit at the back.
        if key_columns == tbl.spec.schema.primary_key.as_slice() {
            let picked: Vec<EncodedKey> = tbl.rows.keys().rev().take(limit).cloned().collect();
            let mut out = Vec::with_capacity(picked.len());
            for key in &picked {
                if let Some(row) = tbl.rows.remove(key) {
                    out.push(project(&row, &indexes));
                }
            }
            return Ok(out);
        }

        let mut keyed: Vec<(Row, EncodedKey)> = tbl
            .rows
            .iter()
            .map(|(stored, row)| (project(row, &indexes), stored.clone()))
            .collect();
        keyed.sort_by(|a, b| b.0.cmp(&a.0));
        keyed.truncate(limit);
        let mut out = Vec::with_capacity(keyed.len());
        for (key_row, stored) in keyed {
            if tbl.rows.remove(&stored).is_some() {
                out.push(key_row);
            }
        }
        Ok(out)
    }

    async fn select_by_keys(
        &self,
        table: &str,
        key_columns: &[String],
        keys: &[Row],
    ) -> Result<Vec<Row>, StoreError> {
        let inner = self.inner.lock();
        let tbl = lookup(&inner, table)?;
        let indexes = resolve_columns(&tbl.spec.schema, table, key_columns)?;

        let wanted: HashSet<EncodedKey> = keys
            .iter()
            .map(|key| EncodedKey::from_values(&key.values))
            .collect();
        let mut matched: Vec<(Row, Row)> = tbl
            .rows
            .values()
            .filter_map(|row| {
                let key_row = project(row, &indexes);
                wanted
                    .contains(&EncodedKey::from_values(&key_row.values))
                    .then(|| (key_row, row.clone()))
            })
            .collect();
        matched.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(matched.into_iter().map(|(_, row)| row).collect())
    }
}

fn lookup<'a>(inner: &'a Inner, table: &str) -> Result<&'a MemTable, StoreError> {
    inner.tables.get(table).ok_or_else(|| StoreError::TableNotFound {
        table: table.to_string(),
    })
}

fn lookup_mut<'a>(inner: &'a mut Inner, table: &str) -> Result<&'a mut MemTable, StoreError> {
    inner
        .tables
        .get_mut(table)
        .ok_or_else(|| StoreError::TableNotFound {
            table: table.to_string(),
        })
}

fn validate_spec(spec: &TableSpec) -> Result<(), StoreError> {
    if spec.schema.columns.is_empty() {
        return Err(StoreError::Validation(format!(
            "table '{}' must declare at least one column",
            spec.name
        )));
    }
    let mut seen = HashSet::new();
    for def in &spec.schema.columns {
        if !seen.insert(def.name.as_str()) {
            return Err(StoreError::Validation(format!(
                "table '{}' declares column '{}' twice",
                spec.name, def.name
            )));
        }
    }
    for key_column in &spec.schema.primary_key {
        if spec.schema.column(key_column).is_none() {
            return Err(StoreError::UnknownColumn {
                table: spec.name.clone(),
                column: key_column.clone(),
            });
        }
    }
    Ok(())
}

fn resolve_columns(
    schema: &TableSchema,
    table: &str,
    columns: &[String],
) -> Result<Vec<usize>, StoreError> {
    columns
        .iter()
        .map(|name| {
            schema
                .column_index(name)
                .ok_or_else(|| StoreError::UnknownColumn {
                    table: table.to_string(),
                    column: name.clone(),
                })
        })
        .collect()
}

fn project(row: &Row, indexes: &[usize]) -> Row {
    Row::from_values(indexes.iter().map(|&i| row.values[i].clone()).collect())
}

fn insert_row(tbl: &mut MemTable, table: &str, row: Row) -> Result<(), StoreError> {
    if row.values.len() != tbl.spec.schema.columns.len() {
        return Err(StoreError::Validation(format!(
            "row has {} values but table '{table}' has {} columns",
            row.values.len(),
            tbl.spec.schema.columns.len()
        )));
    }
    for (def, value) in tbl.spec.schema.columns.iter().zip(&row.values) {
        check_value(table, def, value)?;
    }

    let key_indexes = tbl.key_indexes();
    let key = if key_indexes.is_empty() {
        let key = EncodedKey::from_single(&Value::Integer(tbl.next_rowid as i64));
        tbl.next_rowid += 1;
        key
    } else {
        EncodedKey::from_values(&project(&row, &key_indexes).values)
    };

    match tbl.rows.entry(key) {
        Entry::Occupied(_) => Err(StoreError::DuplicateKey {
            table: table.to_string(),
            key: describe_key(&project(&row, &key_indexes).values),
        }),
        Entry::Vacant(slot) => {
            slot.insert(row);
            Ok(())
        }
    }
}

fn check_value(table: &str, def: &ColumnDef, value: &Value) -> Result<(), StoreError> {
    let ok = match value {
        Value::Null => def.nullable,
        _ => value_matches_type(value, def.col_type),
    };
    if ok {
        Ok(())
    } else {
        Err(StoreError::TypeMismatch {
            table: table.to_string(),
            column: def.name.clone(),
            expected: def.col_type.as_str().to_string(),
            actual: value.kind_name().to_string(),
        })
    }
}

fn value_matches_type(value: &Value, col_type: ColumnType) -> bool {
    matches!(
        (value, col_type),
        (Value::Text(_), ColumnType::Text)
            | (Value::Integer(_), ColumnType::Integer)
            | (Value::Float(_), ColumnType::Float)
            | (Value::Boolean(_), ColumnType::Boolean)
            | (Value::Blob(_), ColumnType::Blob)
            | (Value::Timestamp(_), ColumnType::Timestamp)
    )
}

fn describe_key(values: &[Value]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{v:?}")).collect();
    format!("({})", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::MemStore;
    use crate::catalog::schema::{ColumnDef, TableSchema, TableSpec};
    use crate::catalog::types::{ColumnType, Row, Value};
    use crate::error::StoreError;
    use crate::query::plan::{Dataset, col, lit};
    use crate::storage::RelationalStore;

    fn users_spec() -> TableSpec {
        TableSpec {
            name: "users".to_string(),
            schema: TableSchema {
                columns: vec![
                    ColumnDef {
                        name: "id".to_string(),
                        col_type: ColumnType::Integer,
                        nullable: false,
                    },
                    ColumnDef {
                        name: "email".to_string(),
                        col_type: ColumnType::Text,
                        nullable: false,
                    },
                    ColumnDef {
                        name: "active".to_string(),
                        col_type: ColumnType::Boolean,
                        nullable: false,
                    },
                ],
                primary_key: vec!["id".to_string()],
            },
            unlogged: false,
        }
    }

    fn user(id: i64, email: &str, active: bool) -> Row {
        Row::from_values(vec![
            Value::Integer(id),
            Value::Text(email.into()),
            Value::Boolean(active),
        ])
    }

    async fn seeded_store() -> MemStore {
        let store = MemStore::new();
        store.create_table(users_spec()).await.expect("create");
        store
            .insert_rows(
                "users",
                vec![
                    user(3, "c@x.com", true),
                    user(1, "a@x.com", true),
                    user(4, "d@x.com", false),
                    user(2, "b@x.com", true),
                ],
            )
            .expect("seed");
        store
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter()
            .map(|row| match row.values[0] {
                Value::Integer(id) => id,
                ref other => panic!("unexpected key value: {other:?}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn create_rejects_duplicate_table() {
        let store = seeded_store().await;
        let err = store.create_table(users_spec()).await.unwrap_err();
        assert!(matches!(err, StoreError::TableAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn create_rejects_unknown_key_column() {
        let store = MemStore::new();
        let mut spec = users_spec();
        spec.schema.primary_key = vec!["nope".to_string()];
        let err = store.create_table(spec).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }));
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_key() {
        let store = seeded_store().await;
        let err = store
            .insert_rows("users", vec![user(3, "dup@x.com", true)])
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn insert_rejects_type_mismatch() {
        let store = seeded_store().await;
        let bad = Row::from_values(vec![
            Value::Text("not an id".into()),
            Value::Text("e@x.com".into()),
            Value::Boolean(true),
        ]);
        let err = store.insert_rows("users", vec![bad]).unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn pop_takes_largest_keys_first_and_deletes() {
        let store = seeded_store().await;
        let key = vec!["id".to_string()];

        let first = store.pop_key_batch("users", &key, 3).await.expect("pop");
        assert_eq!(ids(&first), vec![4, 3, 2]);
        let second = store.pop_key_batch("users", &key, 3).await.expect("pop");
        assert_eq!(ids(&second), vec![1]);
        let third = store.pop_key_batch("users", &key, 3).await.expect("pop");
        assert!(third.is_empty());
        assert_eq!(store.row_count("users").expect("count"), 0);
    }

    #[tokio::test]
    async fn pop_on_non_key_columns_sorts_by_requested_tuple() {
        let store = seeded_store().await;
        let by_email = vec!["email".to_string()];
        let batch = store
            .pop_key_batch("users", &by_email, 2)
            .await
            .expect("pop");
        let emails: Vec<&str> = batch
            .iter()
            .map(|row| match &row.values[0] {
                Value::Text(s) => s.as_str(),
                other => panic!("unexpected key value: {other:?}"),
            })
            .collect();
        assert_eq!(emails, vec!["d@x.com", "c@x.com"]);
        assert_eq!(store.row_count("users").expect("count"), 2);
    }

    #[tokio::test]
    async fn insert_from_query_filters_and_projects() {
        let store = seeded_store().await;
        let snapshot = TableSpec {
            name: "ids_only".to_string(),
            schema: TableSchema {
                columns: vec![ColumnDef {
                    name: "id".to_string(),
                    col_type: ColumnType::Integer,
                    nullable: false,
                }],
                primary_key: vec!["id".to_string()],
            },
            unlogged: true,
        };
        store.create_table(snapshot).await.expect("create");

        let dataset = Dataset::table("users").where_(col("active").eq(lit(true)));
        let inserted = store
            .insert_from_query("ids_only", &dataset, &["id".to_string()])
            .await
            .expect("insert");
        assert_eq!(inserted, 3);
        assert_eq!(ids(&store.rows("ids_only").expect("rows")), vec![1, 2, 3]);
        // Source rows are untouched.
        assert_eq!(store.row_count("users").expect("count"), 4);
    }

    #[tokio::test]
    async fn insert_from_query_rejects_unknown_projection() {
        let store = seeded_store().await;
        let err = store
            .insert_from_query("users", &Dataset::table("users"), &["nope".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }));
    }

    #[tokio::test]
    async fn remove_rows_deletes_by_key_tuple() {
        let store = seeded_store().await;
        let removed = store
            .remove_rows(
                "users",
                &["id".to_string()],
                &[
                    Row::from_values(vec![Value::Integer(2)]),
                    Row::from_values(vec![Value::Integer(99)]),
                ],
            )
            .expect("remove");
        assert_eq!(removed, 1);
        assert_eq!(store.row_count("users").expect("count"), 3);
    }

    #[tokio::test]
    async fn select_by_keys_returns_full_rows_descending() {
        let store = seeded_store().await;
        let keys = vec![
            Row::from_values(vec![Value::Integer(1)]),
            Row::from_values(vec![Value::Integer(4)]),
            Row::from_values(vec![Value::Integer(99)]),
        ];
        let rows = store
            .select_by_keys("users", &["id".to_string()], &keys)
            .await
            .expect("select");
        assert_eq!(ids(&rows), vec![4, 1]);
        assert_eq!(rows[0].values.len(), 3);
    }

    #[tokio::test]
    async fn drop_table_is_idempotent() {
        let store = seeded_store().await;
        store.drop_table("users").await.expect("drop");
        store.drop_table("users").await.expect("drop again");
        assert!(!store.table_exists("users").await.expect("exists"));
    }
}

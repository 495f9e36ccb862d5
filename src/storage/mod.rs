pub mod encoded_key;
pub mod memory;

use crate::catalog::schema::{TableSchema, TableSpec};
use crate::catalog::types::Row;
use crate::error::StoreError;
use crate::query::plan::Dataset;
use async_trait::async_trait;

/// The storage operations the snapshot walker needs from a relational
/// backend. `MemStore` implements it in-process; a SQL-backed store would
/// map each method onto one statement.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn table_schema(&self, table: &str) -> Result<TableSchema, StoreError>;

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError>;

    async fn create_table(&self, spec: TableSpec) -> Result<(), StoreError>;

    /// Dropping a table that does not exist is a no-op, so cleanup paths can
    /// run it without checking first.
    async fn drop_table(&self, table: &str) -> Result<(), StoreError>;

    /// Populates `target` with the projection of `columns` over every row the
    /// dataset selects. Returns the number of rows inserted.
    async fn insert_from_query(
        &self,
        target: &str,
        dataset: &Dataset,
        columns: &[String],
    ) -> Result<u64, StoreError>;

    /// Removes and returns up to `limit` key tuples from `table`, taking the
    /// largest tuples first. The select and delete are one atomic step: a
    /// tuple returned here is gone for every other caller.
    async fn pop_key_batch(
        &self,
        table: &str,
        key_columns: &[String],
        limit: usize,
    ) -> Result<Vec<Row>, StoreError>;

    /// Fetches the full rows of `table` whose `key_columns` tuple appears in
    /// `keys`, in descending key order. Keys with no matching row are skipped.
    async fn select_by_keys(
        &self,
        table: &str,
        key_columns: &[String],
        keys: &[Row],
    ) -> Result<Vec<Row>, StoreError>;
}

pub mod catalog;
pub mod config;
pub mod error;
#[cfg(test)]
mod lib_tests;
pub mod query;
pub mod storage;
mod walk;

use crate::catalog::types::{Row, Value};
use crate::config::{Pacing, WalkerConfig};
use crate::error::WalkError;
use crate::query::plan::Dataset;
use crate::storage::RelationalStore;
use crate::walk::SnapshotWalk;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// One popped batch of key tuples, largest first. The tuples come out of the
/// snapshot table exactly once; a batch handed to a callback is already
/// deleted there.
#[derive(Debug, Clone)]
pub struct KeyBatch {
    columns: Arc<[String]>,
    keys: Vec<Row>,
}

impl KeyBatch {
    pub(crate) fn new(columns: Arc<[String]>, keys: Vec<Row>) -> Self {
        Self { columns, keys }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn keys(&self) -> &[Row] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The keys as single values instead of tuples. `None` unless the key has
    /// exactly one column.
    pub fn scalars(&self) -> Option<Vec<&Value>> {
        if self.columns.len() != 1 {
            return None;
        }
        Some(
            self.keys
                .iter()
                .filter_map(|row| row.values.first())
                .collect(),
        )
    }

    pub fn into_keys(self) -> Vec<Row> {
        self.keys
    }
}

/// One materialized source row, with cells addressable by column name.
#[derive(Debug, Clone)]
pub struct Record {
    columns: Arc<[String]>,
    row: Row,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.row.values.get(idx)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row(&self) -> &Row {
        &self.row
    }

    pub fn into_row(self) -> Row {
        self.row
    }
}

/// Counters for one finished walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkOutcome {
    /// Non-empty batches popped.
    pub batches: u64,
    /// Keys drained from the snapshot table.
    pub keys: u64,
}

/// Per-call options for one iteration.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub page_size: usize,
    pub pacing: Pacing,
    /// Key columns to iterate by, overriding the source table's declared
    /// primary key. Used verbatim when set; must be non-empty.
    pub primary_key: Option<Vec<String>>,
    /// Explicit snapshot table name. A leftover table with this name is
    /// reused as-is, which is how an interrupted walk resumes.
    pub snapshot_table: Option<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            pacing: Pacing::default(),
            primary_key: None,
            snapshot_table: None,
        }
    }
}

/// Batch iterator over the rows a dataset matches, backed by a materialized
/// snapshot of their primary keys. The source table is never mutated and no
/// long-lived cursor or transaction spans the iteration, so other writers
/// proceed freely while the walk runs.
#[derive(Debug, Clone)]
pub struct Walker<S> {
    store: S,
    config: WalkerConfig,
}

impl<S: RelationalStore> Walker<S> {
    pub fn new(store: S, config: WalkerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &WalkerConfig {
        &self.config
    }

    /// Snapshots the keys the dataset matches right now, then hands them to
    /// `callback` in pages of at most `page_size`, descending by key tuple.
    /// Rows inserted into the source after the snapshot are not visited.
    ///
    /// The snapshot table is dropped when the walk drains or the callback
    /// fails, except that an explicitly named table is kept on failure so a
    /// follow-up call with the same name picks up where this one stopped.
    pub async fn with_snapshot_table<F, Fut>(
        &self,
        dataset: &Dataset,
        options: WalkOptions,
        mut callback: F,
    ) -> Result<WalkOutcome, WalkError>
    where
        F: FnMut(KeyBatch) -> Fut,
        Fut: Future<Output = Result<(), WalkError>> + Send,
    {
        let mut walk = SnapshotWalk::begin(&self.store, dataset, &options, &self.config).await?;
        let mut outcome = WalkOutcome::default();
        let result = loop {
            match walk.next_batch().await {
                Ok(Some(batch)) => {
                    outcome.batches += 1;
                    outcome.keys += batch.len() as u64;
                    if let Err(err) = callback(batch).await {
                        break Err(err);
                    }
                }
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        match result {
            Ok(()) => {
                walk.finish().await?;
                info!(
                    batches = outcome.batches,
                    keys = outcome.keys,
                    "batch walk complete"
                );
                Ok(outcome)
            }
            Err(err) => {
                walk.abort().await;
                Err(err)
            }
        }
    }

    /// Like [`with_snapshot_table`](Self::with_snapshot_table), but re-fetches
    /// the full source rows for every batch and hands them to `callback` one
    /// at a time, in the same descending key order. Keys whose row was
    /// deleted from the source mid-walk are skipped.
    pub async fn each_record<F, Fut>(
        &self,
        dataset: &Dataset,
        options: WalkOptions,
        mut callback: F,
    ) -> Result<WalkOutcome, WalkError>
    where
        F: FnMut(Record) -> Fut,
        Fut: Future<Output = Result<(), WalkError>> + Send,
    {
        let mut walk = SnapshotWalk::begin(&self.store, dataset, &options, &self.config).await?;
        let columns: Arc<[String]> = match self.store.table_schema(dataset.table_name()).await {
            Ok(schema) => schema
                .column_names()
                .map(str::to_string)
                .collect::<Vec<_>>()
                .into(),
            Err(err) => {
                walk.abort().await;
                return Err(err.into());
            }
        };

        let mut outcome = WalkOutcome::default();
        let result = 'walk: loop {
            match walk.next_batch().await {
                Ok(Some(batch)) => {
                    outcome.batches += 1;
                    outcome.keys += batch.len() as u64;
                    let rows = match self
                        .store
                        .select_by_keys(dataset.table_name(), batch.columns(), batch.keys())
                        .await
                    {
                        Ok(rows) => rows,
                        Err(err) => break 'walk Err(err.into()),
                    };
                    if rows.len() < batch.len() {
                        debug!(
                            table = %dataset.table_name(),
                            missing = batch.len() - rows.len(),
                            "keys gone from source since snapshot, skipped"
                        );
                    }
                    for row in rows {
                        let record = Record {
                            columns: columns.clone(),
                            row,
                        };
                        if let Err(err) = callback(record).await {
                            break 'walk Err(err);
                        }
                    }
                }
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        match result {
            Ok(()) => {
                walk.finish().await?;
                info!(
                    batches = outcome.batches,
                    keys = outcome.keys,
                    "record walk complete"
                );
                Ok(outcome)
            }
            Err(err) => {
                walk.abort().await;
                Err(err)
            }
        }
    }
}

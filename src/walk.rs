use crate::KeyBatch;
use crate::WalkOptions;
use crate::catalog::schema::{ColumnDef, TableSchema, TableSpec};
use crate::config::WalkerConfig;
use crate::error::{StoreError, WalkError};
use crate::query::plan::Dataset;
use crate::storage::RelationalStore;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// One in-progress iteration: a populated snapshot table plus the cursor
/// state needed to drain it. Both walker surfaces drive this and differ only
/// in what they do with each popped batch.
pub(crate) struct SnapshotWalk<'a, S: RelationalStore> {
    store: &'a S,
    table: String,
    key_columns: Arc<[String]>,
    page_size: usize,
    interval: Duration,
    auto_named: bool,
    pops: u64,
}

impl<'a, S: RelationalStore> SnapshotWalk<'a, S> {
    /// Validates the options, resolves the key columns and materializes the
    /// snapshot table. Nothing is created when validation fails.
    pub(crate) async fn begin(
        store: &'a S,
        dataset: &Dataset,
        options: &WalkOptions,
        config: &WalkerConfig,
    ) -> Result<SnapshotWalk<'a, S>, WalkError> {
        if options.page_size == 0 {
            return Err(WalkError::InvalidPageSize);
        }
        let key_columns =
            resolve_primary_key(store, dataset, options.primary_key.as_deref()).await?;
        let (table, auto_named) = ensure_snapshot(
            store,
            dataset,
            &key_columns,
            options.snapshot_table.as_deref(),
            config.unlogged_snapshots,
        )
        .await?;
        Ok(Self {
            store,
            table,
            key_columns: Arc::from(key_columns),
            page_size: options.page_size,
            interval: options.pacing.interval_in(config.runtime_mode),
            auto_named,
            pops: 0,
        })
    }

    /// Pops the next batch in descending tuple order. `None` means the
    /// snapshot table is drained. The pacing sleep runs between the previous
    /// batch and this pop, so an iteration with N non-empty batches sleeps
    /// exactly N times and an empty snapshot never sleeps at all.
    pub(crate) async fn next_batch(&mut self) -> Result<Option<KeyBatch>, WalkError> {
        if self.pops > 0 && !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
        self.pops += 1;
        let keys = self
            .store
            .pop_key_batch(&self.table, &self.key_columns, self.page_size)
            .await?;
        if keys.is_empty() {
            return Ok(None);
        }
        debug!(
            table = %self.table,
            batch = self.pops,
            keys = keys.len(),
            "popped key batch"
        );
        Ok(Some(KeyBatch::new(self.key_columns.clone(), keys)))
    }

    /// Drops the snapshot table after a drained or otherwise successful walk.
    pub(crate) async fn finish(self) -> Result<(), WalkError> {
        self.store.drop_table(&self.table).await?;
        debug!(table = %self.table, "snapshot table dropped");
        Ok(())
    }

    /// Cleanup for the error path. Auto-named tables are dropped since their
    /// name is unrecoverable; explicitly named ones are kept so the caller
    /// can resume from the remaining keys. Never masks the original error.
    pub(crate) async fn abort(self) {
        if !self.auto_named {
            warn!(
                table = %self.table,
                "walk failed, keeping named snapshot table for resume"
            );
            return;
        }
        if let Err(err) = self.store.drop_table(&self.table).await {
            warn!(
                table = %self.table,
                error = %err,
                "failed to drop snapshot table during cleanup"
            );
        }
    }
}

/// Explicit caller-supplied key columns win, in the caller's order and taken
/// on trust. Otherwise the source table's declared primary key is used. An
/// empty key set either way cannot order an iteration and is rejected.
async fn resolve_primary_key<S: RelationalStore>(
    store: &S,
    dataset: &Dataset,
    explicit: Option<&[String]>,
) -> Result<Vec<String>, WalkError> {
    let key_columns = match explicit {
        Some(columns) => columns.to_vec(),
        None => {
            store
                .table_schema(dataset.table_name())
                .await?
                .primary_key
        }
    };
    if key_columns.is_empty() {
        return Err(WalkError::InvalidPrimaryKey {
            table: dataset.table_name().to_string(),
        });
    }
    Ok(key_columns)
}

/// Creates and populates the snapshot table, or reuses a same-named one left
/// over from an interrupted walk. Returns the table name and whether it was
/// auto-named. Population is one insert-select; no row-by-row traffic.
async fn ensure_snapshot<S: RelationalStore>(
    store: &S,
    dataset: &Dataset,
    key_columns: &[String],
    explicit_name: Option<&str>,
    unlogged: bool,
) -> Result<(String, bool), WalkError> {
    let (table, auto_named) = match explicit_name {
        Some(name) => (name.to_string(), false),
        None => (snapshot_table_name(dataset.table_name()), true),
    };

    if store.table_exists(&table).await? {
        info!(table = %table, "reusing existing snapshot table");
        return Ok((table, auto_named));
    }

    let source_schema = store.table_schema(dataset.table_name()).await?;
    let columns = key_columns
        .iter()
        .map(|name| {
            source_schema
                .column(name)
                .cloned()
                .ok_or_else(|| StoreError::UnknownColumn {
                    table: dataset.table_name().to_string(),
                    column: name.clone(),
                })
        })
        .collect::<Result<Vec<ColumnDef>, StoreError>>()?;
    store
        .create_table(TableSpec {
            name: table.clone(),
            schema: TableSchema {
                columns,
                primary_key: key_columns.to_vec(),
            },
            unlogged,
        })
        .await?;
    let rows = store.insert_from_query(&table, dataset, key_columns).await?;
    info!(table = %table, source = %dataset.table_name(), rows, "snapshot table populated");
    Ok((table, auto_named))
}

fn snapshot_table_name(source: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    format!("snapshot_{source}_{}_{}", now.as_secs(), now.subsec_nanos())
}

use snapwalk::catalog::schema::{ColumnDef, TableSchema, TableSpec};
use snapwalk::catalog::types::{ColumnType, Row, Value};
use snapwalk::config::{Pacing, WalkerConfig};
use snapwalk::query::plan::Dataset;
use snapwalk::storage::RelationalStore;
use snapwalk::storage::memory::MemStore;
use snapwalk::{WalkOptions, Walker};
use std::time::Duration;
use tokio::time::Instant;

async fn numbers_table(count: i64) -> MemStore {
    let store = MemStore::new();
    store
        .create_table(TableSpec {
            name: "numbers".to_string(),
            schema: TableSchema {
                columns: vec![ColumnDef {
                    name: "n".to_string(),
                    col_type: ColumnType::Integer,
                    nullable: false,
                }],
                primary_key: vec!["n".to_string()],
            },
            unlogged: true,
        })
        .await
        .expect("create numbers");
    let rows = (1..=count)
        .map(|n| Row::from_values(vec![Value::Integer(n)]))
        .collect();
    store.insert_rows("numbers", rows).expect("seed numbers");
    store
}

async fn timed_walk(config: WalkerConfig, pacing: Pacing, rows: i64) -> (u64, Duration) {
    let store = numbers_table(rows).await;
    let walker = Walker::new(store, config);
    let started = Instant::now();
    let outcome = walker
        .with_snapshot_table(
            &Dataset::table("numbers"),
            WalkOptions {
                page_size: 3,
                pacing,
                ..WalkOptions::default()
            },
            |_batch| async move { Ok(()) },
        )
        .await
        .expect("walk");
    (outcome.batches, started.elapsed())
}

// All tests run on the paused clock, so elapsed time is exactly the time the
// walker slept.

#[tokio::test(start_paused = true)]
async fn explicit_interval_sleeps_once_per_popped_batch() {
    let pacing = Pacing::Every(Duration::from_secs(10));
    let (batches, elapsed) = timed_walk(WalkerConfig::development(), pacing, 10).await;
    assert_eq!(batches, 4);
    assert_eq!(elapsed, Duration::from_secs(40));
}

#[tokio::test(start_paused = true)]
async fn auto_pacing_sleeps_one_second_per_batch_in_production() {
    let (batches, elapsed) = timed_walk(WalkerConfig::production(), Pacing::Auto, 10).await;
    assert_eq!(batches, 4);
    assert_eq!(elapsed, Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn auto_pacing_is_free_in_development() {
    let (batches, elapsed) = timed_walk(WalkerConfig::development(), Pacing::Auto, 10).await;
    assert_eq!(batches, 4);
    assert_eq!(elapsed, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn disabled_pacing_never_sleeps() {
    let (batches, elapsed) = timed_walk(WalkerConfig::production(), Pacing::Disabled, 10).await;
    assert_eq!(batches, 4);
    assert_eq!(elapsed, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn empty_snapshot_never_sleeps() {
    let pacing = Pacing::Every(Duration::from_secs(10));
    let (batches, elapsed) = timed_walk(WalkerConfig::production(), pacing, 0).await;
    assert_eq!(batches, 0);
    assert_eq!(elapsed, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn single_batch_sleeps_exactly_once() {
    let pacing = Pacing::Every(Duration::from_secs(7));
    let (batches, elapsed) = timed_walk(WalkerConfig::development(), pacing, 2).await;
    assert_eq!(batches, 1);
    assert_eq!(elapsed, Duration::from_secs(7));
}

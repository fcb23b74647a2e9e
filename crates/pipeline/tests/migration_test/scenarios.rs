use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use cachelift_core::{Entry, EntrySource, MigrateError};
use cachelift_pipeline::{MigrationPipeline, PipelineOptions};

use crate::helpers::{entries, ignore_progress, key, MemoryInserter, VecSource};

fn options(parallelism: usize) -> PipelineOptions {
    PipelineOptions::new(parallelism, Duration::from_secs(5))
}

#[tokio::test]
async fn transfers_all_absent_entries() {
    let inserter = Arc::new(MemoryInserter::new());
    let source = VecSource::new(entries(0..10));
    let stats = Arc::clone(&source.stats);

    let summary = MigrationPipeline::new(Arc::clone(&inserter), options(4))
        .unwrap()
        .run(source, ignore_progress)
        .await
        .unwrap();

    assert_eq!(summary.total_completed, 10);
    assert_eq!(summary.inserted, 10);
    assert_eq!(summary.already_present, 0);
    assert_eq!(inserter.len(), 10);
    for i in 0..10 {
        assert!(inserter.contains(&key(i)));
    }
    assert_eq!(stats.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn already_present_keys_count_as_completed() {
    let inserter = Arc::new(MemoryInserter::new());
    let all = entries(0..10);
    inserter.preload(&all[2..5]);
    let before = inserter.len();

    let summary = MigrationPipeline::new(Arc::clone(&inserter), options(4))
        .unwrap()
        .run(VecSource::new(all), ignore_progress)
        .await
        .unwrap();

    assert_eq!(summary.total_completed, 10);
    assert_eq!(summary.inserted, 7);
    assert_eq!(summary.already_present, 3);
    assert_eq!(inserter.len() - before, 7);
}

#[tokio::test]
async fn existing_destination_values_are_not_overwritten() {
    let inserter = Arc::new(MemoryInserter::new());
    let mut stale = entries(0..1);
    stale[0].value = bytes::Bytes::from_static(b"newer-at-destination");
    inserter.preload(&stale);

    MigrationPipeline::new(Arc::clone(&inserter), options(2))
        .unwrap()
        .run(VecSource::new(entries(0..3)), ignore_progress)
        .await
        .unwrap();

    assert_eq!(
        inserter.snapshot()[&key(0)].as_ref(),
        b"newer-at-destination"
    );
}

#[tokio::test]
async fn source_failure_aborts_and_releases_once() {
    let inserter = Arc::new(MemoryInserter::new());
    let source = VecSource::new(entries(0..10)).failing_after(5);
    let stats = Arc::clone(&source.stats);

    let err = MigrationPipeline::new(Arc::clone(&inserter), options(4))
        .unwrap()
        .run(source, ignore_progress)
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::SourceRead(_)), "got {err}");
    assert_eq!(stats.pulled.load(Ordering::SeqCst), 5);
    assert!(inserter.len() <= 5);
    assert_eq!(stats.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn insert_failure_is_fatal() {
    let inserter = Arc::new(MemoryInserter::new().failing_on(key(7)));
    let source = VecSource::new(entries(0..50));
    let stats = Arc::clone(&source.stats);

    let err = MigrationPipeline::new(Arc::clone(&inserter), options(4))
        .unwrap()
        .run(source, ignore_progress)
        .await
        .unwrap_err();

    match err {
        MigrateError::Insert { key, reason } => {
            assert_eq!(key, "key-0007");
            assert!(reason.contains("OOM"));
        }
        other => panic!("expected insert error, got {other}"),
    }
    // Pulling stopped well before the end of the source.
    assert!(stats.pulled.load(Ordering::SeqCst) < 50);
    assert!(!inserter.contains(&key(7)));
    assert_eq!(stats.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rerun_only_adds_missing_keys() {
    let inserter = Arc::new(MemoryInserter::new());
    let pipeline = MigrationPipeline::new(Arc::clone(&inserter), options(3)).unwrap();

    let first = pipeline
        .run(VecSource::new(entries(0..10)), ignore_progress)
        .await
        .unwrap();
    assert_eq!(first.inserted, 10);
    let after_first = inserter.snapshot();

    let again = pipeline
        .run(VecSource::new(entries(0..10)), ignore_progress)
        .await
        .unwrap();
    assert_eq!(again.inserted, 0);
    assert_eq!(again.already_present, 10);
    assert_eq!(inserter.snapshot(), after_first);

    let grown = pipeline
        .run(VecSource::new(entries(0..12)), ignore_progress)
        .await
        .unwrap();
    assert_eq!(grown.total_completed, 12);
    assert_eq!(grown.inserted, 2);
    assert_eq!(inserter.len(), 12);
}

#[tokio::test]
async fn wrong_estimate_does_not_change_the_result() {
    let inserter = Arc::new(MemoryInserter::new());
    let low = VecSource::new(entries(0..10)).with_estimate(3);
    let summary = MigrationPipeline::new(Arc::clone(&inserter), options(2))
        .unwrap()
        .run(low, ignore_progress)
        .await
        .unwrap();
    assert_eq!(summary.total_completed, 10);

    let high = VecSource::new(entries(10..15)).with_estimate(1_000);
    let summary = MigrationPipeline::new(Arc::clone(&inserter), options(2))
        .unwrap()
        .run(high, ignore_progress)
        .await
        .unwrap();
    assert_eq!(summary.total_completed, 5);
}

#[tokio::test]
async fn empty_source_completes_immediately() {
    let inserter = Arc::new(MemoryInserter::new());
    let source = VecSource::new(Vec::new());
    let stats = Arc::clone(&source.stats);

    let summary = MigrationPipeline::new(Arc::clone(&inserter), options(16))
        .unwrap()
        .run(source, ignore_progress)
        .await
        .unwrap();

    assert_eq!(summary.total_completed, 0);
    assert_eq!(inserter.calls.load(Ordering::SeqCst), 0);
    assert_eq!(stats.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_options_are_configuration_errors() {
    let err = MigrationPipeline::new(Arc::new(MemoryInserter::new()), options(0))
        .err()
        .expect("zero parallelism is rejected");
    assert!(matches!(err, MigrateError::Configuration(_)));

    let no_interval = PipelineOptions::new(4, Duration::ZERO);
    assert!(MigrationPipeline::new(Arc::new(MemoryInserter::new()), no_interval).is_err());
}

/// Remembers which threads it was read on.
struct ThreadRecordingSource {
    inner: VecSource,
    threads: Arc<Mutex<Vec<ThreadId>>>,
}

impl EntrySource for ThreadRecordingSource {
    fn total_estimate(&self) -> u64 {
        self.inner.total_estimate()
    }

    fn next_entry(&mut self) -> Result<Option<Entry>, MigrateError> {
        self.threads.lock().unwrap().push(thread::current().id());
        self.inner.next_entry()
    }

    fn release(&mut self) {
        self.inner.release();
    }
}

#[tokio::test]
async fn source_is_read_off_the_runtime_thread() {
    let threads = Arc::new(Mutex::new(Vec::new()));
    let source = ThreadRecordingSource {
        inner: VecSource::new(entries(0..5)),
        threads: Arc::clone(&threads),
    };
    let stats = Arc::clone(&source.inner.stats);

    let summary = MigrationPipeline::new(Arc::new(MemoryInserter::new()), options(2))
        .unwrap()
        .run(source, ignore_progress)
        .await
        .unwrap();
    assert_eq!(summary.total_completed, 5);
    assert_eq!(stats.released.load(Ordering::SeqCst), 1);

    // The test body runs on the single runtime thread.
    let runtime_thread = thread::current().id();
    let threads = threads.lock().unwrap();
    assert_eq!(threads.len(), 6);
    assert!(threads.iter().all(|id| *id != runtime_thread));
}

struct PanickingSource;

impl EntrySource for PanickingSource {
    fn total_estimate(&self) -> u64 {
        1
    }

    fn next_entry(&mut self) -> Result<Option<Entry>, MigrateError> {
        panic!("corrupt frame");
    }

    fn release(&mut self) {}
}

#[tokio::test]
async fn panicking_source_is_a_worker_failure() {
    let inserter = Arc::new(MemoryInserter::new());
    let err = MigrationPipeline::new(Arc::clone(&inserter), options(2))
        .unwrap()
        .run(PanickingSource, ignore_progress)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::Worker(_)), "got {err}");
    assert_eq!(inserter.calls.load(Ordering::SeqCst), 0);
}

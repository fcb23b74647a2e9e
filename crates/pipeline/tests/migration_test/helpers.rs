use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use cachelift_core::{Entry, EntrySource, InsertOutcome, MigrateError, RemoteInserter};
use cachelift_pipeline::{ProgressSink, ProgressSnapshot};

pub fn key(i: usize) -> Bytes {
    Bytes::from(format!("key-{i:04}"))
}

pub fn entries(range: std::ops::Range<usize>) -> Vec<Entry> {
    range
        .map(|i| Entry::new(key(i), Bytes::from(format!("value-{i}"))))
        .collect()
}

/// Counters shared with the test after the source moves into the pipeline.
#[derive(Debug, Default)]
pub struct SourceStats {
    pub pulled: AtomicUsize,
    pub released: AtomicUsize,
}

/// In-memory source with optional failure after a number of entries.
pub struct VecSource {
    entries: std::vec::IntoIter<Entry>,
    estimate: u64,
    fail_after: Option<usize>,
    pub stats: Arc<SourceStats>,
}

impl VecSource {
    pub fn new(entries: Vec<Entry>) -> Self {
        let estimate = entries.len() as u64;
        Self {
            entries: entries.into_iter(),
            estimate,
            fail_after: None,
            stats: Arc::new(SourceStats::default()),
        }
    }

    pub fn with_estimate(mut self, estimate: u64) -> Self {
        self.estimate = estimate;
        self
    }

    /// Yield `count` entries, then fail.
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }
}

impl EntrySource for VecSource {
    fn total_estimate(&self) -> u64 {
        self.estimate
    }

    fn next_entry(&mut self) -> Result<Option<Entry>, MigrateError> {
        let pulled = self.stats.pulled.load(Ordering::SeqCst);
        if self.fail_after == Some(pulled) {
            return Err(MigrateError::SourceRead("checksum mismatch in data log".into()));
        }
        let next = self.entries.next();
        if next.is_some() {
            self.stats.pulled.fetch_add(1, Ordering::SeqCst);
        }
        Ok(next)
    }

    fn release(&mut self) {
        self.stats.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Destination double with instrumentation for concurrency checks.
#[derive(Default)]
pub struct MemoryInserter {
    data: Mutex<HashMap<Bytes, Bytes>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
    pub finished: AtomicUsize,
    delay: Duration,
    fail_key: Option<Bytes>,
}

impl MemoryInserter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each insert sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Reject inserts of `key` with a non-recoverable error.
    pub fn failing_on(mut self, key: Bytes) -> Self {
        self.fail_key = Some(key);
        self
    }

    pub fn preload(&self, entries: &[Entry]) {
        let mut data = self.data.lock().unwrap();
        for entry in entries {
            data.insert(entry.key.clone(), entry.value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    pub fn contains(&self, key: &Bytes) -> bool {
        self.data.lock().unwrap().contains_key(key)
    }

    pub fn snapshot(&self) -> HashMap<Bytes, Bytes> {
        self.data.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteInserter for MemoryInserter {
    async fn try_insert(&self, entry: &Entry) -> Result<InsertOutcome, MigrateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }

        let result = if self.fail_key.as_ref() == Some(&entry.key) {
            Err(MigrateError::insert(&entry.key, "OOM command not allowed"))
        } else {
            let mut data = self.data.lock().unwrap();
            if data.contains_key(&entry.key) {
                Ok(InsertOutcome::AlreadyPresent)
            } else {
                data.insert(entry.key.clone(), entry.value.clone());
                Ok(InsertOutcome::Inserted)
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
        result
    }
}

/// Sink that keeps every snapshot for later inspection.
pub fn collecting_sink() -> (Arc<Mutex<Vec<ProgressSnapshot>>>, impl ProgressSink + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    let sink = move |snapshot: &ProgressSnapshot| {
        sink_seen.lock().unwrap().push(snapshot.clone());
    };
    (seen, sink)
}

pub fn ignore_progress(_: &ProgressSnapshot) {}

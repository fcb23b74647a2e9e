use std::time::Instant;

use bytes::Bytes;
use cachelift_core::{Entry, EntrySource, MigrateError};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::index::KeyIndex;
use crate::layout::StoreLayout;
use crate::reader::DataFile;
use crate::record::Record;

/// An opened store: the mapped data log plus its key index.
pub struct Store {
    layout: StoreLayout,
    data: Option<DataFile>,
    index: KeyIndex,
    index_rebuilt: bool,
}

impl Store {
    pub fn open(layout: &StoreLayout) -> Result<Self, StoreError> {
        Self::open_with_progress(layout, || {})
    }

    /// Open the store, rebuilding the index if it was not shut down cleanly.
    ///
    /// `on_indexed` is called once per data log record scanned during a rebuild.
    pub fn open_with_progress<F: FnMut()>(
        layout: &StoreLayout,
        on_indexed: F,
    ) -> Result<Self, StoreError> {
        layout.validate()?;
        let data = DataFile::open(&layout.data_file())?;
        let index_dir = layout.index_dir();

        let loaded = match KeyIndex::load(&index_dir) {
            Ok(Some(index)) if index.data_len() == data.len() => Some(index),
            Ok(Some(index)) => {
                warn!(
                    cache = layout.cache(),
                    indexed_bytes = index.data_len(),
                    data_bytes = data.len(),
                    "index does not match data log, rebuilding"
                );
                None
            }
            Ok(None) => {
                info!(cache = layout.cache(), "no clean index found, rebuilding");
                None
            }
            Err(e) => {
                warn!(cache = layout.cache(), error = %e, "index unreadable, rebuilding");
                None
            }
        };

        let (index, index_rebuilt) = match loaded {
            Some(index) => {
                debug!(cache = layout.cache(), entries = index.len(), "loaded index");
                (index, false)
            }
            None => (build_index(layout, &data, on_indexed)?, true),
        };

        Ok(Self {
            layout: layout.clone(),
            data: Some(data),
            index,
            index_rebuilt,
        })
    }

    /// Rebuild the index from the data log even if the current one is clean.
    pub fn rebuild_index<F: FnMut()>(&mut self, on_indexed: F) -> Result<u64, StoreError> {
        let data = self.data.as_ref().ok_or(StoreError::Released)?;
        self.index = build_index(&self.layout, data, on_indexed)?;
        self.index_rebuilt = true;
        Ok(self.index.len() as u64)
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Whether opening (or an explicit call) rebuilt the index.
    pub fn index_rebuilt(&self) -> bool {
        self.index_rebuilt
    }

    /// Entries not yet expired right now.
    pub fn entry_count(&self) -> u64 {
        self.index.live_count(Utc::now())
    }

    /// Look up the live entry for `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>, StoreError> {
        let data = self.data.as_ref().ok_or(StoreError::Released)?;
        let Some(location) = self.index.get(key) else {
            return Ok(None);
        };
        let record = data.read_at(location.offset)?;
        Ok(to_entry(record, Utc::now()))
    }

    /// Drop the memory map. Safe to call more than once.
    pub fn release(&mut self) {
        if self.data.take().is_some() {
            debug!(cache = self.layout.cache(), "store released");
        }
    }

    pub fn is_released(&self) -> bool {
        self.data.is_none()
    }

    pub(crate) fn into_index(mut self) -> KeyIndex {
        std::mem::take(&mut self.index)
    }

    /// Turn the store into a one-shot entry source in data log order.
    pub fn into_source(self) -> StoreSource {
        let total_estimate = self.entry_count();
        StoreSource {
            store: self,
            cursor: 0,
            total_estimate,
            expired_skipped: 0,
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.release();
    }
}

fn build_index<F: FnMut()>(
    layout: &StoreLayout,
    data: &DataFile,
    mut on_indexed: F,
) -> Result<KeyIndex, StoreError> {
    let started = Instant::now();
    let mut index = KeyIndex::new();
    let mut records = data.records();

    for item in records.by_ref() {
        let (offset, length, record) = item?;
        index.apply(offset, length, &record);
        on_indexed();
    }

    let valid_len = records.position();
    if valid_len < data.len() {
        warn!(
            cache = layout.cache(),
            torn_bytes = data.len() - valid_len,
            "ignoring incomplete record at end of data log"
        );
    }
    index.set_lengths(data.len(), valid_len);
    index.save(&layout.index_dir())?;

    info!(
        cache = layout.cache(),
        entries = index.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "index rebuilt"
    );
    Ok(index)
}

fn to_entry(record: Record, now: DateTime<Utc>) -> Option<Entry> {
    if record.is_expired_at(now) {
        return None;
    }
    let ttl = match record.expires_at {
        Some(at) => Some((at - now).to_std().ok()?),
        None => None,
    };
    let value = record.value?;
    Some(Entry {
        key: Bytes::from(record.key),
        value: Bytes::from(value),
        ttl,
    })
}

/// [`EntrySource`] over a [`Store`], yielding live entries in data log order.
pub struct StoreSource {
    store: Store,
    cursor: u64,
    total_estimate: u64,
    expired_skipped: u64,
}

impl StoreSource {
    /// Entries skipped because they expired before they were read.
    pub fn expired_skipped(&self) -> u64 {
        self.expired_skipped
    }

    fn advance(&mut self) -> Result<Option<Entry>, StoreError> {
        let data = self.store.data.as_ref().ok_or(StoreError::Released)?;
        let end = self.store.index.valid_len();

        while self.cursor < end {
            let offset = self.cursor;
            let (record, frame_len) = match crate::record::read_record(data.as_slice(), offset)? {
                Some(framed) => framed,
                None => {
                    return Err(StoreError::Corrupt {
                        offset,
                        reason: "data log shorter than its index".to_string(),
                    })
                }
            };
            self.cursor += frame_len;

            // Superseded puts and tombstones are not the current record.
            if !self.store.index.is_current(&record.key, offset) {
                continue;
            }
            match to_entry(record, Utc::now()) {
                Some(entry) => return Ok(Some(entry)),
                None => self.expired_skipped += 1,
            }
        }
        Ok(None)
    }
}

impl EntrySource for StoreSource {
    fn total_estimate(&self) -> u64 {
        self.total_estimate
    }

    fn next_entry(&mut self) -> Result<Option<Entry>, MigrateError> {
        self.advance().map_err(|e| MigrateError::SourceRead(e.to_string()))
    }

    fn release(&mut self) {
        if self.expired_skipped > 0 && !self.store.is_released() {
            info!(
                cache = self.store.layout.cache(),
                skipped = self.expired_skipped,
                "skipped entries that expired before transfer"
            );
        }
        self.store.release();
    }
}

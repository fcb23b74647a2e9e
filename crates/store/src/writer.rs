use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::StoreError;
use crate::index::KeyIndex;
use crate::layout::StoreLayout;
use crate::record::{write_record, Record};
use crate::store::Store;

/// Appends put/remove records to a store's data log.
///
/// The index on disk is marked dirty while a writer is open and only saved by
/// [`StoreWriter::finish`]; a writer dropped without finishing leaves the store
/// in the same state as a crash, and the next open rebuilds the index.
pub struct StoreWriter {
    layout: StoreLayout,
    out: BufWriter<File>,
    index: KeyIndex,
    position: u64,
    records: u64,
}

impl StoreWriter {
    /// Create an empty store, replacing any existing data log.
    pub fn create(layout: &StoreLayout) -> Result<Self, StoreError> {
        layout.check_names()?;
        fs::create_dir_all(layout.data_dir())?;
        KeyIndex::mark_dirty(&layout.index_dir())?;

        let file = File::create(layout.data_file())?;
        Ok(Self {
            layout: layout.clone(),
            out: BufWriter::new(file),
            index: KeyIndex::new(),
            position: 0,
            records: 0,
        })
    }

    /// Reopen an existing store for appending. A torn tail is cut off first.
    pub fn open(layout: &StoreLayout) -> Result<Self, StoreError> {
        let index = Store::open(layout)?.into_index();
        KeyIndex::mark_dirty(&layout.index_dir())?;

        let mut file = OpenOptions::new().write(true).open(layout.data_file())?;
        let position = index.valid_len();
        file.set_len(position)?;
        file.seek(SeekFrom::Start(position))?;

        Ok(Self {
            layout: layout.clone(),
            out: BufWriter::new(file),
            index,
            position,
            records: 0,
        })
    }

    /// Store `value` under `key`, replacing any earlier value.
    ///
    /// Returns the offset of the new record.
    pub fn put(
        &mut self,
        key: &[u8],
        value: &[u8],
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError> {
        self.append(&Record::put(key, value, expires_at))
    }

    /// Remove `key`. Removing an absent key still writes a tombstone.
    pub fn remove(&mut self, key: &[u8]) -> Result<u64, StoreError> {
        self.append(&Record::tombstone(key))
    }

    fn append(&mut self, record: &Record) -> Result<u64, StoreError> {
        let offset = self.position;
        let length = write_record(&mut self.out, record)?;
        self.index.apply(offset, length, record);
        self.position += length;
        self.records += 1;
        Ok(offset)
    }

    /// Flush the data log and save the index, marking a clean shutdown.
    pub fn finish(mut self) -> Result<(), StoreError> {
        self.out.flush()?;
        self.out.get_ref().sync_all()?;

        self.index.set_lengths(self.position, self.position);
        self.index.save(&self.layout.index_dir())?;

        info!(
            cache = self.layout.cache(),
            appended = self.records,
            entries = self.index.len(),
            bytes = self.position,
            "store writer finished"
        );
        Ok(())
    }
}

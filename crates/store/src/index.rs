use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::layout::{INDEX_FILE, INDEX_META_FILE};
use crate::record::Record;

/// Location of the live record for one key within the data log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Byte offset of the record frame in the data log.
    pub offset: u64,
    /// Full frame length, including the 4-byte length prefix.
    pub length: u64,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Written last on save; its absence means the index was not shut down cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexMeta {
    /// Data log length observed when the index was saved.
    data_len: u64,
    /// End of the last complete record; anything past it is a torn tail.
    valid_len: u64,
    entry_count: usize,
    saved_at: DateTime<Utc>,
}

/// Key -> latest live record.
///
/// Persisted as `entries.idx` using length-prefixed msgpack encoding: each
/// entry is a `(key, IndexEntry)` tuple preceded by a u32 little-endian byte
/// length. `index.json` records how much of the data log the index covers.
#[derive(Debug, Default)]
pub struct KeyIndex {
    entries: HashMap<Vec<u8>, IndexEntry>,
    data_len: u64,
    valid_len: u64,
}

impl KeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one data log record into the index.
    pub fn apply(&mut self, offset: u64, length: u64, record: &Record) {
        match record.value {
            Some(_) => {
                self.entries.insert(
                    record.key.clone(),
                    IndexEntry {
                        offset,
                        length,
                        expires_at: record.expires_at,
                    },
                );
            }
            None => {
                self.entries.remove(&record.key);
            }
        }
        self.valid_len = self.valid_len.max(offset + length);
    }

    pub fn get(&self, key: &[u8]) -> Option<&IndexEntry> {
        self.entries.get(key)
    }

    /// Whether the record at `offset` is the one the index points to for `key`.
    pub fn is_current(&self, key: &[u8], offset: u64) -> bool {
        self.entries.get(key).is_some_and(|e| e.offset == offset)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries not yet expired at `now`.
    pub fn live_count(&self, now: DateTime<Utc>) -> u64 {
        self.entries
            .values()
            .filter(|e| e.expires_at.map_or(true, |at| at > now))
            .count() as u64
    }

    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    pub fn valid_len(&self) -> u64 {
        self.valid_len
    }

    pub(crate) fn set_lengths(&mut self, data_len: u64, valid_len: u64) {
        self.data_len = data_len;
        self.valid_len = valid_len;
    }

    /// Remove the clean-shutdown marker. Called before the data log is modified.
    pub fn mark_dirty(dir: &Path) -> Result<(), StoreError> {
        match fs::remove_file(dir.join(INDEX_META_FILE)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the index into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<(), StoreError> {
        fs::create_dir_all(dir)?;
        Self::mark_dirty(dir)?;

        let mut file = std::io::BufWriter::new(fs::File::create(dir.join(INDEX_FILE))?);
        for (key, entry) in &self.entries {
            let tuple: (&Vec<u8>, &IndexEntry) = (key, entry);
            let encoded =
                rmp_serde::to_vec(&tuple).map_err(|e| StoreError::Serialize(e.to_string()))?;

            let len = encoded.len() as u32;
            file.write_all(&len.to_le_bytes())?;
            file.write_all(&encoded)?;
        }
        file.flush()?;
        file.get_ref().sync_all()?;

        let meta = IndexMeta {
            data_len: self.data_len,
            valid_len: self.valid_len,
            entry_count: self.entries.len(),
            saved_at: Utc::now(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        fs::write(dir.join(INDEX_META_FILE), meta_json)?;
        Ok(())
    }

    /// Load a cleanly saved index from `dir`.
    ///
    /// Returns `Ok(None)` when there is no clean-shutdown marker.
    pub fn load(dir: &Path) -> Result<Option<Self>, StoreError> {
        let meta_path = dir.join(INDEX_META_FILE);
        if !meta_path.exists() {
            return Ok(None);
        }
        let meta: IndexMeta = serde_json::from_str(&fs::read_to_string(&meta_path)?)
            .map_err(|e| StoreError::Serialize(format!("{}: {}", meta_path.display(), e)))?;

        let data = fs::read(dir.join(INDEX_FILE))?;
        let mut entries = HashMap::with_capacity(meta.entry_count);
        let mut pos = 0;

        while pos + 4 <= data.len() {
            let mut prefix = [0u8; 4];
            prefix.copy_from_slice(&data[pos..pos + 4]);
            let len = u32::from_le_bytes(prefix) as usize;
            pos += 4;

            if pos + len > data.len() {
                return Err(StoreError::Serialize("truncated index entry".to_string()));
            }

            let (key, entry): (Vec<u8>, IndexEntry) = rmp_serde::from_slice(&data[pos..pos + len])
                .map_err(|e| StoreError::Serialize(e.to_string()))?;
            entries.insert(key, entry);
            pos += len;
        }

        if entries.len() != meta.entry_count {
            return Err(StoreError::Serialize(format!(
                "index holds {} entries but metadata says {}",
                entries.len(),
                meta.entry_count
            )));
        }

        Ok(Some(Self {
            entries,
            data_len: meta.data_len,
            valid_len: meta.valid_len,
        }))
    }
}

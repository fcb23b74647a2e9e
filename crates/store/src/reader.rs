use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::StoreError;
use crate::record::{read_record, Record, RecordIter};

/// Read-only memory map of a data log.
pub struct DataFile {
    /// `None` for an empty log, which cannot be mapped on every platform.
    mmap: Option<Mmap>,
}

impl DataFile {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(Self { mmap: None });
        }
        // The log is append-only and only modified through a StoreWriter,
        // which is never used while a reader holds the map.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap: Some(mmap) })
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.mmap {
            Some(mmap) => mmap,
            None => &[],
        }
    }

    pub fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Read the record framed at `offset`.
    pub fn read_at(&self, offset: u64) -> Result<Record, StoreError> {
        match read_record(self.as_slice(), offset)? {
            Some((record, _)) => Ok(record),
            None => Err(StoreError::Corrupt {
                offset,
                reason: "record extends past end of data log".to_string(),
            }),
        }
    }

    pub fn records(&self) -> RecordIter<'_> {
        RecordIter::new(self.as_slice())
    }
}

//! Framing of data log records: a u32 little-endian length followed by the
//! msgpack-encoded [`Record`].

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

const LEN_PREFIX: usize = 4;

/// One data log record. `value: None` marks a removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn put(key: &[u8], value: &[u8], expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            key: key.to_vec(),
            value: Some(value.to_vec()),
            expires_at,
        }
    }

    pub fn tombstone(key: &[u8]) -> Self {
        Self {
            key: key.to_vec(),
            value: None,
            expires_at: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Append one framed record, returning the number of bytes written.
pub fn write_record<W: Write>(out: &mut W, record: &Record) -> Result<u64, StoreError> {
    let encoded =
        rmp_serde::to_vec(record).map_err(|e| StoreError::Serialize(e.to_string()))?;
    let len = u32::try_from(encoded.len())
        .map_err(|_| StoreError::Serialize(format!("record of {} bytes is too large", encoded.len())))?;

    out.write_all(&len.to_le_bytes())?;
    out.write_all(&encoded)?;
    Ok((LEN_PREFIX + encoded.len()) as u64)
}

/// Decode the record framed at `offset`.
///
/// Returns `Ok(None)` when the remaining bytes do not hold a complete frame
/// (end of log, or a tail cut short by a crash). The second tuple element is
/// the full frame length.
pub fn read_record(data: &[u8], offset: u64) -> Result<Option<(Record, u64)>, StoreError> {
    let Ok(off) = usize::try_from(offset) else {
        return Ok(None);
    };
    if off.saturating_add(LEN_PREFIX) > data.len() {
        return Ok(None);
    }

    let mut prefix = [0u8; LEN_PREFIX];
    prefix.copy_from_slice(&data[off..off + LEN_PREFIX]);
    let len = u32::from_le_bytes(prefix) as usize;

    let start = off + LEN_PREFIX;
    if start.saturating_add(len) > data.len() {
        return Ok(None);
    }

    let record: Record = rmp_serde::from_slice(&data[start..start + len]).map_err(|e| {
        StoreError::Corrupt {
            offset,
            reason: e.to_string(),
        }
    })?;
    Ok(Some((record, (LEN_PREFIX + len) as u64)))
}

/// Walks every complete frame of a data log in order.
pub struct RecordIter<'a> {
    data: &'a [u8],
    pos: u64,
}

impl<'a> RecordIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Offset just past the last complete frame returned so far.
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl<'a> Iterator for RecordIter<'a> {
    /// `(offset, frame length, record)`
    type Item = Result<(u64, u64, Record), StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        match read_record(self.data, self.pos) {
            Ok(Some((record, frame_len))) => {
                let offset = self.pos;
                self.pos += frame_len;
                Some(Ok((offset, frame_len, record)))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

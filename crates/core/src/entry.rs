use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;

/// One key/value pair read from the source store.
///
/// Keys and values are opaque; the pipeline never inspects them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Bytes,
    pub value: Bytes,
    /// Remaining lifetime. `None` means the entry never expires.
    pub ttl: Option<Duration>,
}

impl Entry {
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// TTL in whole milliseconds, rounded up so a live entry never gets a zero TTL.
    pub fn ttl_millis(&self) -> Option<u64> {
        self.ttl.map(|ttl| {
            let millis = ttl.as_millis().min(u128::from(u64::MAX)) as u64;
            if Duration::from_millis(millis) < ttl {
                millis.saturating_add(1)
            } else {
                millis.max(1)
            }
        })
    }
}

/// Result of one conditional insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

impl InsertOutcome {
    pub fn from_inserted(inserted: bool) -> Self {
        if inserted {
            Self::Inserted
        } else {
            Self::AlreadyPresent
        }
    }

    pub fn was_inserted(self) -> bool {
        matches!(self, Self::Inserted)
    }
}

impl std::fmt::Display for InsertOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsertOutcome::Inserted => write!(f, "inserted"),
            InsertOutcome::AlreadyPresent => write!(f, "already_present"),
        }
    }
}

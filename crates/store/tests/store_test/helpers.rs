use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

use cachelift_store::{StoreLayout, StoreWriter};

pub const CACHE: &str = "sessions";

/// Fresh scratch location plus the layout of a cache inside it.
pub fn scratch_layout() -> (TempDir, StoreLayout) {
    let dir = tempfile::tempdir().unwrap();
    let layout = StoreLayout::new(dir.path(), CACHE);
    (dir, layout)
}

pub fn key(i: usize) -> Vec<u8> {
    format!("key-{i:04}").into_bytes()
}

pub fn value(i: usize) -> Vec<u8> {
    format!("value-{i}").into_bytes()
}

pub fn in_hours(hours: i64) -> Option<DateTime<Utc>> {
    Some(Utc::now() + Duration::hours(hours))
}

/// Write `count` immortal entries and finish cleanly.
pub fn write_entries(layout: &StoreLayout, count: usize) {
    let mut writer = StoreWriter::create(layout).unwrap();
    for i in 0..count {
        writer.put(&key(i), &value(i), None).unwrap();
    }
    writer.finish().unwrap();
}

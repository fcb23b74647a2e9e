use std::fs::OpenOptions;
use std::io::Write;

use cachelift_store::layout::INDEX_META_FILE;
use cachelift_store::{Store, StoreError, StoreLayout, StoreWriter};

use crate::helpers::{key, scratch_layout, value, write_entries, CACHE};

#[test]
fn clean_store_opens_without_rebuild() {
    let (_dir, layout) = scratch_layout();
    write_entries(&layout, 25);

    let mut rebuilt_records = 0;
    let store = Store::open_with_progress(&layout, || rebuilt_records += 1).unwrap();

    assert!(!store.index_rebuilt());
    assert_eq!(rebuilt_records, 0);
    assert_eq!(store.entry_count(), 25);
}

#[test]
fn unclean_shutdown_triggers_rebuild() {
    let (_dir, layout) = scratch_layout();
    {
        let mut writer = StoreWriter::create(&layout).unwrap();
        for i in 0..10 {
            writer.put(&key(i), &value(i), None).unwrap();
        }
        // dropped without finish()
    }
    assert!(!layout.index_dir().join(INDEX_META_FILE).exists());

    let mut scanned = 0;
    let store = Store::open_with_progress(&layout, || scanned += 1).unwrap();
    assert!(store.index_rebuilt());
    assert_eq!(scanned, 10);
    assert_eq!(store.entry_count(), 10);

    // The rebuild saved a clean index.
    drop(store);
    assert!(!Store::open(&layout).unwrap().index_rebuilt());
}

#[test]
fn missing_index_dir_is_recreated() {
    let (_dir, layout) = scratch_layout();
    write_entries(&layout, 3);
    std::fs::remove_dir_all(layout.index_dir()).unwrap();

    let store = Store::open(&layout).unwrap();
    assert!(store.index_rebuilt());
    assert!(layout.index_dir().join(INDEX_META_FILE).exists());
}

#[test]
fn index_out_of_date_with_data_log_is_rebuilt() {
    let (_dir, layout) = scratch_layout();
    write_entries(&layout, 4);

    // Append a record behind the index's back.
    let mut raw = Vec::new();
    cachelift_store::record::write_record(
        &mut raw,
        &cachelift_store::record::Record::put(b"late", b"arrival", None),
    )
    .unwrap();
    let mut file = OpenOptions::new().append(true).open(layout.data_file()).unwrap();
    file.write_all(&raw).unwrap();
    drop(file);

    let store = Store::open(&layout).unwrap();
    assert!(store.index_rebuilt());
    assert_eq!(store.entry_count(), 5);
    assert!(store.get(b"late").unwrap().is_some());
}

#[test]
fn torn_tail_is_ignored_and_cut_on_append() {
    let (_dir, layout) = scratch_layout();
    write_entries(&layout, 5);
    let mut file = OpenOptions::new().append(true).open(layout.data_file()).unwrap();
    file.write_all(&[0xff, 0x00, 0x00]).unwrap();
    drop(file);

    let store = Store::open(&layout).unwrap();
    assert!(store.index_rebuilt());
    assert_eq!(store.entry_count(), 5);
    drop(store);

    let mut writer = StoreWriter::open(&layout).unwrap();
    writer.put(b"after-tear", b"ok", None).unwrap();
    writer.finish().unwrap();

    let store = Store::open(&layout).unwrap();
    assert!(!store.index_rebuilt());
    assert_eq!(store.entry_count(), 6);
}

#[test]
fn forced_rebuild_reports_every_record() {
    let (_dir, layout) = scratch_layout();
    let mut writer = StoreWriter::create(&layout).unwrap();
    writer.put(b"a", b"1", None).unwrap();
    writer.put(b"a", b"2", None).unwrap();
    writer.remove(b"a").unwrap();
    writer.put(b"b", b"3", None).unwrap();
    writer.finish().unwrap();

    let mut store = Store::open(&layout).unwrap();
    let mut scanned = 0;
    let live = store.rebuild_index(|| scanned += 1).unwrap();
    assert_eq!(scanned, 4);
    assert_eq!(live, 1);
}

#[test]
fn missing_cache_directory_is_not_found() {
    let (dir, _layout) = scratch_layout();
    let err = Store::open(&StoreLayout::new(dir.path(), "other")).err().unwrap();
    assert!(matches!(err, StoreError::NotFound(_)));

    let migrate_err: cachelift_core::MigrateError = err.into();
    assert!(matches!(migrate_err, cachelift_core::MigrateError::Configuration(_)));
}

#[test]
fn explicit_directory_names_are_honoured() {
    let (dir, _) = scratch_layout();
    let layout = StoreLayout::new(dir.path(), CACHE)
        .with_data_dir_name(Some("payload".into()))
        .with_index_dir_name(Some("lookup".into()));
    write_entries(&layout, 2);

    assert!(dir.path().join(CACHE).join("payload").join("entries.dat").exists());
    assert!(dir.path().join(CACHE).join("lookup").join("entries.idx").exists());
    assert_eq!(Store::open(&layout).unwrap().entry_count(), 2);

    // The default names do not see it.
    assert!(Store::open(&StoreLayout::new(dir.path(), CACHE)).is_err());
}

use std::fs;
use std::path::Path;
use tempfile::tempdir;

use zapper_core::hasher::{self, ExtensionDetector, HashEngine, HashSummary};
use zapper_core::storage::models::RecordStatus;
use zapper_core::storage::{BatchCursor, Database};
use zapper_core::{AppConfig, Engine, SilentReporter, TypeDetectorKind};

fn test_config(batch_size: usize) -> AppConfig {
    AppConfig {
        type_detector: TypeDetectorKind::Extension,
        batch_size,
        max_concurrent_file_operations: 4,
        ..AppConfig::default()
    }
}

fn test_engine(batch_size: usize) -> Engine {
    Engine::with_database(test_config(batch_size), Database::open_in_memory().unwrap())
}

/// Six files, four distinct contents:
///   folder_a/shared.txt == folder_b/shared.txt
///   folder_c/large_dup_1.bin == folder_c/large_dup_2.bin
fn create_test_tree(root: &Path) {
    let folder_a = root.join("folder_a");
    let folder_b = root.join("folder_b");
    let folder_c = root.join("folder_c");
    fs::create_dir_all(&folder_a).unwrap();
    fs::create_dir_all(&folder_b).unwrap();
    fs::create_dir_all(&folder_c).unwrap();

    fs::write(folder_a.join("unique_a.txt"), "unique content a").unwrap();
    fs::write(folder_b.join("unique_b.txt"), "unique content b").unwrap();
    fs::write(folder_a.join("shared.txt"), "shared content xyz").unwrap();
    fs::write(folder_b.join("shared.txt"), "shared content xyz").unwrap();
    fs::write(folder_c.join("large_dup_1.bin"), vec![0xAAu8; 10_000]).unwrap();
    fs::write(folder_c.join("large_dup_2.bin"), vec![0xAAu8; 10_000]).unwrap();
}

fn crawled_engine(root: &Path, batch_size: usize) -> Engine {
    let engine = test_engine(batch_size);
    engine.crawl(root, &SilentReporter).unwrap();
    engine
}

fn file_id(db: &Database, name: &str) -> i64 {
    db.connection()
        .query_row("SELECT id FROM file WHERE name = ?1 ORDER BY id LIMIT 1", [name], |row| {
            row.get(0)
        })
        .unwrap()
}

#[test]
fn test_hash_groups_duplicates() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_test_tree(&root);
    let engine = crawled_engine(&root, 100);

    let summary = engine.hash_files(&SilentReporter).unwrap();
    assert_eq!(summary.files_hashed, 6);
    assert_eq!(summary.new_hashes, 4);
    assert_eq!(summary.duplicates, 2);
    assert_eq!(summary.collisions, 0);

    let db = engine.database();
    assert_eq!(db.count_rows("file_hash").unwrap(), 4);
    assert_eq!(db.count_unhashed_files().unwrap(), 0);

    let a = db.get_file(file_id(db, "large_dup_1.bin")).unwrap().unwrap();
    let b = db.get_file(file_id(db, "large_dup_2.bin")).unwrap().unwrap();
    assert_eq!(a.file_hash_id, b.file_hash_id);
    assert_eq!(a.size, Some(10_000));
    assert!(a.file_type_id.is_some());
}

#[test]
fn test_rehash_is_a_noop() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_test_tree(&root);
    let engine = crawled_engine(&root, 100);

    engine.hash_files(&SilentReporter).unwrap();
    let again = engine.hash_files(&SilentReporter).unwrap();
    assert_eq!(again.files_hashed, 0);
    assert_eq!(engine.database().count_rows("file_hash").unwrap(), 4);
}

#[test]
fn test_same_size_files_differing_past_buffer_get_different_hashes() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir_all(&root).unwrap();
    let mut bytes = vec![0x11u8; 8192];
    fs::write(root.join("one.bin"), &bytes).unwrap();
    bytes[6000] = 0x12;
    fs::write(root.join("two.bin"), &bytes).unwrap();

    assert_ne!(
        hasher::hash_file(&root.join("one.bin")).unwrap(),
        hasher::hash_file(&root.join("two.bin")).unwrap()
    );

    let engine = crawled_engine(&root, 100);
    let summary = engine.hash_files(&SilentReporter).unwrap();
    assert_eq!(summary.new_hashes, 2);
    assert_eq!(summary.duplicates, 0);
}

#[test]
fn test_zero_length_files_are_hashed() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("empty_1"), "").unwrap();
    fs::write(root.join("empty_2"), "").unwrap();

    let engine = crawled_engine(&root, 100);
    let summary = engine.hash_files(&SilentReporter).unwrap();
    assert_eq!(summary.new_hashes, 1);
    assert_eq!(summary.duplicates, 1);

    let db = engine.database();
    let file = db.get_file(file_id(db, "empty_1")).unwrap().unwrap();
    assert_eq!(file.size, Some(0));
}

#[test]
fn test_missing_file_is_tombstoned() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_test_tree(&root);
    let engine = crawled_engine(&root, 100);
    fs::remove_file(root.join("folder_a").join("unique_a.txt")).unwrap();

    let summary = engine.hash_files(&SilentReporter).unwrap();
    assert_eq!(summary.missing, 1);
    assert_eq!(summary.files_hashed, 5);

    let db = engine.database();
    let gone = db.get_file(file_id(db, "unique_a.txt")).unwrap().unwrap();
    assert_eq!(gone.status, RecordStatus::Tombstoned);
    assert_eq!(gone.file_hash_id, None);
    // Tombstoned rows never come back in a batch.
    assert_eq!(db.count_unhashed_files().unwrap(), 0);

    let purged = engine.purge().unwrap();
    assert_eq!(purged.files, 1);
    assert!(db.get_file(gone.id).unwrap().is_none());
}

#[test]
fn test_hashing_resumes_after_interruption() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_test_tree(&root);
    let engine = crawled_engine(&root, 2);
    let db = engine.database();
    let config = test_config(2);

    // First run stops after a single committed batch.
    let mut first = HashSummary::default();
    {
        let mut hash_engine =
            HashEngine::new(db, &config, &ExtensionDetector, &SilentReporter).unwrap();
        let mut cursor = BatchCursor::new(config.batch_size);
        assert!(hash_engine.run_batch(&mut cursor, &mut first).unwrap());
    }
    assert_eq!(first.files_hashed, 2);
    assert_eq!(db.count_unhashed_files().unwrap(), 4);

    let second = HashEngine::new(db, &config, &ExtensionDetector, &SilentReporter)
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(second.files_hashed, 4);
    assert_eq!(db.count_unhashed_files().unwrap(), 0);
    assert_eq!(db.count_rows("file_hash").unwrap(), 4);
    assert_eq!(first.new_hashes + second.new_hashes, 4);
    assert_eq!(first.duplicates + second.duplicates, 2);
}

#[test]
fn test_size_stage_fills_missing_sizes() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_test_tree(&root);
    let engine = crawled_engine(&root, 3);
    engine.hash_files(&SilentReporter).unwrap();

    let db = engine.database();
    db.connection()
        .execute_batch("UPDATE file_hash SET size = NULL; UPDATE file SET size = NULL;")
        .unwrap();
    assert_eq!(db.count_unsized_hashes().unwrap(), 4);

    let summary = engine.size_files(&SilentReporter).unwrap();
    assert_eq!(summary.hashes_sized, 4);
    assert_eq!(summary.files_updated, 6);
    assert_eq!(db.count_unsized_hashes().unwrap(), 0);

    let big = db.get_file(file_id(db, "large_dup_2.bin")).unwrap().unwrap();
    assert_eq!(big.size, Some(10_000));
}

#[test]
fn test_type_stage_fills_missing_types() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_test_tree(&root);
    let engine = crawled_engine(&root, 3);
    engine.hash_files(&SilentReporter).unwrap();

    let db = engine.database();
    db.connection()
        .execute_batch(
            "UPDATE file_hash SET file_type_id = NULL; \
             UPDATE file SET file_type_id = NULL; \
             DELETE FROM file_type;",
        )
        .unwrap();

    let summary = engine.type_files(&SilentReporter).unwrap();
    assert_eq!(summary.hashes_typed, 4);
    assert_eq!(summary.new_types, 2);
    assert_eq!(summary.files_updated, 6);

    let types: Vec<String> = db.file_types().unwrap().into_iter().map(|t| t.mime_type).collect();
    assert!(types.contains(&"text/plain".to_string()));
    assert!(types.contains(&"application/octet-stream".to_string()));
}

#[test]
fn test_sanity_check_reports_changed_and_missing_duplicates() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_test_tree(&root);
    let engine = crawled_engine(&root, 3);
    engine.hash_files(&SilentReporter).unwrap();

    fs::write(root.join("folder_b").join("shared.txt"), "grown since hashing").unwrap();
    fs::remove_file(root.join("folder_c").join("large_dup_2.bin")).unwrap();

    let summary = engine.duplicate_hash_sanity_check(&SilentReporter).unwrap();
    assert_eq!(summary.checked, 3);
    assert_eq!(summary.size_mismatches, 1);
    assert_eq!(summary.type_mismatches, 0);
    assert_eq!(summary.missing, 1);

    let db = engine.database();
    let gone = db.get_file(file_id(db, "large_dup_2.bin")).unwrap().unwrap();
    assert_eq!(gone.status, RecordStatus::Tombstoned);
}

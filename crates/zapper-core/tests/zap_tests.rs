use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

use zapper_core::hasher;
use zapper_core::platform::get_path_without_root;
use zapper_core::storage::Database;
use zapper_core::store::{self, ContentStore};
use zapper_core::{AppConfig, Engine, Error, SilentReporter, TypeDetectorKind};

fn test_config() -> AppConfig {
    AppConfig {
        type_detector: TypeDetectorKind::Extension,
        batch_size: 2,
        max_concurrent_file_operations: 4,
        ..AppConfig::default()
    }
}

fn count_files_recursive(dir: &Path) -> usize {
    let mut count = 0;
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                count += count_files_recursive(&path);
            } else if path.is_file() {
                count += 1;
            }
        }
    }
    count
}

/// Relative path → contents of every file under `dir`.
fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn visit(base: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in fs::read_dir(dir).unwrap().flatten() {
            let path = entry.path();
            if path.is_dir() {
                visit(base, &path, out);
            } else {
                let rel = path.strip_prefix(base).unwrap().to_path_buf();
                out.insert(rel, fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    visit(dir, dir, &mut out);
    out
}

/// Seven files, four distinct contents, spread over nested folders.
fn create_test_tree(root: &Path) {
    let folder_a = root.join("folder_a");
    let folder_b = root.join("folder_b").join("inner");
    let folder_c = root.join("folder_c");
    fs::create_dir_all(&folder_a).unwrap();
    fs::create_dir_all(&folder_b).unwrap();
    fs::create_dir_all(&folder_c).unwrap();

    fs::write(folder_a.join("unique_a.txt"), "unique content a").unwrap();
    fs::write(folder_a.join("shared.txt"), "shared content xyz").unwrap();
    fs::write(folder_b.join("shared.txt"), "shared content xyz").unwrap();
    fs::write(folder_b.join("shared_copy.txt"), "shared content xyz").unwrap();
    fs::write(folder_b.join("unique_b.txt"), "unique content b").unwrap();
    fs::write(folder_c.join("large_dup_1.bin"), vec![0xAAu8; 9000]).unwrap();
    fs::write(folder_c.join("large_dup_2.bin"), vec![0xAAu8; 9000]).unwrap();
}

fn zapped_file_count(db: &Database) -> i64 {
    db.connection()
        .query_row("SELECT COUNT(*) FROM file WHERE zapped = 1", [], |row| row.get(0))
        .unwrap()
}

/// Crawl and hash `root`; returns the engine and the canonical root.
fn prepared_engine(root: &Path) -> (Engine, PathBuf) {
    let engine = Engine::with_database(test_config(), Database::open_in_memory().unwrap());
    let summary = engine.crawl(root, &SilentReporter).unwrap();
    engine.hash_files(&SilentReporter).unwrap();
    (engine, summary.root)
}

#[test]
fn test_zap_unzap_round_trip() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_test_tree(&root);
    let original = snapshot(&root);
    let (engine, canonical_root) = prepared_engine(&root);
    let store_root = tmp.path().join("store");

    let summary = engine
        .zap(Some(&store_root), false, &SilentReporter)
        .unwrap();
    assert_eq!(summary.uniques_zapped, 4);
    assert_eq!(summary.duplicates_removed, 3);
    assert_eq!(summary.duplicates_zapped, 3);
    assert_eq!(summary.collisions, 0);
    assert_eq!(zapped_file_count(engine.database()), 7);
    assert!(summary.reduction_percentage() > 0.0);

    // The crawled tree is gone, only the root folder remains.
    assert!(root.is_dir());
    assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
    // One stored file per distinct content.
    assert_eq!(count_files_recursive(&store_root), 4);
    assert_eq!(engine.database().count_zapped_hashes().unwrap(), 4);

    let restore = tmp.path().join("restore");
    let unzapped = engine
        .unzap(&store_root, &restore, &SilentReporter)
        .unwrap();
    assert_eq!(unzapped.files_restored, 7);
    assert_eq!(unzapped.missing, 0);

    let restored_root = restore.join(get_path_without_root(&canonical_root));
    assert_eq!(snapshot(&restored_root), original);
    // Restoring copies; the store keeps its content.
    assert_eq!(count_files_recursive(&store_root), 4);
}

#[test]
fn test_unzap_requires_empty_destination() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_test_tree(&root);
    let (engine, _) = prepared_engine(&root);
    let store_root = tmp.path().join("store");
    engine.zap(Some(&store_root), true, &SilentReporter).unwrap();

    let occupied = tmp.path().join("occupied");
    fs::create_dir_all(&occupied).unwrap();
    fs::write(occupied.join("already_here.txt"), "x").unwrap();

    let result = engine.unzap(&store_root, &occupied, &SilentReporter);
    assert!(matches!(result, Err(Error::DestinationNotEmpty(_))));
    assert_eq!(count_files_recursive(&occupied), 1);
}

#[test]
fn test_unzap_counts_failed_restores() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_test_tree(&root);
    let (engine, _) = prepared_engine(&root);
    let store_root = tmp.path().join("store");
    engine.zap(Some(&store_root), true, &SilentReporter).unwrap();

    // A stored hash too short to map onto the store layout.
    engine
        .database()
        .connection()
        .execute(
            "UPDATE file_hash SET hash = 'AA' \
             WHERE id = (SELECT file_hash_id FROM file WHERE name = 'unique_a.txt')",
            [],
        )
        .unwrap();

    let restore = tmp.path().join("restore");
    let summary = engine
        .unzap(&store_root, &restore, &SilentReporter)
        .unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.files_restored, 6);
    assert_eq!(summary.missing, 0);
    assert_eq!(count_files_recursive(&restore), 6);
}

#[test]
fn test_safe_mode_leaves_tree_untouched() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_test_tree(&root);
    let original = snapshot(&root);
    let (engine, _) = prepared_engine(&root);
    let store_root = tmp.path().join("store");

    let summary = engine.zap(Some(&store_root), true, &SilentReporter).unwrap();
    assert!(summary.safe_mode);
    assert_eq!(summary.uniques_zapped, 4);
    assert_eq!(summary.duplicates_zapped, 3);
    assert_eq!(summary.duplicates_removed, 0);
    assert_eq!(summary.pruned.folders_removed, 0);

    assert_eq!(snapshot(&root), original);
    assert_eq!(count_files_recursive(&store_root), 4);
    assert_eq!(engine.database().count_zapped_hashes().unwrap(), 4);
    assert_eq!(zapped_file_count(engine.database()), 7);
}

#[test]
fn test_integrity_unmarks_damaged_content() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_test_tree(&root);
    let (engine, _) = prepared_engine(&root);
    let store_root = tmp.path().join("store");
    engine.zap(Some(&store_root), true, &SilentReporter).unwrap();

    let store = ContentStore::new(&store_root);
    let unique_a = hasher::hash_file(&root.join("folder_a").join("unique_a.txt")).unwrap();
    let large = hasher::hash_file(&root.join("folder_c").join("large_dup_1.bin")).unwrap();
    fs::remove_file(store.path_for(&unique_a).unwrap()).unwrap();
    fs::write(store.path_for(&large).unwrap(), b"truncated").unwrap();

    let summary = engine.integrity(Some(&store_root), &SilentReporter).unwrap();
    assert_eq!(summary.checked, 4);
    assert_eq!(summary.missing, 1);
    assert_eq!(summary.size_mismatches, 1);
    assert_eq!(summary.unmarked, 2);
    assert_eq!(engine.database().count_zapped_hashes().unwrap(), 2);
}

#[test]
fn test_different_stored_file_is_not_overwritten() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("only.txt"), "the real content").unwrap();
    let (engine, _) = prepared_engine(&root);

    let store_root = tmp.path().join("store");
    let store = ContentStore::new(&store_root);
    let hash = hasher::hash_file(&root.join("only.txt")).unwrap();
    let occupied = store.path_for(&hash).unwrap();
    fs::create_dir_all(occupied.parent().unwrap()).unwrap();
    fs::write(&occupied, "something else, longer").unwrap();

    let summary = engine.zap(Some(&store_root), false, &SilentReporter).unwrap();
    assert_eq!(summary.collisions, 1);
    assert_eq!(summary.uniques_zapped, 0);
    assert!(root.join("only.txt").exists());
    assert_eq!(fs::read(&occupied).unwrap(), b"something else, longer");
    assert_eq!(engine.database().count_zapped_hashes().unwrap(), 0);
}

#[test]
fn test_zap_with_nothing_hashed_does_nothing() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_test_tree(&root);
    let engine = Engine::with_database(test_config(), Database::open_in_memory().unwrap());
    engine.crawl(&root, &SilentReporter).unwrap();

    let store_root = tmp.path().join("store");
    let summary = engine.zap(Some(&store_root), false, &SilentReporter).unwrap();
    assert_eq!(summary.uniques_zapped, 0);
    assert!(!store_root.exists());
    assert_eq!(count_files_recursive(&root), 7);
}

#[test]
fn test_merge_zaps_collapses_identical_and_keeps_conflicts() {
    let tmp = tempdir().unwrap();
    let source = ContentStore::new(tmp.path().join("source"));
    let destination = ContentStore::new(tmp.path().join("destination"));

    let put = |store: &ContentStore, hash_of: &[u8], content: &[u8]| {
        let hash = hasher::digest::encode_hash(blake3::hash(hash_of).as_bytes());
        let path = store.path_for(&hash).unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    };
    let moved = put(&source, b"a", b"a");
    put(&source, b"b", b"b");
    put(&destination, b"b", b"b");
    let conflict = put(&source, b"d", b"d");
    put(&destination, b"d", b"different size");

    let summary =
        store::merge_zaps(source.root(), destination.root(), &test_config(), &SilentReporter)
            .unwrap();
    assert_eq!(summary.moved, 1);
    assert_eq!(summary.identical, 1);
    assert_eq!(summary.conflicts, 1);

    assert!(!moved.exists());
    assert!(conflict.exists());
    assert_eq!(count_files_recursive(source.root()), 1);
    assert_eq!(count_files_recursive(destination.root()), 3);
}

#[test]
fn test_merge_zaps_requires_directories() {
    let tmp = tempdir().unwrap();
    let result = store::merge_zaps(
        &tmp.path().join("missing"),
        tmp.path(),
        &test_config(),
        &SilentReporter,
    );
    assert!(matches!(result, Err(Error::PathResolution(_))));
}

use std::path::PathBuf;

/// Processing eligibility of a `path` or `file` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Active,
    Ignored,
    /// Soft-deleted: the entry went missing on disk after it was indexed.
    Tombstoned,
}

impl RecordStatus {
    pub fn from_columns(ignored: bool, deleted_at: Option<&str>) -> Self {
        match (deleted_at, ignored) {
            (Some(_), _) => RecordStatus::Tombstoned,
            (None, true) => RecordStatus::Ignored,
            (None, false) => RecordStatus::Active,
        }
    }

    pub fn is_eligible(&self) -> bool {
        matches!(self, RecordStatus::Active)
    }
}

/// A directory node. Roots have no parent, level 0, and an absolute name.
#[derive(Debug, Clone)]
pub struct PathRecord {
    pub id: i64,
    pub parent_path_id: Option<i64>,
    pub name: String,
    pub level: i64,
    pub status: RecordStatus,
}

#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: i64,
    pub path_id: i64,
    pub name: String,
    pub level: i64,
    pub file_hash_id: Option<i64>,
    pub size: Option<i64>,
    pub file_type_id: Option<i64>,
    pub zapped: bool,
    pub status: RecordStatus,
}

/// Distinct content, shared by every file with the same digest.
#[derive(Debug, Clone)]
pub struct FileHashRecord {
    pub id: i64,
    pub hash: String,
    pub size: Option<i64>,
    pub file_type_id: Option<i64>,
    pub ignored: bool,
    pub zapped: bool,
}

#[derive(Debug, Clone)]
pub struct FileTypeRecord {
    pub id: i64,
    pub mime_type: String,
}

/// A file id paired with the file's reconstructed absolute path.
#[derive(Debug, Clone)]
pub struct IdAndPath {
    pub id: i64,
    pub absolute_path: PathBuf,
}

/// A file together with the hash it belongs to.
#[derive(Debug, Clone)]
pub struct HashMember {
    pub file_hash_id: i64,
    pub hash: String,
    pub file_id: i64,
    pub absolute_path: PathBuf,
}

/// Snapshot of a hash already committed, with its type name.
#[derive(Debug, Clone)]
pub struct KnownHash {
    pub id: i64,
    pub hash: String,
    pub size: Option<i64>,
    pub file_type_id: Option<i64>,
    pub file_type: Option<String>,
}

/// A member of a shared hash, re-checked by the sanity check.
#[derive(Debug, Clone)]
pub struct SanityRow {
    pub file_id: i64,
    pub hash: String,
    pub size: Option<i64>,
    pub file_type: Option<String>,
    pub absolute_path: PathBuf,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZapTotals {
    pub hashes: i64,
    pub unique_bytes: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateTotals {
    pub files: i64,
    pub bytes: u64,
}

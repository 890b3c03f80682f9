use crate::error::Error;
use crate::hasher::digest::hash_to_hex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

const BUCKETS_PER_LEVEL: usize = 0x100;

/// A content-addressed directory: each distinct content lives once at
/// `<root>/<hh>/<hh>/<rest of the hex digest>`.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of a stored hash relative to the store root.
    pub fn relative_path(hash: &str) -> Result<PathBuf, Error> {
        let hex = hash_to_hex(hash)?;
        Ok(Path::new(&hex[0..2]).join(&hex[2..4]).join(&hex[4..]))
    }

    pub fn path_for(&self, hash: &str) -> Result<PathBuf, Error> {
        Ok(self.root.join(Self::relative_path(hash)?))
    }

    /// Every two-level bucket name pair, `00/00` through `ff/ff`.
    pub fn buckets() -> impl Iterator<Item = (String, String)> {
        (0..BUCKETS_PER_LEVEL).flat_map(|a| {
            (0..BUCKETS_PER_LEVEL).map(move |b| (format!("{:02x}", a), format!("{:02x}", b)))
        })
    }

    pub fn bucket_path(&self, level1: &str, level2: &str) -> PathBuf {
        self.root.join(level1).join(level2)
    }

    /// Create the root and all 65,536 buckets. A root that already exists is
    /// assumed to be structured and left alone. Returns whether anything was
    /// created.
    pub fn create_structure(&self) -> io::Result<bool> {
        if self.root.exists() {
            return Ok(false);
        }
        info!("Creating content store structure at {}", self.root.display());
        fs::create_dir_all(&self.root)?;
        for (level1, level2) in Self::buckets() {
            fs::create_dir_all(self.bucket_path(&level1, &level2))?;
        }
        Ok(true)
    }
}

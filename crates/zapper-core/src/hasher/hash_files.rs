//! Content hashing of crawled files.
//!
//! Batches of unhashed files are fanned out to the orchestrator; each task
//! stats, types and digests one file, then merges it into the signature map
//! under the lock. After the barrier the control thread commits the batch in
//! one transaction. The signature map is seeded with every hash already in
//! the database and lives for the whole run, so a digest seen in an earlier
//! batch or an earlier run is recognised as a duplicate.

use super::digest;
use super::file_type::TypeDetector;
use crate::config::AppConfig;
use crate::error::Error;
use crate::orchestrator::TaskOrchestrator;
use crate::progress::{ProgressReporter, Stage};
use crate::storage::models::IdAndPath;
use crate::storage::{BatchCursor, Database};
use ahash::AHashMap;
use std::fs;
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// A digest with its size, type and the files of the current batch that
/// share it. `id` is set once the digest has a `file_hash` row; `size` is
/// only unknown for hashes loaded before they were sized.
#[derive(Debug, Clone)]
struct Signature {
    id: Option<i64>,
    size: Option<i64>,
    file_type: Option<String>,
    file_type_id: Option<i64>,
    file_ids: Vec<i64>,
}

#[derive(Default)]
struct HashBatch {
    signatures: AHashMap<String, Signature>,
    not_found: Vec<i64>,
    hashed: usize,
    collisions: usize,
    skipped: usize,
}

#[derive(Debug, Default)]
pub struct HashSummary {
    pub files_hashed: usize,
    pub new_hashes: usize,
    pub duplicates: usize,
    pub collisions: usize,
    pub missing: usize,
    pub skipped: usize,
    pub duration: Duration,
}

pub struct HashEngine<'a> {
    db: &'a Database,
    detector: &'a dyn TypeDetector,
    reporter: &'a dyn ProgressReporter,
    orchestrator: TaskOrchestrator<'a>,
    batch_size: usize,
    signatures: AHashMap<String, Signature>,
    file_types: AHashMap<String, i64>,
}

impl<'a> HashEngine<'a> {
    /// Load the snapshot of known hashes and types.
    pub fn new(
        db: &'a Database,
        config: &AppConfig,
        detector: &'a dyn TypeDetector,
        reporter: &'a dyn ProgressReporter,
    ) -> Result<Self, Error> {
        let orchestrator =
            TaskOrchestrator::new(config.max_concurrent_file_operations, Stage::Hash, reporter)?;

        let signatures: AHashMap<String, Signature> = db
            .known_hashes()?
            .into_iter()
            .map(|known| {
                (
                    known.hash,
                    Signature {
                        id: Some(known.id),
                        size: known.size,
                        file_type: known.file_type,
                        file_type_id: known.file_type_id,
                        file_ids: Vec::new(),
                    },
                )
            })
            .collect();
        let file_types: AHashMap<String, i64> = db
            .file_types()?
            .into_iter()
            .map(|t| (t.mime_type, t.id))
            .collect();
        debug!(
            "Loaded {} known hashes and {} file types",
            signatures.len(),
            file_types.len()
        );

        Ok(Self {
            db,
            detector,
            reporter,
            orchestrator,
            batch_size: config.batch_size,
            signatures,
            file_types,
        })
    }

    /// Hash every eligible file that has no hash yet.
    pub fn run(&mut self) -> Result<HashSummary, Error> {
        let start = Instant::now();
        let total = self.db.count_unhashed_files()?;
        info!("Hashing {} files", total);
        self.reporter.on_stage_start(Stage::Hash, total.max(0) as u64);

        let mut cursor = BatchCursor::new(self.batch_size);
        let mut summary = HashSummary::default();
        while self.run_batch(&mut cursor, &mut summary)? {}

        self.reporter.on_stage_complete(Stage::Hash);
        summary.duration = start.elapsed();
        info!(
            "Hashed {} files: {} new hashes, {} duplicates, {} missing, {} collisions in {:.2}s",
            summary.files_hashed,
            summary.new_hashes,
            summary.duplicates,
            summary.missing,
            summary.collisions,
            summary.duration.as_secs_f64()
        );
        Ok(summary)
    }

    /// Process and commit one batch. Returns false once nothing is left.
    pub fn run_batch(
        &mut self,
        cursor: &mut BatchCursor,
        summary: &mut HashSummary,
    ) -> Result<bool, Error> {
        let files = self.db.unhashed_files_batch(cursor)?;
        if files.is_empty() {
            return Ok(false);
        }
        cursor.advance(files.iter().map(|f| f.id));
        debug!("Hashing batch of {} files", files.len());

        let detector = self.detector;
        let batch = HashBatch {
            signatures: std::mem::take(&mut self.signatures),
            ..HashBatch::default()
        };
        let batch = self
            .orchestrator
            .run(files, batch, |file, ctx| {
                let Some(observed) = observe(&file, detector) else {
                    ctx.lock().skipped += 1;
                    return Ok(());
                };
                let mut batch = ctx.lock();
                match observed {
                    Observed::Missing => batch.not_found.push(file.id),
                    Observed::Present {
                        hash,
                        size,
                        file_type,
                    } => merge(&mut batch, file, hash, size, file_type),
                }
                Ok(())
            })?;

        let HashBatch {
            mut signatures,
            not_found,
            hashed,
            collisions,
            skipped,
        } = batch;
        let result = self.commit(&mut signatures, &not_found, summary);
        self.signatures = signatures;
        result?;

        summary.files_hashed += hashed;
        summary.collisions += collisions;
        summary.skipped += skipped;
        summary.missing += not_found.len();
        Ok(true)
    }

    fn commit(
        &mut self,
        signatures: &mut AHashMap<String, Signature>,
        not_found: &[i64],
        summary: &mut HashSummary,
    ) -> Result<(), Error> {
        let db = self.db;
        let tx = db.transaction()?;
        for (hash, signature) in signatures.iter_mut() {
            if signature.file_ids.is_empty() {
                continue;
            }

            if signature.file_type_id.is_none() {
                if let Some(mime) = signature.file_type.clone() {
                    signature.file_type_id = Some(self.resolve_file_type(&mime)?);
                }
            }

            let members = signature.file_ids.len();
            match signature.id {
                Some(id) => {
                    summary.duplicates += members;
                    if let Some(size) = signature.size {
                        db.set_hash_size_if_missing(id, size)?;
                    }
                    if let Some(type_id) = signature.file_type_id {
                        db.set_hash_type_if_missing(id, type_id)?;
                    }
                }
                None => {
                    db.insert_file_hash(hash, signature.size, signature.file_type_id)?;
                    let id = db
                        .find_file_hash_id(hash)?
                        .ok_or_else(|| Error::HashUnresolved(hash.clone()))?;
                    signature.id = Some(id);
                    summary.new_hashes += 1;
                    summary.duplicates += members - 1;
                }
            }

            let id = signature
                .id
                .ok_or_else(|| Error::HashUnresolved(hash.clone()))?;
            for file_id in &signature.file_ids {
                db.set_file_hash(*file_id, id, signature.size, signature.file_type_id)?;
            }
        }
        db.tombstone_files(not_found)?;
        tx.commit()?;

        for signature in signatures.values_mut() {
            signature.file_ids.clear();
        }
        Ok(())
    }

    fn resolve_file_type(&mut self, mime: &str) -> Result<i64, Error> {
        if let Some(id) = self.file_types.get(mime) {
            return Ok(*id);
        }
        self.db.insert_file_type(mime)?;
        let id = self
            .db
            .find_file_type_id(mime)?
            .ok_or_else(|| Error::FileTypeUnresolved(mime.to_string()))?;
        self.file_types.insert(mime.to_string(), id);
        Ok(id)
    }
}

enum Observed {
    Missing,
    Present {
        hash: String,
        size: i64,
        file_type: String,
    },
}

/// Filesystem work for one file, done outside the lock. `None` means the
/// file is skipped for this run.
fn observe(file: &IdAndPath, detector: &dyn TypeDetector) -> Option<Observed> {
    let path = &file.absolute_path;
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} no longer exists", path.display());
            return Some(Observed::Missing);
        }
        Err(e) => {
            error!("Could not stat {}: {}", path.display(), e);
            return None;
        }
    };
    let size = match i64::try_from(metadata.len()) {
        Ok(size) => size,
        Err(_) => {
            error!("Size of {} is out of range", path.display());
            return None;
        }
    };
    let file_type = match detector.detect(path) {
        Ok(t) => t,
        Err(e) => {
            error!("Could not determine type of {}: {}", path.display(), e);
            return None;
        }
    };
    let hash = match digest::hash_file(path) {
        Ok(h) => h,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Some(Observed::Missing),
        Err(e) => {
            error!("Could not hash {}: {}", path.display(), e);
            return None;
        }
    };
    Some(Observed::Present {
        hash,
        size,
        file_type,
    })
}

fn merge(batch: &mut HashBatch, file: IdAndPath, hash: String, size: i64, file_type: String) {
    batch.hashed += 1;
    match batch.signatures.get_mut(&hash) {
        Some(Signature {
            size: Some(recorded),
            ..
        }) if *recorded != size => {
            warn!(
                "Possible hash collision: {} is {} bytes but {} was recorded with {} bytes",
                file.absolute_path.display(),
                size,
                hash,
                recorded
            );
            batch.collisions += 1;
        }
        Some(signature) => {
            signature.size.get_or_insert(size);
            if signature.file_type.is_none() {
                signature.file_type = Some(file_type);
            }
            signature.file_ids.push(file.id);
        }
        None => {
            batch.signatures.insert(
                hash,
                Signature {
                    id: None,
                    size: Some(size),
                    file_type: Some(file_type),
                    file_type_id: None,
                    file_ids: vec![file.id],
                },
            );
        }
    }
}

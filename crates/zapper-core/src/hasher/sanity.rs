use super::file_type::TypeDetector;
use crate::config::AppConfig;
use crate::error::Error;
use crate::orchestrator::TaskOrchestrator;
use crate::progress::{ProgressReporter, Stage};
use crate::storage::Database;
use std::fs;
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
pub struct SanitySummary {
    pub checked: usize,
    pub size_mismatches: usize,
    pub type_mismatches: usize,
    pub missing: usize,
    pub duration: Duration,
}

#[derive(Default)]
struct SanityBatch {
    checked: usize,
    size_mismatches: usize,
    type_mismatches: usize,
    not_found: Vec<i64>,
}

/// Re-check every file whose hash is shared with another file: its size and
/// type on disk must still match what the hash recorded. Mismatches are
/// logged, vanished files are tombstoned. Nothing else is changed.
pub fn duplicate_hash_sanity_check(
    db: &Database,
    config: &AppConfig,
    detector: &dyn TypeDetector,
    reporter: &dyn ProgressReporter,
) -> Result<SanitySummary, Error> {
    let start = Instant::now();
    let batches = db.partition_ids(Database::shared_hash_file_ids_sql(), config.batch_size)?;
    let total: usize = batches.iter().map(Vec::len).sum();
    info!("Sanity checking {} files in {} batches", total, batches.len());
    reporter.on_stage_start(Stage::SanityCheck, total as u64);

    let orchestrator = TaskOrchestrator::new(
        config.max_concurrent_file_operations,
        Stage::SanityCheck,
        reporter,
    )?;
    let mut summary = SanitySummary::default();

    for ids in batches {
        let rows = db.sanity_rows(&ids)?;
        debug!("Sanity checking batch of {} files", rows.len());

        let batch = orchestrator.run(rows, SanityBatch::default(), |row, ctx| {
            let path = &row.absolute_path;
            let metadata = match fs::metadata(path) {
                Ok(m) => m,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!("{} (hash {}) no longer exists", path.display(), row.hash);
                    ctx.lock().not_found.push(row.file_id);
                    return Ok(());
                }
                Err(e) => {
                    error!("Could not stat {}: {}", path.display(), e);
                    return Ok(());
                }
            };

            let size_mismatch = match row.size {
                Some(size) if size as u64 != metadata.len() => {
                    warn!(
                        "Size mismatch for {}: {} bytes on disk, hash {} recorded {} bytes",
                        path.display(),
                        metadata.len(),
                        row.hash,
                        size
                    );
                    true
                }
                _ => false,
            };

            let type_mismatch = match (&row.file_type, detector.detect(path)) {
                (Some(recorded), Ok(actual)) if *recorded != actual => {
                    warn!(
                        "Type mismatch for {}: {} on disk, hash {} recorded {}",
                        path.display(),
                        actual,
                        row.hash,
                        recorded
                    );
                    true
                }
                (_, Err(e)) => {
                    error!("Could not determine type of {}: {}", path.display(), e);
                    false
                }
                _ => false,
            };

            let mut batch = ctx.lock();
            batch.checked += 1;
            batch.size_mismatches += size_mismatch as usize;
            batch.type_mismatches += type_mismatch as usize;
            Ok(())
        })?;

        let tx = db.transaction()?;
        db.tombstone_files(&batch.not_found)?;
        tx.commit()?;

        summary.checked += batch.checked;
        summary.size_mismatches += batch.size_mismatches;
        summary.type_mismatches += batch.type_mismatches;
        summary.missing += batch.not_found.len();
    }

    reporter.on_stage_complete(Stage::SanityCheck);
    summary.duration = start.elapsed();
    info!(
        "Sanity check: {} checked, {} size mismatches, {} type mismatches, {} missing",
        summary.checked, summary.size_mismatches, summary.type_mismatches, summary.missing
    );
    Ok(summary)
}

//! Moving content into the store and removing the copies left behind.
//!
//! Zap runs three phases. Uniques: one representative file per unzapped hash
//! is moved (copied in safe mode) to its store location, and hash and file
//! are marked zapped. Duplicates: every other file of a zapped hash is
//! deleted from disk and marked zapped. Prune: folders emptied by the first
//! two phases are removed. Safe mode copies uniques, marks duplicates without
//! deleting them and never prunes.

use super::layout::ContentStore;
use super::prune::{prune_folders, ClearSummary};
use super::transfer::{copy_or_move, Comparison, TransferMode, TransferOutcome};
use crate::config::AppConfig;
use crate::error::Error;
use crate::orchestrator::TaskOrchestrator;
use crate::progress::{ProgressReporter, Stage};
use crate::storage::models::{DuplicateTotals, ZapTotals};
use crate::storage::{BatchCursor, Database};
use std::fs;
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
pub struct ZapSummary {
    pub totals: ZapTotals,
    pub uniques_zapped: usize,
    /// Duplicates marked zapped, whether or not they were deleted.
    pub duplicates_zapped: usize,
    pub duplicates_removed: usize,
    pub missing: usize,
    pub collisions: usize,
    pub pruned: ClearSummary,
    pub safe_mode: bool,
    pub duration: Duration,
}

impl ZapSummary {
    /// Share of the total size that the store will not need to hold.
    pub fn reduction_percentage(&self) -> f64 {
        reduction_percentage(&self.totals)
    }
}

fn reduction_percentage(totals: &ZapTotals) -> f64 {
    if totals.total_bytes == 0 {
        return 0.0;
    }
    let saved = totals.total_bytes.saturating_sub(totals.unique_bytes);
    saved as f64 / totals.total_bytes as f64 * 100.0
}

#[derive(Default)]
struct UniqueBatch {
    zapped_hashes: Vec<i64>,
    zapped_files: Vec<i64>,
    not_found: Vec<i64>,
    collisions: usize,
}

#[derive(Default)]
struct DuplicateBatch {
    zapped: Vec<i64>,
    removed: usize,
    not_found: Vec<i64>,
}

pub fn zap(
    db: &Database,
    config: &AppConfig,
    store: &ContentStore,
    safe_mode: bool,
    reporter: &dyn ProgressReporter,
) -> Result<ZapSummary, Error> {
    let start = Instant::now();
    let mut summary = ZapSummary {
        safe_mode,
        ..ZapSummary::default()
    };

    copy_uniques(db, config, store, safe_mode, reporter, &mut summary)?;
    remove_duplicates(db, config, safe_mode, reporter, &mut summary)?;
    if safe_mode {
        info!("Safe mode: leaving duplicates and folders in place");
    } else {
        summary.pruned = remove_empty_folders(db, config, reporter)?;
    }

    summary.duration = start.elapsed();
    info!(
        "Zapped {} unique files, removed {} duplicates and {} folders in {:.2}s",
        summary.uniques_zapped,
        summary.duplicates_removed,
        summary.pruned.folders_removed,
        summary.duration.as_secs_f64()
    );
    Ok(summary)
}

fn copy_uniques(
    db: &Database,
    config: &AppConfig,
    store: &ContentStore,
    safe_mode: bool,
    reporter: &dyn ProgressReporter,
    summary: &mut ZapSummary,
) -> Result<(), Error> {
    let totals = db.zap_totals()?;
    summary.totals = totals;
    if totals.hashes == 0 {
        info!("No files to zap. Have the files been hashed and sized?");
        return Ok(());
    }
    let message = format!(
        "Zapping {} unique files ({} bytes) to {}: {} bytes in total, a reduction of {:.2}%",
        totals.hashes,
        totals.unique_bytes,
        store.root().display(),
        totals.total_bytes,
        reduction_percentage(&totals)
    );
    info!("{}", message);
    reporter.on_message(&message);

    store.create_structure()?;
    reporter.on_stage_start(Stage::ZapUniques, totals.hashes as u64);
    let orchestrator = TaskOrchestrator::new(
        config.max_concurrent_file_operations,
        Stage::ZapUniques,
        reporter,
    )?;
    let mode = if safe_mode {
        TransferMode::Copy
    } else {
        TransferMode::Move
    };
    let mut cursor = BatchCursor::new(config.batch_size);

    loop {
        let candidates = db.unique_files_to_zap(&cursor)?;
        if candidates.is_empty() {
            break;
        }
        cursor.advance(candidates.iter().map(|c| c.file_hash_id));
        debug!("Zapping batch of {} unique files", candidates.len());

        let batch = orchestrator.run(candidates, UniqueBatch::default(), |candidate, ctx| {
            let source = &candidate.absolute_path;
            if !source.exists() {
                debug!("{} no longer exists", source.display());
                ctx.lock().not_found.push(candidate.file_id);
                return Ok(());
            }
            let destination = match store.path_for(&candidate.hash) {
                Ok(p) => p,
                Err(e) => {
                    error!("Skipping {}: {}", source.display(), e);
                    return Ok(());
                }
            };
            match copy_or_move(source, &destination, mode, Comparison::Size) {
                Ok(TransferOutcome::Different) => {
                    warn!(
                        "Possible hash collision: {} differs from stored {}",
                        source.display(),
                        destination.display()
                    );
                    ctx.lock().collisions += 1;
                }
                Ok(_) => {
                    let mut batch = ctx.lock();
                    batch.zapped_hashes.push(candidate.file_hash_id);
                    batch.zapped_files.push(candidate.file_id);
                }
                Err(Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                    ctx.lock().not_found.push(candidate.file_id);
                }
                Err(e) => error!("Could not zap {}: {}", source.display(), e),
            }
            Ok(())
        })?;

        let tx = db.transaction()?;
        db.mark_hashes_zapped(&batch.zapped_hashes, true)?;
        db.mark_files_zapped(&batch.zapped_files, true)?;
        db.tombstone_files(&batch.not_found)?;
        tx.commit()?;

        summary.uniques_zapped += batch.zapped_files.len();
        summary.missing += batch.not_found.len();
        summary.collisions += batch.collisions;
    }

    reporter.on_stage_complete(Stage::ZapUniques);
    Ok(())
}

fn remove_duplicates(
    db: &Database,
    config: &AppConfig,
    safe_mode: bool,
    reporter: &dyn ProgressReporter,
    summary: &mut ZapSummary,
) -> Result<(), Error> {
    let DuplicateTotals { files, bytes } = db.duplicate_totals()?;
    if files == 0 {
        debug!("No duplicates to remove");
        return Ok(());
    }
    if safe_mode {
        info!("Marking {} duplicate files ({} bytes) as zapped", files, bytes);
    } else {
        info!("Removing {} duplicate files ({} bytes)", files, bytes);
    }
    reporter.on_stage_start(Stage::ZapDuplicates, files as u64);

    let orchestrator = TaskOrchestrator::new(
        config.max_concurrent_file_operations,
        Stage::ZapDuplicates,
        reporter,
    )?;
    let mut cursor = BatchCursor::new(config.batch_size);

    loop {
        let duplicates = db.duplicate_files_to_remove(&cursor)?;
        if duplicates.is_empty() {
            break;
        }
        cursor.advance(duplicates.iter().map(|d| d.id));

        let batch = orchestrator.run(duplicates, DuplicateBatch::default(), |file, ctx| {
            let result = if safe_mode {
                fs::metadata(&file.absolute_path).map(|_| false)
            } else {
                fs::remove_file(&file.absolute_path).map(|_| true)
            };
            match result {
                Ok(removed) => {
                    let mut batch = ctx.lock();
                    batch.zapped.push(file.id);
                    if removed {
                        batch.removed += 1;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    ctx.lock().not_found.push(file.id)
                }
                Err(e) => error!("Could not remove {}: {}", file.absolute_path.display(), e),
            }
            Ok(())
        })?;

        let tx = db.transaction()?;
        db.mark_files_zapped(&batch.zapped, true)?;
        db.tombstone_files(&batch.not_found)?;
        tx.commit()?;

        summary.duplicates_zapped += batch.zapped.len();
        summary.duplicates_removed += batch.removed;
        summary.missing += batch.not_found.len();
    }

    reporter.on_stage_complete(Stage::ZapDuplicates);
    Ok(())
}

fn remove_empty_folders(
    db: &Database,
    config: &AppConfig,
    reporter: &dyn ProgressReporter,
) -> Result<ClearSummary, Error> {
    let folders: Vec<_> = db
        .zapped_file_paths()?
        .into_iter()
        .filter_map(|p| p.parent().map(|d| d.to_path_buf()))
        .collect();
    let roots = db.root_paths()?;
    info!("Removing empty folders");
    reporter.on_stage_start(Stage::PruneFolders, 0);
    let pruned = prune_folders(folders, &roots, &config.folder_names_to_ignore)?;
    reporter.on_stage_complete(Stage::PruneFolders);
    Ok(pruned)
}

use super::layout::ContentStore;
use super::transfer::{copy_or_move, Comparison, TransferMode, TransferOutcome};
use crate::config::AppConfig;
use crate::error::Error;
use crate::orchestrator::TaskOrchestrator;
use crate::platform::get_path_without_root;
use crate::progress::{ProgressReporter, Stage};
use crate::storage::{BatchCursor, Database};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
pub struct UnzapSummary {
    pub files_restored: usize,
    pub bytes: u64,
    pub missing: usize,
    pub conflicts: usize,
    /// Files whose restore failed; the cause is logged.
    pub failed: usize,
    pub duration: Duration,
}

#[derive(Default)]
struct UnzapBatch {
    restored: usize,
    missing: usize,
    conflicts: usize,
    failed: usize,
}

/// Recreate every zapped file under `destination`, at its original absolute
/// path with the root (and drive) stripped, by copying from the store. The
/// store and the metadata are left unchanged.
pub fn unzap(
    db: &Database,
    config: &AppConfig,
    store: &ContentStore,
    destination: &Path,
    reporter: &dyn ProgressReporter,
) -> Result<UnzapSummary, Error> {
    let start = Instant::now();
    ensure_empty_destination(destination)?;
    if !store.root().is_dir() {
        return Err(Error::PathResolution(store.root().to_path_buf()));
    }

    let totals = db.zapped_file_totals()?;
    info!(
        "Restoring {} files ({} bytes) from {} to {}",
        totals.files,
        totals.bytes,
        store.root().display(),
        destination.display()
    );
    reporter.on_stage_start(Stage::UnZap, totals.files.max(0) as u64);

    let orchestrator =
        TaskOrchestrator::new(config.max_concurrent_file_operations, Stage::UnZap, reporter)?;
    let mut cursor = BatchCursor::new(config.batch_size);
    let mut summary = UnzapSummary {
        bytes: totals.bytes,
        ..UnzapSummary::default()
    };

    loop {
        let files = db.zapped_files_batch(&cursor)?;
        if files.is_empty() {
            break;
        }
        cursor.advance(files.iter().map(|f| f.file_id));
        debug!("Restoring batch of {} files", files.len());

        let batch = orchestrator.run(files, UnzapBatch::default(), |file, ctx| {
            let source = match store.path_for(&file.hash) {
                Ok(p) => p,
                Err(e) => {
                    error!("Cannot restore {}: {}", file.absolute_path.display(), e);
                    ctx.lock().failed += 1;
                    return Ok(());
                }
            };
            if !source.is_file() {
                warn!(
                    "Stored content for {} is missing at {}",
                    file.absolute_path.display(),
                    source.display()
                );
                ctx.lock().missing += 1;
                return Ok(());
            }
            let target = destination.join(get_path_without_root(&file.absolute_path));
            match copy_or_move(&source, &target, TransferMode::Copy, Comparison::Content) {
                Ok(TransferOutcome::Different) => ctx.lock().conflicts += 1,
                Ok(_) => ctx.lock().restored += 1,
                Err(e) => {
                    error!("Could not restore {}: {}", target.display(), e);
                    ctx.lock().failed += 1;
                }
            }
            Ok(())
        })?;

        summary.files_restored += batch.restored;
        summary.missing += batch.missing;
        summary.conflicts += batch.conflicts;
        summary.failed += batch.failed;
    }

    reporter.on_stage_complete(Stage::UnZap);
    summary.duration = start.elapsed();
    info!(
        "Restored {} files ({} missing from the store, {} failed) in {:.2}s",
        summary.files_restored,
        summary.missing,
        summary.failed,
        summary.duration.as_secs_f64()
    );
    Ok(summary)
}

/// The destination must be absent or an empty directory.
fn ensure_empty_destination(destination: &Path) -> Result<(), Error> {
    if !destination.exists() {
        fs::create_dir_all(destination)?;
        return Ok(());
    }
    if !destination.is_dir() || fs::read_dir(destination)?.next().is_some() {
        return Err(Error::DestinationNotEmpty(destination.to_path_buf()));
    }
    Ok(())
}

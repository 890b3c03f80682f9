use super::layout::ContentStore;
use super::transfer::{copy_or_move, Comparison, TransferMode, TransferOutcome};
use crate::config::AppConfig;
use crate::error::Error;
use crate::orchestrator::TaskOrchestrator;
use crate::progress::{ProgressReporter, Stage};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{error, info};

#[derive(Debug, Default)]
pub struct MergeSummary {
    pub moved: usize,
    pub identical: usize,
    pub conflicts: usize,
    pub duration: Duration,
}

/// Move the contents of one store into another, bucket by bucket. Identical
/// files collapse into the destination's copy; files that differ stay in the
/// source.
pub fn merge_zaps(
    source: &Path,
    destination: &Path,
    config: &AppConfig,
    reporter: &dyn ProgressReporter,
) -> Result<MergeSummary, Error> {
    let start = Instant::now();
    for dir in [source, destination] {
        if !dir.is_dir() {
            return Err(Error::PathResolution(dir.to_path_buf()));
        }
    }
    let from = ContentStore::new(source);
    let to = ContentStore::new(destination);
    info!(
        "Merging zaps from {} into {}",
        source.display(),
        destination.display()
    );

    let buckets: Vec<(String, String)> = ContentStore::buckets()
        .filter(|(a, b)| from.bucket_path(a, b).is_dir())
        .collect();
    reporter.on_stage_start(Stage::MergeZaps, buckets.len() as u64);

    let orchestrator = TaskOrchestrator::new(
        config.max_concurrent_file_operations,
        Stage::MergeZaps,
        reporter,
    )?;
    let mut summary = orchestrator.run(buckets, MergeSummary::default(), |(a, b), ctx| {
        let source_bucket = from.bucket_path(&a, &b);
        let destination_bucket = to.bucket_path(&a, &b);
        for entry in fs::read_dir(&source_bucket)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let target = destination_bucket.join(entry.file_name());
            match copy_or_move(&entry.path(), &target, TransferMode::Move, Comparison::Size) {
                Ok(TransferOutcome::Transferred) => ctx.lock().moved += 1,
                Ok(TransferOutcome::AlreadyPresent) => ctx.lock().identical += 1,
                Ok(TransferOutcome::Different) => ctx.lock().conflicts += 1,
                Err(e) => error!("Could not merge {}: {}", entry.path().display(), e),
            }
        }
        Ok(())
    })?;

    reporter.on_stage_complete(Stage::MergeZaps);
    summary.duration = start.elapsed();
    info!(
        "Merged {} files ({} already present, {} conflicts) in {:.2}s",
        summary.moved,
        summary.identical,
        summary.conflicts,
        summary.duration.as_secs_f64()
    );
    Ok(summary)
}

use crate::config::AppConfig;
use crate::error::Error;
use crate::orchestrator::TaskOrchestrator;
use crate::progress::{ProgressReporter, Stage};
use crate::storage::{BatchCursor, Database};
use std::fs;
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

#[derive(Debug, Default)]
pub struct SizeSummary {
    pub hashes_sized: usize,
    pub files_updated: usize,
    pub missing: usize,
    pub duration: Duration,
}

#[derive(Default)]
struct SizeBatch {
    sizes: Vec<(i64, i64)>,
    not_found: Vec<i64>,
}

/// Fill in the size of every hash that has none, reading it from one member
/// file, then copy hash sizes down to the files.
pub fn size_files(
    db: &Database,
    config: &AppConfig,
    reporter: &dyn ProgressReporter,
) -> Result<SizeSummary, Error> {
    let start = Instant::now();
    let total = db.count_unsized_hashes()?;
    info!("Sizing {} hashes", total);
    reporter.on_stage_start(Stage::Size, total.max(0) as u64);

    let orchestrator =
        TaskOrchestrator::new(config.max_concurrent_file_operations, Stage::Size, reporter)?;
    let mut cursor = BatchCursor::new(config.batch_size);
    let mut summary = SizeSummary::default();

    loop {
        let members = db.unsized_hashes_batch(&cursor)?;
        if members.is_empty() {
            break;
        }
        cursor.advance(members.iter().map(|m| m.file_hash_id));
        debug!("Sizing batch of {} hashes", members.len());

        let batch = orchestrator.run(members, SizeBatch::default(), |member, ctx| {
            let path = &member.absolute_path;
            match fs::metadata(path) {
                Ok(metadata) => match i64::try_from(metadata.len()) {
                    Ok(size) => ctx.lock().sizes.push((member.file_hash_id, size)),
                    Err(_) => error!("Size of {} is out of range", path.display()),
                },
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    ctx.lock().not_found.push(member.file_id)
                }
                Err(e) => error!("Could not stat {}: {}", path.display(), e),
            }
            Ok(())
        })?;

        let tx = db.transaction()?;
        for (file_hash_id, size) in &batch.sizes {
            db.set_hash_size(*file_hash_id, *size)?;
        }
        db.tombstone_files(&batch.not_found)?;
        tx.commit()?;

        summary.hashes_sized += batch.sizes.len();
        summary.missing += batch.not_found.len();
    }

    summary.files_updated = db.propagate_sizes()?;
    reporter.on_stage_complete(Stage::Size);
    summary.duration = start.elapsed();
    info!(
        "Sized {} hashes and {} files in {:.2}s",
        summary.hashes_sized,
        summary.files_updated,
        summary.duration.as_secs_f64()
    );
    Ok(summary)
}

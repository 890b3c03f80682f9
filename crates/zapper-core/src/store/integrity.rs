use super::layout::ContentStore;
use crate::config::AppConfig;
use crate::error::Error;
use crate::orchestrator::TaskOrchestrator;
use crate::progress::{ProgressReporter, Stage};
use crate::storage::Database;
use std::fs;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct IntegritySummary {
    pub checked: usize,
    pub missing: usize,
    pub size_mismatches: usize,
    pub unmarked: usize,
    pub duration: Duration,
}

#[derive(Default)]
struct IntegrityBatch {
    missing: Vec<String>,
    size_mismatches: Vec<String>,
}

/// Verify that every hash marked zapped has a stored file of the recorded
/// size. Hashes that fail are marked not zapped so a later zap stores them
/// again.
pub fn integrity(
    db: &Database,
    config: &AppConfig,
    store: &ContentStore,
    reporter: &dyn ProgressReporter,
) -> Result<IntegritySummary, Error> {
    let start = Instant::now();
    let hashes = db.zapped_hashes()?;
    info!(
        "Checking {} stored hashes in {}",
        hashes.len(),
        store.root().display()
    );
    reporter.on_stage_start(Stage::Integrity, hashes.len() as u64);

    let orchestrator = TaskOrchestrator::new(
        config.max_concurrent_file_operations,
        Stage::Integrity,
        reporter,
    )?;
    let mut summary = IntegritySummary {
        checked: hashes.len(),
        ..IntegritySummary::default()
    };

    for chunk in hashes.chunks(config.batch_size) {
        let tasks = chunk.to_vec();
        let batch = orchestrator.run(tasks, IntegrityBatch::default(), |(hash, size), ctx| {
            let path = match store.path_for(&hash) {
                Ok(p) => p,
                Err(e) => {
                    warn!("{}", e);
                    ctx.lock().missing.push(hash);
                    return Ok(());
                }
            };
            match fs::metadata(&path) {
                Ok(m) if m.len() as i64 == size => {}
                Ok(m) => {
                    warn!(
                        "{} is {} bytes, expected {}",
                        path.display(),
                        m.len(),
                        size
                    );
                    ctx.lock().size_mismatches.push(hash);
                }
                Err(_) => {
                    warn!("{} is missing from the store", path.display());
                    ctx.lock().missing.push(hash);
                }
            }
            Ok(())
        })?;

        let failed: Vec<String> = batch
            .missing
            .iter()
            .chain(batch.size_mismatches.iter())
            .cloned()
            .collect();
        let tx = db.transaction()?;
        summary.unmarked += db.unmark_hashes_zapped_by_hash(&failed)?;
        tx.commit()?;

        summary.missing += batch.missing.len();
        summary.size_mismatches += batch.size_mismatches.len();
    }

    reporter.on_stage_complete(Stage::Integrity);
    summary.duration = start.elapsed();
    info!(
        "Integrity: {} checked, {} missing, {} size mismatches",
        summary.checked, summary.missing, summary.size_mismatches
    );
    Ok(summary)
}

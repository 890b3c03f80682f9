use super::file_type::TypeDetector;
use crate::config::AppConfig;
use crate::error::Error;
use crate::orchestrator::TaskOrchestrator;
use crate::progress::{ProgressReporter, Stage};
use crate::storage::{BatchCursor, Database};
use ahash::AHashMap;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

#[derive(Debug, Default)]
pub struct TypeSummary {
    pub hashes_typed: usize,
    pub new_types: usize,
    pub files_updated: usize,
    pub missing: usize,
    pub duration: Duration,
}

#[derive(Default)]
struct TypeBatch {
    types: Vec<(i64, String)>,
    not_found: Vec<i64>,
}

/// Determine the MIME type of every hash that has none from one member file,
/// then copy hash types down to the files.
pub fn type_files(
    db: &Database,
    config: &AppConfig,
    detector: &dyn TypeDetector,
    reporter: &dyn ProgressReporter,
) -> Result<TypeSummary, Error> {
    let start = Instant::now();
    let total = db.count_untyped_hashes()?;
    info!("Typing {} hashes", total);
    reporter.on_stage_start(Stage::Type, total.max(0) as u64);

    let orchestrator =
        TaskOrchestrator::new(config.max_concurrent_file_operations, Stage::Type, reporter)?;
    let mut known: AHashMap<String, i64> = db
        .file_types()?
        .into_iter()
        .map(|t| (t.mime_type, t.id))
        .collect();
    let mut cursor = BatchCursor::new(config.batch_size);
    let mut summary = TypeSummary::default();

    loop {
        let members = db.untyped_hashes_batch(&cursor)?;
        if members.is_empty() {
            break;
        }
        cursor.advance(members.iter().map(|m| m.file_hash_id));
        debug!("Typing batch of {} hashes", members.len());

        let batch = orchestrator.run(members, TypeBatch::default(), |member, ctx| {
            let path = &member.absolute_path;
            if !path.exists() {
                ctx.lock().not_found.push(member.file_id);
                return Ok(());
            }
            match detector.detect(path) {
                Ok(mime) => ctx.lock().types.push((member.file_hash_id, mime)),
                Err(e) => error!("Could not determine type of {}: {}", path.display(), e),
            }
            Ok(())
        })?;

        let tx = db.transaction()?;
        for (_, mime) in &batch.types {
            if !known.contains_key(mime) {
                db.insert_file_type(mime)?;
                let id = db
                    .find_file_type_id(mime)?
                    .ok_or_else(|| Error::FileTypeUnresolved(mime.clone()))?;
                known.insert(mime.clone(), id);
                summary.new_types += 1;
            }
        }
        for (file_hash_id, mime) in &batch.types {
            let type_id = known
                .get(mime)
                .copied()
                .ok_or_else(|| Error::FileTypeUnresolved(mime.clone()))?;
            db.set_hash_type(*file_hash_id, type_id)?;
        }
        db.tombstone_files(&batch.not_found)?;
        tx.commit()?;

        summary.hashes_typed += batch.types.len();
        summary.missing += batch.not_found.len();
    }

    summary.files_updated = db.propagate_types()?;
    reporter.on_stage_complete(Stage::Type);
    summary.duration = start.elapsed();
    info!(
        "Typed {} hashes and {} files ({} new types) in {:.2}s",
        summary.hashes_typed,
        summary.files_updated,
        summary.new_types,
        summary.duration.as_secs_f64()
    );
    Ok(summary)
}

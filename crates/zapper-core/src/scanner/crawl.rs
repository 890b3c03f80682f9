use crate::config::AppConfig;
use crate::error::Error;
use crate::progress::{ProgressReporter, Stage};
use crate::storage::Database;
use ahash::AHashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug)]
pub struct CrawlSummary {
    pub root: PathBuf,
    pub folders: usize,
    pub files: usize,
    pub ignored: usize,
    pub duration: Duration,
}

/// Index every folder and file under `root` in a single transaction.
///
/// The root is stored with its absolute path as name and level 0; every
/// descendant stores only its own name and its depth below the root. Folders
/// named in `folder_names_to_ignore` are skipped together with their subtree,
/// files named in `file_names_to_ignore` are skipped. Symbolic links are not
/// followed and not indexed. Entries whose names are not valid UTF-8 cannot be
/// stored and are skipped as ignored, folders together with their subtree.
///
/// Any error reading the tree aborts the crawl and nothing is recorded.
pub fn crawl(
    db: &Database,
    config: &AppConfig,
    root: &Path,
    reporter: &dyn ProgressReporter,
) -> Result<CrawlSummary, Error> {
    let start = Instant::now();
    let root = fs::canonicalize(root).map_err(|_| Error::PathResolution(root.to_path_buf()))?;
    if !root.is_dir() {
        return Err(Error::PathResolution(root));
    }
    let Some(root_name) = root.to_str().map(str::to_owned) else {
        return Err(Error::PathResolution(root));
    };
    if db.find_root_path(&root_name)?.is_some() {
        return Err(Error::AlreadyIndexed(root));
    }

    info!("Crawling {}", root.display());
    reporter.on_stage_start(Stage::Crawl, 0);

    let tx = db.transaction()?;
    let root_id = db.insert_root_path(&root_name)?;
    let mut path_ids: AHashMap<PathBuf, i64> = AHashMap::new();
    path_ids.insert(root.clone(), root_id);

    let mut summary = CrawlSummary {
        root: root.clone(),
        folders: 0,
        files: 0,
        ignored: 0,
        duration: Duration::ZERO,
    };

    let mut walker = WalkDir::new(&root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && config.is_folder_ignored(&entry.file_name().to_string_lossy()))
        });

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;

        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            warn!("Skipping non UTF-8 name {}", entry.path().display());
            summary.ignored += 1;
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        };
        let level = entry.depth() as i64;
        let parent_id = match entry.path().parent().and_then(|p| path_ids.get(p)) {
            Some(id) => *id,
            None => {
                warn!("No indexed parent for {}", entry.path().display());
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            let id = db.insert_path(parent_id, &name, level)?;
            path_ids.insert(entry.into_path(), id);
            summary.folders += 1;
        } else if file_type.is_file() {
            if config.is_file_ignored(&name) {
                debug!("Ignoring file {}", entry.path().display());
                summary.ignored += 1;
                continue;
            }
            db.insert_file(parent_id, &name, level)?;
            summary.files += 1;
        } else {
            debug!("Skipping non-regular entry {}", entry.path().display());
            continue;
        }
        reporter.on_task_complete(Stage::Crawl);
    }

    tx.commit()?;
    reporter.on_stage_complete(Stage::Crawl);

    summary.duration = start.elapsed();
    info!(
        "Crawled {} folders and {} files under {} in {:.2}s",
        summary.folders,
        summary.files,
        root.display(),
        summary.duration.as_secs_f64()
    );
    Ok(summary)
}

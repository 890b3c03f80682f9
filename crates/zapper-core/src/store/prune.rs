use crate::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Files that do not count as content when deciding whether a folder is empty.
const JUNK_FILE_NAMES: &[&str] = &[".DS_Store"];

#[derive(Debug, Default, Clone, Copy)]
pub struct ClearSummary {
    pub folders_removed: usize,
    pub junk_removed: usize,
}

fn is_junk(name: &str) -> bool {
    JUNK_FILE_NAMES.contains(&name)
}

fn is_ignored(name: &str, folder_names_to_ignore: &[String]) -> bool {
    folder_names_to_ignore.iter().any(|i| i == name)
}

/// Remove every folder under `path`, `path` included, that holds no files
/// other than junk. A missing path is not an error.
pub fn clear_empty_folders(path: &Path) -> Result<ClearSummary, Error> {
    let mut summary = ClearSummary::default();
    match fs::metadata(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(summary),
        Err(e) => return Err(e.into()),
        Ok(m) if !m.is_dir() => return Err(Error::PathResolution(path.to_path_buf())),
        Ok(_) => {}
    }
    clear_folder(path, true, &[], &mut summary)?;
    info!(
        "Removed {} empty folders under {}",
        summary.folders_removed,
        path.display()
    );
    Ok(summary)
}

/// Returns the number of entries left in the subtree that keep it alive:
/// non-junk files, and folders named in `ignore`, which are never entered.
fn clear_folder(
    path: &Path,
    remove_self: bool,
    ignore: &[String],
    summary: &mut ClearSummary,
) -> io::Result<usize> {
    let mut file_count = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let entry_path = entry.path();
        if entry.file_type()?.is_dir() {
            if is_ignored(&entry.file_name().to_string_lossy(), ignore) {
                debug!("Leaving ignored folder {}", entry_path.display());
                file_count += 1;
                continue;
            }
            file_count += clear_folder(&entry_path, true, ignore, summary)?;
        } else if is_junk(&entry.file_name().to_string_lossy()) {
            fs::remove_file(&entry_path)?;
            summary.junk_removed += 1;
        } else {
            file_count += 1;
        }
    }
    if file_count == 0 && remove_self {
        fs::remove_dir(path)?;
        debug!("Removed empty folder {}", path.display());
        summary.folders_removed += 1;
    }
    Ok(file_count)
}

/// Remove `dir` if it holds nothing but junk. Returns whether it was removed.
fn remove_if_empty(dir: &Path, summary: &mut ClearSummary) -> io::Result<bool> {
    let entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    let only_junk = entries.iter().all(|e| {
        e.file_type().map(|t| t.is_file()).unwrap_or(false)
            && is_junk(&e.file_name().to_string_lossy())
    });
    if !only_junk {
        return Ok(false);
    }
    for entry in entries {
        fs::remove_file(entry.path())?;
        summary.junk_removed += 1;
    }
    fs::remove_dir(dir)?;
    summary.folders_removed += 1;
    Ok(true)
}

/// Clean up the folders zapped files were taken from.
///
/// Each folder is cleared of empty subfolders, then its ancestors are removed
/// while they are empty, deepest folders first. A crawl root is never
/// removed, and folders outside every root are not touched.
pub fn prune_folders(
    mut folders: Vec<PathBuf>,
    roots: &[PathBuf],
    folder_names_to_ignore: &[String],
) -> Result<ClearSummary, Error> {
    folders.retain(|f| {
        f.file_name()
            .map(|n| !is_ignored(&n.to_string_lossy(), folder_names_to_ignore))
            .unwrap_or(true)
    });
    folders.sort_by(|a, b| {
        b.components()
            .count()
            .cmp(&a.components().count())
            .then_with(|| a.cmp(b))
    });
    folders.dedup();

    let mut summary = ClearSummary::default();
    for folder in folders {
        if !folder.is_dir() {
            continue;
        }
        let Some(root) = roots
            .iter()
            .filter(|r| folder.starts_with(r))
            .max_by_key(|r| r.components().count())
        else {
            warn!("{} is not under any crawl root, not pruning", folder.display());
            continue;
        };

        let is_root = folder == *root;
        if clear_folder(&folder, !is_root, folder_names_to_ignore, &mut summary)? > 0 || is_root {
            continue;
        }

        let mut current = folder.parent();
        while let Some(dir) = current {
            if dir == root.as_path() || !dir.starts_with(root) {
                break;
            }
            if !remove_if_empty(dir, &mut summary)? {
                break;
            }
            current = dir.parent();
        }
    }
    Ok(summary)
}

//! Absolute path reconstruction.
//!
//! Each `path` row stores only its local segment, so absolute paths are
//! rebuilt by walking down from the crawl roots and joining names. The walk
//! only follows eligible paths: a file below an ignored or tombstoned
//! directory is never reached and drops out of every query that joins
//! `file_path`.

use super::models::PathRecord;
use super::models::RecordStatus;
use super::sqlite::Database;
use rusqlite::{params, OptionalExtension, Result};
use std::path::{PathBuf, MAIN_SEPARATOR_STR};

/// `file_path(file_id, absolute_path)`, created per connection so the
/// separator matches the running platform.
pub(crate) fn file_path_view_sql() -> String {
    format!(
        "CREATE TEMP VIEW IF NOT EXISTS file_path AS \
         WITH RECURSIVE path_full(id, full) AS ( \
             SELECT id, name FROM eligible_path WHERE parent_path_id IS NULL \
             UNION ALL \
             SELECT p.id, \
                    CASE WHEN substr(pf.full, -1) = '{sep}' THEN pf.full || p.name \
                         ELSE pf.full || '{sep}' || p.name END \
             FROM eligible_path p \
             JOIN path_full pf ON p.parent_path_id = pf.id \
         ) \
         SELECT f.id AS file_id, \
                CASE WHEN substr(pf.full, -1) = '{sep}' THEN pf.full || f.name \
                     ELSE pf.full || '{sep}' || f.name END AS absolute_path \
         FROM eligible_file f \
         JOIN path_full pf ON pf.id = f.path_id;",
        sep = MAIN_SEPARATOR_STR,
    )
}

impl Database {
    /// Reconstruct the absolute path of one file, `None` when the file or any
    /// ancestor is not eligible.
    pub fn absolute_path_of(&self, file_id: i64) -> Result<Option<PathBuf>> {
        let path: Option<String> = self
            .connection()
            .query_row(
                "SELECT absolute_path FROM file_path WHERE file_id = ?1",
                params![file_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(path.map(PathBuf::from))
    }

    /// Eligible crawl roots, as absolute paths.
    pub fn root_paths(&self) -> Result<Vec<PathBuf>> {
        let mut stmt = self.connection().prepare(
            "SELECT name FROM eligible_path \
             WHERE parent_path_id IS NULL AND level = 0 \
             ORDER BY id",
        )?;
        let roots = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|r| r.map(PathBuf::from))
            .collect::<Result<Vec<_>>>()?;
        Ok(roots)
    }

    pub fn find_root_path(&self, absolute_path: &str) -> Result<Option<i64>> {
        self.connection()
            .query_row(
                "SELECT id FROM path \
                 WHERE parent_path_id IS NULL AND level = 0 AND name = ?1 \
                 ORDER BY id LIMIT 1",
                params![absolute_path],
                |row| row.get(0),
            )
            .optional()
    }

    pub fn get_path(&self, id: i64) -> Result<Option<PathRecord>> {
        self.connection()
            .query_row(
                "SELECT id, parent_path_id, name, level, ignored, deleted_at \
                 FROM path WHERE id = ?1",
                params![id],
                |row| {
                    let deleted_at: Option<String> = row.get(5)?;
                    Ok(PathRecord {
                        id: row.get(0)?,
                        parent_path_id: row.get(1)?,
                        name: row.get(2)?,
                        level: row.get(3)?,
                        status: RecordStatus::from_columns(row.get(4)?, deleted_at.as_deref()),
                    })
                },
            )
            .optional()
    }

    /// Flag a directory (and so every file beneath it) as ignored.
    pub fn set_path_ignored(&self, id: i64, ignored: bool) -> Result<usize> {
        self.connection().execute(
            "UPDATE path SET ignored = ?1 WHERE id = ?2",
            params![ignored, id],
        )
    }
}

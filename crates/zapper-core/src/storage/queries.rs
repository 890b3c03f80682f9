use super::batch::BatchCursor;
use super::models::*;
use super::sqlite::Database;
use rusqlite::{params, params_from_iter, OptionalExtension, Result, Row};
use std::path::PathBuf;
use tracing::debug;

fn id_and_path(row: &Row<'_>) -> Result<IdAndPath> {
    Ok(IdAndPath {
        id: row.get(0)?,
        absolute_path: PathBuf::from(row.get::<_, String>(1)?),
    })
}

fn hash_member(row: &Row<'_>) -> Result<HashMember> {
    Ok(HashMember {
        file_hash_id: row.get(0)?,
        hash: row.get(1)?,
        file_id: row.get(2)?,
        absolute_path: PathBuf::from(row.get::<_, String>(3)?),
    })
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

impl Database {
    // ── Crawl ────────────────────────────────────────────────────

    pub fn insert_root_path(&self, absolute_path: &str) -> Result<i64> {
        self.connection().execute(
            "INSERT INTO path (parent_path_id, name, level) VALUES (NULL, ?1, 0)",
            params![absolute_path],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    pub fn insert_path(&self, parent_path_id: i64, name: &str, level: i64) -> Result<i64> {
        let mut stmt = self.connection().prepare_cached(
            "INSERT INTO path (parent_path_id, name, level) VALUES (?1, ?2, ?3)",
        )?;
        stmt.execute(params![parent_path_id, name, level])?;
        Ok(self.connection().last_insert_rowid())
    }

    pub fn insert_file(&self, path_id: i64, name: &str, level: i64) -> Result<i64> {
        let mut stmt = self.connection().prepare_cached(
            "INSERT INTO file (path_id, name, level) VALUES (?1, ?2, ?3)",
        )?;
        stmt.execute(params![path_id, name, level])?;
        Ok(self.connection().last_insert_rowid())
    }

    pub fn get_file(&self, id: i64) -> Result<Option<FileRecord>> {
        self.connection()
            .query_row(
                "SELECT id, path_id, name, level, file_hash_id, size, file_type_id, zapped, \
                        ignored, deleted_at \
                 FROM file WHERE id = ?1",
                params![id],
                |row| {
                    let deleted_at: Option<String> = row.get(9)?;
                    Ok(FileRecord {
                        id: row.get(0)?,
                        path_id: row.get(1)?,
                        name: row.get(2)?,
                        level: row.get(3)?,
                        file_hash_id: row.get(4)?,
                        size: row.get(5)?,
                        file_type_id: row.get(6)?,
                        zapped: row.get(7)?,
                        status: RecordStatus::from_columns(row.get(8)?, deleted_at.as_deref()),
                    })
                },
            )
            .optional()
    }

    /// Ids of every eligible file, in id order.
    pub fn eligible_file_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self
            .connection()
            .prepare("SELECT id FROM eligible_file ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>>>()?;
        Ok(ids)
    }

    // ── Tombstones ───────────────────────────────────────────────

    /// Soft-delete files found missing on disk.
    pub fn tombstone_files(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let now = chrono::Utc::now().to_rfc3339();
        let mut count = 0;
        for chunk in ids.chunks(500) {
            let sql = format!(
                "UPDATE file SET deleted_at = ? WHERE deleted_at IS NULL AND id IN ({})",
                placeholders(chunk.len())
            );
            let values = std::iter::once(rusqlite::types::Value::Text(now.clone()))
                .chain(chunk.iter().map(|id| rusqlite::types::Value::Integer(*id)));
            count += self.connection().execute(&sql, params_from_iter(values))?;
        }
        debug!("Tombstoned {} files", count);
        Ok(count)
    }

    /// Hard-delete tombstoned files, then tombstoned paths nothing references.
    pub fn purge_tombstones(&self) -> Result<(usize, usize)> {
        let files = self
            .connection()
            .execute("DELETE FROM file WHERE deleted_at IS NOT NULL", [])?;
        let paths = self.connection().execute(
            "DELETE FROM path \
             WHERE deleted_at IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM file f WHERE f.path_id = path.id) \
             AND NOT EXISTS (SELECT 1 FROM path c WHERE c.parent_path_id = path.id)",
            [],
        )?;
        Ok((files, paths))
    }

    // ── Hashing ──────────────────────────────────────────────────

    pub fn count_unhashed_files(&self) -> Result<i64> {
        self.connection().query_row(
            "SELECT COUNT(*) FROM eligible_file WHERE file_hash_id IS NULL",
            [],
            |row| row.get(0),
        )
    }

    pub fn unhashed_files_batch(&self, cursor: &BatchCursor) -> Result<Vec<IdAndPath>> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT f.id, fp.absolute_path \
             FROM eligible_file f \
             JOIN file_path fp ON fp.file_id = f.id \
             WHERE f.file_hash_id IS NULL \
             AND f.id > ?1 \
             ORDER BY f.id \
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![cursor.last_id(), cursor.limit()], id_and_path)?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every committed hash, with its type if known.
    pub fn known_hashes(&self) -> Result<Vec<KnownHash>> {
        let mut stmt = self.connection().prepare(
            "SELECT fh.id, fh.hash, fh.size, fh.file_type_id, ft.type \
             FROM file_hash fh \
             LEFT JOIN file_type ft ON fh.file_type_id = ft.id \
             ORDER BY fh.id",
        )?;
        let hashes = stmt
            .query_map([], |row| {
                Ok(KnownHash {
                    id: row.get(0)?,
                    hash: row.get(1)?,
                    size: row.get(2)?,
                    file_type_id: row.get(3)?,
                    file_type: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(hashes)
    }

    pub fn file_types(&self) -> Result<Vec<FileTypeRecord>> {
        let mut stmt = self
            .connection()
            .prepare("SELECT id, type FROM file_type ORDER BY id")?;
        let types = stmt
            .query_map([], |row| {
                Ok(FileTypeRecord {
                    id: row.get(0)?,
                    mime_type: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(types)
    }

    pub fn insert_file_type(&self, mime_type: &str) -> Result<()> {
        self.connection().execute(
            "INSERT INTO file_type (type) VALUES (?1) ON CONFLICT(type) DO NOTHING",
            params![mime_type],
        )?;
        Ok(())
    }

    pub fn find_file_type_id(&self, mime_type: &str) -> Result<Option<i64>> {
        self.connection()
            .query_row(
                "SELECT id FROM file_type WHERE type = ?1",
                params![mime_type],
                |row| row.get(0),
            )
            .optional()
    }

    /// Returns true when a new row was created.
    pub fn insert_file_hash(
        &self,
        hash: &str,
        size: Option<i64>,
        file_type_id: Option<i64>,
    ) -> Result<bool> {
        let inserted = self.connection().execute(
            "INSERT INTO file_hash (hash, size, file_type_id) VALUES (?1, ?2, ?3) \
             ON CONFLICT(hash) DO NOTHING",
            params![hash, size, file_type_id],
        )?;
        Ok(inserted > 0)
    }

    pub fn find_file_hash_id(&self, hash: &str) -> Result<Option<i64>> {
        self.connection()
            .query_row(
                "SELECT id FROM file_hash WHERE hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()
    }

    pub fn get_file_hash(&self, id: i64) -> Result<Option<FileHashRecord>> {
        self.connection()
            .query_row(
                "SELECT id, hash, size, file_type_id, ignored, zapped FROM file_hash WHERE id = ?1",
                params![id],
                |row| {
                    Ok(FileHashRecord {
                        id: row.get(0)?,
                        hash: row.get(1)?,
                        size: row.get(2)?,
                        file_type_id: row.get(3)?,
                        ignored: row.get(4)?,
                        zapped: row.get(5)?,
                    })
                },
            )
            .optional()
    }

    /// Attach a file to its hash and copy the hash-level attributes down.
    pub fn set_file_hash(
        &self,
        file_id: i64,
        file_hash_id: i64,
        size: Option<i64>,
        file_type_id: Option<i64>,
    ) -> Result<usize> {
        let mut stmt = self.connection().prepare_cached(
            "UPDATE file SET file_hash_id = ?1, size = ?2, file_type_id = ?3 WHERE id = ?4",
        )?;
        stmt.execute(params![file_hash_id, size, file_type_id, file_id])
    }

    // ── Sizing and typing ────────────────────────────────────────

    pub fn count_unsized_hashes(&self) -> Result<i64> {
        self.connection().query_row(
            "SELECT COUNT(*) FROM file_hash WHERE size IS NULL AND ignored = 0",
            [],
            |row| row.get(0),
        )
    }

    pub fn count_untyped_hashes(&self) -> Result<i64> {
        self.connection().query_row(
            "SELECT COUNT(*) FROM file_hash WHERE file_type_id IS NULL AND ignored = 0",
            [],
            |row| row.get(0),
        )
    }

    /// Hashes missing `column`, each paired with its lowest-id resolvable
    /// member file.
    fn hashes_missing_batch(&self, column: &str, cursor: &BatchCursor) -> Result<Vec<HashMember>> {
        let sql = format!(
            "SELECT fh.id, fh.hash, rep.file_id, fp.absolute_path \
             FROM file_hash fh \
             JOIN ( \
                 SELECT f.file_hash_id, MIN(f.id) AS file_id \
                 FROM eligible_file f \
                 JOIN file_path fp ON fp.file_id = f.id \
                 WHERE f.file_hash_id IS NOT NULL \
                 GROUP BY f.file_hash_id \
             ) rep ON rep.file_hash_id = fh.id \
             JOIN file_path fp ON fp.file_id = rep.file_id \
             WHERE fh.{} IS NULL \
             AND fh.ignored = 0 \
             AND fh.id > ?1 \
             ORDER BY fh.id \
             LIMIT ?2",
            column
        );
        let mut stmt = self.connection().prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![cursor.last_id(), cursor.limit()], hash_member)?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn unsized_hashes_batch(&self, cursor: &BatchCursor) -> Result<Vec<HashMember>> {
        self.hashes_missing_batch("size", cursor)
    }

    pub fn untyped_hashes_batch(&self, cursor: &BatchCursor) -> Result<Vec<HashMember>> {
        self.hashes_missing_batch("file_type_id", cursor)
    }

    pub fn set_hash_size(&self, file_hash_id: i64, size: i64) -> Result<usize> {
        let mut stmt = self
            .connection()
            .prepare_cached("UPDATE file_hash SET size = ?1 WHERE id = ?2")?;
        stmt.execute(params![size, file_hash_id])
    }

    pub fn set_hash_type(&self, file_hash_id: i64, file_type_id: i64) -> Result<usize> {
        let mut stmt = self
            .connection()
            .prepare_cached("UPDATE file_hash SET file_type_id = ?1 WHERE id = ?2")?;
        stmt.execute(params![file_type_id, file_hash_id])
    }

    pub fn set_hash_size_if_missing(&self, file_hash_id: i64, size: i64) -> Result<usize> {
        let mut stmt = self.connection().prepare_cached(
            "UPDATE file_hash SET size = ?1 WHERE id = ?2 AND size IS NULL",
        )?;
        stmt.execute(params![size, file_hash_id])
    }

    pub fn set_hash_type_if_missing(&self, file_hash_id: i64, file_type_id: i64) -> Result<usize> {
        let mut stmt = self.connection().prepare_cached(
            "UPDATE file_hash SET file_type_id = ?1 WHERE id = ?2 AND file_type_id IS NULL",
        )?;
        stmt.execute(params![file_type_id, file_hash_id])
    }

    /// Copy hash sizes down to files that do not have one yet.
    pub fn propagate_sizes(&self) -> Result<usize> {
        self.connection().execute(
            "UPDATE file SET size = ( \
                 SELECT fh.size FROM file_hash fh WHERE fh.id = file.file_hash_id \
             ) \
             WHERE file_hash_id IS NOT NULL \
             AND size IS NULL \
             AND EXISTS ( \
                 SELECT 1 FROM file_hash fh WHERE fh.id = file.file_hash_id AND fh.size IS NOT NULL \
             )",
            [],
        )
    }

    /// Copy hash types down to files that do not have one yet.
    pub fn propagate_types(&self) -> Result<usize> {
        self.connection().execute(
            "UPDATE file SET file_type_id = ( \
                 SELECT fh.file_type_id FROM file_hash fh WHERE fh.id = file.file_hash_id \
             ) \
             WHERE file_hash_id IS NOT NULL \
             AND file_type_id IS NULL \
             AND EXISTS ( \
                 SELECT 1 FROM file_hash fh \
                 WHERE fh.id = file.file_hash_id AND fh.file_type_id IS NOT NULL \
             )",
            [],
        )
    }

    // ── Duplicate hash sanity check ──────────────────────────────

    /// Query yielding ids of eligible files whose hash is shared with at least
    /// one other eligible file.
    pub fn shared_hash_file_ids_sql() -> &'static str {
        "SELECT f.id AS id \
         FROM eligible_file f \
         WHERE f.file_hash_id IN ( \
             SELECT file_hash_id FROM eligible_file \
             WHERE file_hash_id IS NOT NULL \
             GROUP BY file_hash_id \
             HAVING COUNT(*) > 1 \
         )"
    }

    pub fn sanity_rows(&self, file_ids: &[i64]) -> Result<Vec<SanityRow>> {
        if file_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT f.id, fh.hash, fh.size, ft.type, fp.absolute_path \
             FROM eligible_file f \
             JOIN file_path fp ON fp.file_id = f.id \
             JOIN file_hash fh ON f.file_hash_id = fh.id \
             LEFT JOIN file_type ft ON fh.file_type_id = ft.id \
             WHERE f.id IN ({}) \
             ORDER BY f.id",
            placeholders(file_ids.len())
        );
        let mut stmt = self.connection().prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(file_ids.iter()), |row| {
                Ok(SanityRow {
                    file_id: row.get(0)?,
                    hash: row.get(1)?,
                    size: row.get(2)?,
                    file_type: row.get(3)?,
                    absolute_path: PathBuf::from(row.get::<_, String>(4)?),
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Zap ──────────────────────────────────────────────────────

    /// Counts and byte totals over sized content that is not yet in the store.
    pub fn zap_totals(&self) -> Result<ZapTotals> {
        self.connection().query_row(
            "SELECT \
                 (SELECT COUNT(*) FROM file_hash \
                  WHERE size IS NOT NULL AND ignored = 0 AND zapped = 0), \
                 (SELECT COALESCE(SUM(size), 0) FROM file_hash \
                  WHERE size IS NOT NULL AND ignored = 0 AND zapped = 0), \
                 (SELECT COALESCE(SUM(size), 0) FROM eligible_file \
                  WHERE size IS NOT NULL AND zapped = 0)",
            [],
            |row| {
                Ok(ZapTotals {
                    hashes: row.get(0)?,
                    unique_bytes: row.get::<_, i64>(1)?.max(0) as u64,
                    total_bytes: row.get::<_, i64>(2)?.max(0) as u64,
                })
            },
        )
    }

    /// One representative file (lowest id) per hash that is not yet zapped.
    pub fn unique_files_to_zap(&self, cursor: &BatchCursor) -> Result<Vec<HashMember>> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT fh.id, fh.hash, rep.file_id, fp.absolute_path \
             FROM file_hash fh \
             JOIN ( \
                 SELECT f.file_hash_id, MIN(f.id) AS file_id \
                 FROM eligible_file f \
                 JOIN file_path fp ON fp.file_id = f.id \
                 WHERE f.zapped = 0 AND f.file_hash_id IS NOT NULL \
                 GROUP BY f.file_hash_id \
             ) rep ON rep.file_hash_id = fh.id \
             JOIN file_path fp ON fp.file_id = rep.file_id \
             WHERE fh.zapped = 0 \
             AND fh.ignored = 0 \
             AND fh.id > ?1 \
             ORDER BY fh.id \
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![cursor.last_id(), cursor.limit()], hash_member)?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn duplicate_totals(&self) -> Result<DuplicateTotals> {
        self.connection().query_row(
            "SELECT COUNT(*), COALESCE(SUM(f.size), 0) \
             FROM eligible_file f \
             JOIN file_hash fh ON f.file_hash_id = fh.id \
             WHERE f.zapped = 0 AND fh.zapped = 1 AND fh.ignored = 0",
            [],
            |row| {
                Ok(DuplicateTotals {
                    files: row.get(0)?,
                    bytes: row.get::<_, i64>(1)?.max(0) as u64,
                })
            },
        )
    }

    /// Files whose content is already in the store but which still exist in place.
    pub fn duplicate_files_to_remove(&self, cursor: &BatchCursor) -> Result<Vec<IdAndPath>> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT f.id, fp.absolute_path \
             FROM eligible_file f \
             JOIN file_path fp ON fp.file_id = f.id \
             JOIN file_hash fh ON f.file_hash_id = fh.id \
             WHERE f.zapped = 0 \
             AND fh.zapped = 1 \
             AND fh.ignored = 0 \
             AND f.id > ?1 \
             ORDER BY f.id \
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![cursor.last_id(), cursor.limit()], id_and_path)?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Absolute paths of every zapped file.
    pub fn zapped_file_paths(&self) -> Result<Vec<PathBuf>> {
        let mut stmt = self.connection().prepare(
            "SELECT fp.absolute_path \
             FROM eligible_file f \
             JOIN file_path fp ON fp.file_id = f.id \
             JOIN file_hash fh ON f.file_hash_id = fh.id \
             WHERE f.zapped = 1 AND fh.zapped = 1 AND fh.ignored = 0 \
             ORDER BY f.id",
        )?;
        let paths = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|r| r.map(PathBuf::from))
            .collect::<Result<Vec<_>>>()?;
        Ok(paths)
    }

    pub fn mark_hashes_zapped(&self, ids: &[i64], zapped: bool) -> Result<usize> {
        self.set_zapped("file_hash", ids, zapped)
    }

    pub fn mark_files_zapped(&self, ids: &[i64], zapped: bool) -> Result<usize> {
        self.set_zapped("file", ids, zapped)
    }

    fn set_zapped(&self, table: &str, ids: &[i64], zapped: bool) -> Result<usize> {
        let mut count = 0;
        for chunk in ids.chunks(500) {
            let sql = format!(
                "UPDATE {} SET zapped = {} WHERE id IN ({})",
                table,
                zapped as i64,
                placeholders(chunk.len())
            );
            count += self
                .connection()
                .execute(&sql, params_from_iter(chunk.iter()))?;
        }
        Ok(count)
    }

    // ── UnZap ────────────────────────────────────────────────────

    /// Number and total size of files whose content lives in the store.
    pub fn zapped_file_totals(&self) -> Result<DuplicateTotals> {
        self.connection().query_row(
            "SELECT COUNT(*), COALESCE(SUM(f.size), 0) \
             FROM eligible_file f \
             JOIN file_hash fh ON f.file_hash_id = fh.id \
             WHERE fh.zapped = 1 AND fh.ignored = 0",
            [],
            |row| {
                Ok(DuplicateTotals {
                    files: row.get(0)?,
                    bytes: row.get::<_, i64>(1)?.max(0) as u64,
                })
            },
        )
    }

    /// Files whose content is in the store, past the cursor.
    pub fn zapped_files_batch(&self, cursor: &BatchCursor) -> Result<Vec<HashMember>> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT fh.id, fh.hash, f.id, fp.absolute_path \
             FROM eligible_file f \
             JOIN file_path fp ON fp.file_id = f.id \
             JOIN file_hash fh ON f.file_hash_id = fh.id \
             WHERE fh.zapped = 1 \
             AND fh.ignored = 0 \
             AND f.id > ?1 \
             ORDER BY f.id \
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![cursor.last_id(), cursor.limit()], hash_member)?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Integrity ────────────────────────────────────────────────

    /// (hash, recorded size) of every zapped hash, in id order.
    pub fn zapped_hashes(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.connection().prepare(
            "SELECT hash, size FROM file_hash \
             WHERE zapped = 1 AND size IS NOT NULL AND ignored = 0 \
             ORDER BY id",
        )?;
        let hashes = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>>>()?;
        Ok(hashes)
    }

    pub fn unmark_hashes_zapped_by_hash(&self, hashes: &[String]) -> Result<usize> {
        let mut count = 0;
        for chunk in hashes.chunks(500) {
            let sql = format!(
                "UPDATE file_hash SET zapped = 0 WHERE hash IN ({})",
                placeholders(chunk.len())
            );
            count += self
                .connection()
                .execute(&sql, params_from_iter(chunk.iter()))?;
        }
        Ok(count)
    }

    // ── Counts ───────────────────────────────────────────────────

    pub fn count_rows(&self, table: &str) -> Result<i64> {
        self.connection()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
    }

    pub fn count_zapped_hashes(&self) -> Result<i64> {
        self.connection().query_row(
            "SELECT COUNT(*) FROM file_hash WHERE zapped = 1",
            [],
            |row| row.get(0),
        )
    }
}

use super::sqlite::Database;
use rusqlite::types::Type;
use rusqlite::{params, Result};

/// Keyset pagination over an id-ordered result set.
///
/// Batch queries select `<key> > last_id ORDER BY <key> LIMIT limit`. Within
/// one run batches never overlap and never skip a row; across runs the stage's
/// own predicate (e.g. `file_hash_id IS NULL`) excludes finished rows, so a
/// fresh cursor resumes where an interrupted run stopped.
#[derive(Debug, Clone, Copy)]
pub struct BatchCursor {
    last_id: i64,
    limit: usize,
}

impl BatchCursor {
    pub fn new(limit: usize) -> Self {
        Self {
            last_id: 0,
            limit: limit.max(1),
        }
    }

    pub fn last_id(&self) -> i64 {
        self.last_id
    }

    pub fn limit(&self) -> i64 {
        self.limit as i64
    }

    /// Move past the highest id in the batch just fetched.
    pub fn advance<I: IntoIterator<Item = i64>>(&mut self, ids: I) {
        if let Some(max) = ids.into_iter().max() {
            self.last_id = self.last_id.max(max);
        }
    }
}

impl Database {
    /// Partition the ids produced by `id_sql` (a query with a single `id`
    /// column) into consecutive batches of `batch_size`, in id order.
    ///
    /// Grouping is done by the store with a row-number window; each batch
    /// comes back as one comma-delimited list.
    pub fn partition_ids(&self, id_sql: &str, batch_size: usize) -> Result<Vec<Vec<i64>>> {
        let sql = format!(
            "WITH ids AS ({}), \
             numbered AS ( \
                 SELECT id, (ROW_NUMBER() OVER (ORDER BY id) - 1) / ?1 AS batch \
                 FROM ids \
             ) \
             SELECT group_concat(id, ',' ORDER BY id) \
             FROM numbered \
             GROUP BY batch \
             ORDER BY batch",
            id_sql
        );
        let mut stmt = self.connection().prepare(&sql)?;
        let batches = stmt
            .query_map(params![batch_size.max(1) as i64], |row| {
                let list: String = row.get(0)?;
                list.split(',')
                    .map(|id| id.trim().parse::<i64>())
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(batches)
    }
}

//! Append-only search log plus saved-search CRUD.
//!
//! Shares `documents.db` with `DocumentStore`; each store holds its own
//! `Connection` onto the same file and lets SQLite arbitrate writers.

use crate::db;
use crate::types::{SavedSearch, SearchHistoryRecord, SearchMode};
use docmind_common::{CoreError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, Default)]
pub struct ModeStats {
    pub count: u64,
    pub avg_results: f64,
    pub avg_ms: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PerfStats {
    pub avg_ms: f64,
    pub min_ms: u32,
    pub max_ms: u32,
    pub avg_results: f64,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryStatistics {
    pub total: u64,
    pub by_mode: HashMap<String, ModeStats>,
    pub daily_counts: Vec<(String, u64)>,
    pub perf: PerfStats,
}

#[derive(Debug, Clone)]
pub struct PopularQuery {
    pub query_text: String,
    pub count: u64,
    pub avg_results: f64,
    pub avg_ms: f64,
}

/// One query's rising/falling frequency across a day window, the
/// `search_trends` view the original Python implementation exposed
/// alongside `popular`/`failed`.
#[derive(Debug, Clone)]
pub struct SearchTrend {
    pub query_text: String,
    pub recent_count: u64,
    pub previous_count: u64,
    pub trend_score: f64,
}

/// Append-only log, durable, with aggregate views computed on demand rather
/// than materialized.
pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = db::open(db_path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn record(&self, text: &str, mode: SearchMode, result_count: u32, ms: u32) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO search_history (query_text, mode, timestamp, result_count, execution_time_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![text, mode_str(mode), crate::types::unix_now(), result_count, ms],
        )
        .map_err(CoreError::Sqlite)?;
        Ok(conn.last_insert_rowid())
    }

    /// Newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<SearchHistoryRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT * FROM search_history ORDER BY timestamp DESC LIMIT ?1")
            .map_err(CoreError::Sqlite)?;
        let rows = stmt
            .query_map(params![limit], row_to_record)
            .map_err(CoreError::Sqlite)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(CoreError::Sqlite)
    }

    /// Aggregate over the last `days`, sorted by count desc then avg_results desc.
    pub fn popular(&self, days: u32, limit: u32) -> Result<Vec<PopularQuery>> {
        let conn = self.conn.lock().unwrap();
        let since = crate::types::unix_now() - (days as i64) * 86_400;
        let mut stmt = conn
            .prepare(
                "SELECT query_text, COUNT(*) as cnt,
                        AVG(result_count) as avg_results, AVG(execution_time_ms) as avg_ms
                 FROM search_history
                 WHERE timestamp >= ?1
                 GROUP BY query_text
                 ORDER BY cnt DESC, avg_results DESC
                 LIMIT ?2",
            )
            .map_err(CoreError::Sqlite)?;
        let rows = stmt
            .query_map(params![since, limit], |row| {
                Ok(PopularQuery {
                    query_text: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                    avg_results: row.get(2)?,
                    avg_ms: row.get(3)?,
                })
            })
            .map_err(CoreError::Sqlite)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(CoreError::Sqlite)
    }

    /// Distinct historical queries starting with `prefix`, sorted by
    /// frequency desc then length ascending.
    pub fn suggestions_from_history(&self, prefix: &str, limit: u32) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("{}%", prefix);
        let mut stmt = conn
            .prepare(
                "SELECT query_text, COUNT(*) as cnt FROM search_history
                 WHERE query_text LIKE ?1
                 GROUP BY query_text
                 ORDER BY cnt DESC, LENGTH(query_text) ASC
                 LIMIT ?2",
            )
            .map_err(CoreError::Sqlite)?;
        let rows = stmt
            .query_map(params![pattern, limit], |row| row.get::<_, String>(0))
            .map_err(CoreError::Sqlite)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(CoreError::Sqlite)
    }

    pub fn statistics(&self, days: u32) -> Result<HistoryStatistics> {
        let conn = self.conn.lock().unwrap();
        let since = crate::types::unix_now() - (days as i64) * 86_400;

        let total: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM search_history WHERE timestamp >= ?1",
                params![since],
                |row| row.get(0),
            )
            .map_err(CoreError::Sqlite)?;

        let mut by_mode = HashMap::new();
        {
            let mut stmt = conn
                .prepare(
                    "SELECT mode, COUNT(*), AVG(result_count), AVG(execution_time_ms)
                     FROM search_history WHERE timestamp >= ?1 GROUP BY mode",
                )
                .map_err(CoreError::Sqlite)?;
            let rows = stmt
                .query_map(params![since], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        ModeStats {
                            count: row.get::<_, i64>(1)? as u64,
                            avg_results: row.get(2)?,
                            avg_ms: row.get(3)?,
                        },
                    ))
                })
                .map_err(CoreError::Sqlite)?;
            for row in rows {
                let (mode, stats) = row.map_err(CoreError::Sqlite)?;
                by_mode.insert(mode, stats);
            }
        }

        let mut daily_counts = Vec::new();
        {
            let mut stmt = conn
                .prepare(
                    "SELECT date(timestamp, 'unixepoch') as day, COUNT(*)
                     FROM search_history WHERE timestamp >= ?1 GROUP BY day ORDER BY day",
                )
                .map_err(CoreError::Sqlite)?;
            let rows = stmt
                .query_map(params![since], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
                })
                .map_err(CoreError::Sqlite)?;
            for row in rows {
                daily_counts.push(row.map_err(CoreError::Sqlite)?);
            }
        }

        let perf = conn
            .query_row(
                "SELECT AVG(execution_time_ms), MIN(execution_time_ms), MAX(execution_time_ms), AVG(result_count)
                 FROM search_history WHERE timestamp >= ?1",
                params![since],
                |row| {
                    Ok(PerfStats {
                        avg_ms: row.get::<_, Option<f64>>(0)?.unwrap_or(0.0),
                        min_ms: row.get::<_, Option<u32>>(1)?.unwrap_or(0),
                        max_ms: row.get::<_, Option<u32>>(2)?.unwrap_or(0),
                        avg_results: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                    })
                },
            )
            .map_err(CoreError::Sqlite)?;

        Ok(HistoryStatistics {
            total: total as u64,
            by_mode,
            daily_counts,
            perf,
        })
    }

    /// Queries with zero results, grouped by text, over the last `days`.
    pub fn failed(&self, days: u32, limit: u32) -> Result<Vec<(String, u64)>> {
        let conn = self.conn.lock().unwrap();
        let since = crate::types::unix_now() - (days as i64) * 86_400;
        let mut stmt = conn
            .prepare(
                "SELECT query_text, COUNT(*) FROM search_history
                 WHERE timestamp >= ?1 AND result_count = 0
                 GROUP BY query_text
                 ORDER BY COUNT(*) DESC
                 LIMIT ?2",
            )
            .map_err(CoreError::Sqlite)?;
        let rows = stmt
            .query_map(params![since, limit], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })
            .map_err(CoreError::Sqlite)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(CoreError::Sqlite)
    }

    /// Rising queries over the last `days`: the window is split in half,
    /// each query's count in the recent half is compared against its count
    /// in the previous half, and `trend_score` weights the growth by how
    /// often the query is actually being run so a single one-off spike
    /// doesn't outrank a steadily popular query. Sorted by score desc.
    pub fn trends(&self, days: u32, limit: u32) -> Result<Vec<SearchTrend>> {
        let conn = self.conn.lock().unwrap();
        let half_days = (days / 2).max(1) as i64;
        let now = crate::types::unix_now();
        let recent_since = now - half_days * 86_400;
        let previous_since = now - (half_days * 2) * 86_400;

        let mut recent_counts: HashMap<String, u64> = HashMap::new();
        {
            let mut stmt = conn
                .prepare(
                    "SELECT query_text, COUNT(*) FROM search_history
                     WHERE timestamp >= ?1 GROUP BY query_text",
                )
                .map_err(CoreError::Sqlite)?;
            let rows = stmt
                .query_map(params![recent_since], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
                })
                .map_err(CoreError::Sqlite)?;
            for row in rows {
                let (text, count) = row.map_err(CoreError::Sqlite)?;
                recent_counts.insert(text, count);
            }
        }

        let mut previous_counts: HashMap<String, u64> = HashMap::new();
        {
            let mut stmt = conn
                .prepare(
                    "SELECT query_text, COUNT(*) FROM search_history
                     WHERE timestamp >= ?1 AND timestamp < ?2 GROUP BY query_text",
                )
                .map_err(CoreError::Sqlite)?;
            let rows = stmt
                .query_map(params![previous_since, recent_since], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
                })
                .map_err(CoreError::Sqlite)?;
            for row in rows {
                let (text, count) = row.map_err(CoreError::Sqlite)?;
                previous_counts.insert(text, count);
            }
        }

        let mut trends: Vec<SearchTrend> = recent_counts
            .into_iter()
            .map(|(query_text, recent_count)| {
                let previous_count = previous_counts.remove(&query_text).unwrap_or(0);
                let growth = recent_count as f64 - previous_count as f64;
                let trend_score = recent_count as f64 * growth.max(0.0) / (previous_count as f64 + 1.0);
                SearchTrend {
                    query_text,
                    recent_count,
                    previous_count,
                    trend_score,
                }
            })
            .collect();

        trends.sort_by(|a, b| b.trend_score.partial_cmp(&a.trend_score).unwrap_or(std::cmp::Ordering::Equal));
        trends.truncate(limit as usize);
        Ok(trends)
    }

    /// Ranged dump of the append-only log, ordered oldest first, for
    /// exporting search activity to an external analysis tool.
    pub fn export(&self, since: Option<i64>, until: Option<i64>) -> Result<Vec<SearchHistoryRecord>> {
        let conn = self.conn.lock().unwrap();
        let since = since.unwrap_or(0);
        let until = until.unwrap_or(i64::MAX);
        let mut stmt = conn
            .prepare(
                "SELECT * FROM search_history
                 WHERE timestamp >= ?1 AND timestamp <= ?2
                 ORDER BY timestamp ASC",
            )
            .map_err(CoreError::Sqlite)?;
        let rows = stmt
            .query_map(params![since, until], row_to_record)
            .map_err(CoreError::Sqlite)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(CoreError::Sqlite)
    }

    /// Returns the number of rows deleted.
    pub fn clear_older_than(&self, days: u32) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let cutoff = crate::types::unix_now() - (days as i64) * 86_400;
        let n = conn
            .execute(
                "DELETE FROM search_history WHERE timestamp < ?1",
                params![cutoff],
            )
            .map_err(CoreError::Sqlite)?;
        Ok(n as u64)
    }

    // --- Saved searches ---

    /// Upsert on unique name.
    pub fn save_search(
        &self,
        name: &str,
        text: &str,
        mode: SearchMode,
        options_json: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO saved_searches (name, query_text, mode, options_blob, created_at, use_count)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)
             ON CONFLICT(name) DO UPDATE SET
                query_text = excluded.query_text,
                mode = excluded.mode,
                options_blob = excluded.options_blob",
            params![name, text, mode_str(mode), options_json, crate::types::unix_now()],
        )
        .map_err(CoreError::Sqlite)?;
        let id: i64 = conn
            .query_row(
                "SELECT id FROM saved_searches WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .map_err(CoreError::Sqlite)?;
        Ok(id)
    }

    /// Sorted by `(use_count desc, last_used_at desc)`.
    pub fn list_saved_searches(&self) -> Result<Vec<SavedSearch>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT * FROM saved_searches
                 ORDER BY use_count DESC, last_used_at DESC",
            )
            .map_err(CoreError::Sqlite)?;
        let rows = stmt
            .query_map([], row_to_saved_search)
            .map_err(CoreError::Sqlite)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(CoreError::Sqlite)
    }

    /// Atomically increments `use_count` and updates `last_used_at`, returning
    /// the updated record.
    pub fn use_saved_search(&self, id: i64) -> Result<SavedSearch> {
        let conn = self.conn.lock().unwrap();
        let n = conn
            .execute(
                "UPDATE saved_searches SET use_count = use_count + 1, last_used_at = ?2 WHERE id = ?1",
                params![id, crate::types::unix_now()],
            )
            .map_err(CoreError::Sqlite)?;
        if n == 0 {
            return Err(CoreError::NotFound(format!("saved search {id}")));
        }
        row_by(&conn, id)?.ok_or_else(|| CoreError::NotFound(format!("saved search {id}")))
    }

    pub fn rename_saved_search(&self, id: i64, new_name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn
            .execute(
                "UPDATE saved_searches SET name = ?2 WHERE id = ?1",
                params![id, new_name],
            )
            .map_err(CoreError::Sqlite)?;
        if n == 0 {
            return Err(CoreError::NotFound(format!("saved search {id}")));
        }
        Ok(())
    }

    pub fn delete_saved_search(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let n = conn
            .execute("DELETE FROM saved_searches WHERE id = ?1", params![id])
            .map_err(CoreError::Sqlite)?;
        Ok(n > 0)
    }
}

fn mode_str(mode: SearchMode) -> &'static str {
    match mode {
        SearchMode::FullText => "full_text",
        SearchMode::Semantic => "semantic",
        SearchMode::Hybrid => "hybrid",
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<SearchHistoryRecord> {
    let mode_str: String = row.get("mode")?;
    Ok(SearchHistoryRecord {
        id: row.get("id")?,
        query_text: row.get("query_text")?,
        mode: SearchMode::parse(&mode_str).unwrap_or(SearchMode::FullText),
        timestamp: row.get("timestamp")?,
        result_count: row.get("result_count")?,
        execution_time_ms: row.get("execution_time_ms")?,
    })
}

fn row_to_saved_search(row: &rusqlite::Row) -> rusqlite::Result<SavedSearch> {
    let mode_str: String = row.get("mode")?;
    Ok(SavedSearch {
        id: row.get("id")?,
        name: row.get("name")?,
        query_text: row.get("query_text")?,
        mode: SearchMode::parse(&mode_str).unwrap_or(SearchMode::FullText),
        options_blob: row.get("options_blob")?,
        created_at: row.get("created_at")?,
        last_used_at: row.get("last_used_at").ok(),
        use_count: row.get("use_count")?,
    })
}

fn row_by(conn: &Connection, id: i64) -> Result<Option<SavedSearch>> {
    conn.query_row(
        "SELECT * FROM saved_searches WHERE id = ?1",
        params![id],
        row_to_saved_search,
    )
    .optional()
    .map_err(CoreError::Sqlite)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_then_recent_returns_newest_first() {
        let temp = assert_fs::TempDir::new().unwrap();
        let store = HistoryStore::open(&temp.path().join("documents.db")).unwrap();
        store.record("alpha", SearchMode::FullText, 3, 10).unwrap();
        store.record("beta", SearchMode::Semantic, 1, 20).unwrap();

        let recent = store.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].query_text, "beta");
    }

    #[test]
    fn popular_groups_by_text_and_sorts_by_count() {
        let temp = assert_fs::TempDir::new().unwrap();
        let store = HistoryStore::open(&temp.path().join("documents.db")).unwrap();
        store.record("cat", SearchMode::FullText, 3, 10).unwrap();
        store.record("cat", SearchMode::FullText, 5, 10).unwrap();
        store.record("dog", SearchMode::FullText, 1, 10).unwrap();

        let popular = store.popular(30, 10).unwrap();
        assert_eq!(popular[0].query_text, "cat");
        assert_eq!(popular[0].count, 2);
    }

    #[test]
    fn failed_only_returns_zero_result_queries() {
        let temp = assert_fs::TempDir::new().unwrap();
        let store = HistoryStore::open(&temp.path().join("documents.db")).unwrap();
        store.record("nomatch", SearchMode::FullText, 0, 5).unwrap();
        store.record("hasmatch", SearchMode::FullText, 3, 5).unwrap();

        let failed = store.failed(30, 10).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "nomatch");
    }

    #[test]
    fn clear_older_than_removes_only_old_rows() {
        let temp = assert_fs::TempDir::new().unwrap();
        let store = HistoryStore::open(&temp.path().join("documents.db")).unwrap();
        let conn = store.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO search_history (query_text, mode, timestamp, result_count, execution_time_ms)
             VALUES ('old', 'full_text', ?1, 1, 1)",
            params![crate::types::unix_now() - 1_000_000],
        )
        .unwrap();
        drop(conn);
        store.record("new", SearchMode::FullText, 1, 1).unwrap();

        let deleted = store.clear_older_than(1).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.recent(10).unwrap().len(), 1);
    }

    #[test]
    fn trends_ranks_queries_growing_in_the_recent_half() {
        let temp = assert_fs::TempDir::new().unwrap();
        let store = HistoryStore::open(&temp.path().join("documents.db")).unwrap();
        let conn = store.conn.lock().unwrap();
        let now = crate::types::unix_now();
        // "rising" ran twice in the previous half, five times in the recent half.
        for _ in 0..2 {
            conn.execute(
                "INSERT INTO search_history (query_text, mode, timestamp, result_count, execution_time_ms)
                 VALUES ('rising', 'full_text', ?1, 1, 1)",
                params![now - 6 * 86_400],
            )
            .unwrap();
        }
        for _ in 0..5 {
            conn.execute(
                "INSERT INTO search_history (query_text, mode, timestamp, result_count, execution_time_ms)
                 VALUES ('rising', 'full_text', ?1, 1, 1)",
                params![now - 1],
            )
            .unwrap();
        }
        // "steady" ran the same amount in both halves.
        for ts in [now - 6 * 86_400, now - 1] {
            conn.execute(
                "INSERT INTO search_history (query_text, mode, timestamp, result_count, execution_time_ms)
                 VALUES ('steady', 'full_text', ?1, 1, 1)",
                params![ts],
            )
            .unwrap();
        }
        drop(conn);

        let trends = store.trends(14, 10).unwrap();
        assert_eq!(trends[0].query_text, "rising");
        assert_eq!(trends[0].recent_count, 5);
        assert_eq!(trends[0].previous_count, 2);
        assert!(trends[0].trend_score > 0.0);
    }

    #[test]
    fn export_returns_rows_within_the_requested_range_oldest_first() {
        let temp = assert_fs::TempDir::new().unwrap();
        let store = HistoryStore::open(&temp.path().join("documents.db")).unwrap();
        store.record("first", SearchMode::FullText, 1, 1).unwrap();
        store.record("second", SearchMode::FullText, 1, 1).unwrap();

        let all = store.export(None, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].query_text, "first");
        assert_eq!(all[1].query_text, "second");

        let none = store.export(Some(crate::types::unix_now() + 1000), None).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn saved_search_upsert_and_use_count() {
        let temp = assert_fs::TempDir::new().unwrap();
        let store = HistoryStore::open(&temp.path().join("documents.db")).unwrap();
        let id = store.save_search("my search", "fox", SearchMode::Hybrid, None).unwrap();
        store.use_saved_search(id).unwrap();
        let updated = store.use_saved_search(id).unwrap();
        assert_eq!(updated.use_count, 2);
        assert!(updated.last_used_at.is_some());

        let list = store.list_saved_searches().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].use_count, 2);

        let fetched = row_by(&store.conn.lock().unwrap(), id).unwrap().unwrap();
        assert_eq!(fetched.name, "my search");
    }

    #[test]
    fn rename_and_delete_saved_search() {
        let temp = assert_fs::TempDir::new().unwrap();
        let store = HistoryStore::open(&temp.path().join("documents.db")).unwrap();
        let id = store.save_search("a", "fox", SearchMode::FullText, None).unwrap();
        store.rename_saved_search(id, "b").unwrap();
        let list = store.list_saved_searches().unwrap();
        assert_eq!(list[0].name, "b");

        assert!(store.delete_saved_search(id).unwrap());
        assert!(store.list_saved_searches().unwrap().is_empty());
    }
}

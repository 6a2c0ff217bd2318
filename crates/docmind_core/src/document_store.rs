//! Persistent mapping from document id to metadata record.

use crate::db;
use crate::types::{Document, FileType};
use docmind_common::{CoreError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Aggregate counters over the whole store.
#[derive(Debug, Clone, Default)]
pub struct DocumentStoreStats {
    pub total_docs: u64,
    pub total_size: u64,
    pub per_type_counts: HashMap<String, u64>,
    pub last_updated: Option<i64>,
}

/// Source of truth for "what exists". Backed by the shared `documents.db`
/// SQLite file; a `Mutex<Connection>` serializes writers the way the rest of
/// the workspace wraps stores the underlying library doesn't arbitrate itself.
pub struct DocumentStore {
    conn: Mutex<Connection>,
}

impl DocumentStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = db::open(db_path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Writes or replaces a row keyed by `id`. Body `content` is intentionally
    /// not part of this table: InvertedIndex already stores it, and the
    /// Searcher's full-text hydration path reads content from its hits rather
    /// than from here.
    pub fn upsert(&self, doc: &Document) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let metadata_json = serde_json::to_string(&doc.metadata)?;
        conn.execute(
            "INSERT INTO documents
                (id, file_path, title, file_type, size, created_at, modified_at, indexed_at, content_hash, metadata_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                file_path = excluded.file_path,
                title = excluded.title,
                file_type = excluded.file_type,
                size = excluded.size,
                created_at = excluded.created_at,
                modified_at = excluded.modified_at,
                indexed_at = excluded.indexed_at,
                content_hash = excluded.content_hash,
                metadata_json = excluded.metadata_json",
            params![
                doc.id,
                doc.file_path.to_string_lossy(),
                doc.title,
                doc.file_type.as_str(),
                doc.size as i64,
                doc.created_at,
                doc.modified_at,
                doc.indexed_at,
                doc.content_hash,
                metadata_json,
            ],
        )
        .map_err(CoreError::Sqlite)?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock().unwrap();
        row_by(&conn, "id = ?1", id)
    }

    pub fn get_by_path(&self, path: &Path) -> Result<Option<Document>> {
        let conn = self.conn.lock().unwrap();
        row_by(&conn, "file_path = ?1", &path.to_string_lossy())
    }

    /// Returns whether a row was removed. Callers also instruct InvertedIndex
    /// and EmbeddingStore to drop the same id to keep the three stores in sync.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let n = conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id])
            .map_err(CoreError::Sqlite)?;
        Ok(n > 0)
    }

    pub fn delete_by_path(&self, path: &Path) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let n = conn
            .execute(
                "DELETE FROM documents WHERE file_path = ?1",
                params![path.to_string_lossy()],
            )
            .map_err(CoreError::Sqlite)?;
        Ok(n > 0)
    }

    /// Newest `indexed_at` first.
    pub fn list(&self, limit: Option<u32>, offset: Option<u32>) -> Result<Vec<Document>> {
        let conn = self.conn.lock().unwrap();
        let sql = match (limit, offset) {
            (Some(_), _) => {
                "SELECT * FROM documents ORDER BY indexed_at DESC LIMIT ?1 OFFSET ?2".to_string()
            }
            (None, _) => "SELECT * FROM documents ORDER BY indexed_at DESC".to_string(),
        };
        let mut stmt = conn.prepare(&sql).map_err(CoreError::Sqlite)?;
        let rows = if let Some(limit) = limit {
            stmt.query_map(params![limit, offset.unwrap_or(0)], row_to_document)
        } else {
            stmt.query_map([], row_to_document)
        }
        .map_err(CoreError::Sqlite)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(CoreError::Sqlite)
    }

    pub fn list_by_type(&self, file_type: FileType) -> Result<Vec<Document>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT * FROM documents WHERE file_type = ?1 ORDER BY indexed_at DESC")
            .map_err(CoreError::Sqlite)?;
        let rows = stmt
            .query_map(params![file_type.as_str()], row_to_document)
            .map_err(CoreError::Sqlite)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(CoreError::Sqlite)
    }

    pub fn list_modified_after(&self, ts: i64) -> Result<Vec<Document>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT * FROM documents WHERE modified_at > ?1 ORDER BY modified_at DESC")
            .map_err(CoreError::Sqlite)?;
        let rows = stmt
            .query_map(params![ts], row_to_document)
            .map_err(CoreError::Sqlite)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(CoreError::Sqlite)
    }

    pub fn search_titles(&self, substring: &str) -> Result<Vec<Document>> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("%{}%", substring);
        let mut stmt = conn
            .prepare("SELECT * FROM documents WHERE title LIKE ?1 ORDER BY indexed_at DESC")
            .map_err(CoreError::Sqlite)?;
        let rows = stmt
            .query_map(params![pattern], row_to_document)
            .map_err(CoreError::Sqlite)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(CoreError::Sqlite)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(CoreError::Sqlite)?;
        Ok(count as u64)
    }

    pub fn stats(&self) -> Result<DocumentStoreStats> {
        let conn = self.conn.lock().unwrap();
        let total_docs: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(CoreError::Sqlite)?;
        let total_size: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(size), 0) FROM documents",
                [],
                |row| row.get(0),
            )
            .map_err(CoreError::Sqlite)?;
        let last_updated: Option<i64> = conn
            .query_row("SELECT MAX(indexed_at) FROM documents", [], |row| row.get(0))
            .map_err(CoreError::Sqlite)?;

        let mut stmt = conn
            .prepare("SELECT file_type, COUNT(*) FROM documents GROUP BY file_type")
            .map_err(CoreError::Sqlite)?;
        let per_type_counts: HashMap<String, u64> = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })
            .map_err(CoreError::Sqlite)?
            .collect::<std::result::Result<_, _>>()
            .map_err(CoreError::Sqlite)?;

        Ok(DocumentStoreStats {
            total_docs: total_docs as u64,
            total_size: total_size as u64,
            per_type_counts,
            last_updated,
        })
    }
}

fn row_by(conn: &Connection, clause: &str, param: &str) -> Result<Option<Document>> {
    let sql = format!("SELECT * FROM documents WHERE {}", clause);
    conn.query_row(&sql, params![param], row_to_document)
        .optional()
        .map_err(CoreError::Sqlite)
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    let file_type_str: String = row.get("file_type")?;
    let file_type = FileType::parse(&file_type_str);
    let metadata_json: String = row.get("metadata_json")?;
    let metadata = serde_json::from_str(&metadata_json).unwrap_or_default();

    Ok(Document {
        id: row.get("id")?,
        file_path: std::path::PathBuf::from(row.get::<_, String>("file_path")?),
        title: row.get("title")?,
        // Never stored here; callers needing body text hydrate it from
        // InvertedIndex hits via the Searcher.
        content: String::new(),
        file_type,
        size: row.get::<_, i64>("size")? as u64,
        created_at: row.get("created_at")?,
        modified_at: row.get("modified_at")?,
        indexed_at: row.get("indexed_at")?,
        content_hash: row.get("content_hash")?,
        metadata,
    })
}

//! Shared SQLite bootstrap for `documents.db` (DocumentStore + HistoryStore).

use docmind_common::{CoreError, Result};
use rusqlite::Connection;
use std::path::Path;

/// Open (or create) the shared `documents.db` connection and apply schema.sql.
/// DocumentStore and HistoryStore each hold their own `Connection` onto the
/// same file; SQLite's own locking arbitrates concurrent writers.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).map_err(CoreError::Sqlite)?;
    conn.execute("PRAGMA foreign_keys = ON", [])
        .map_err(CoreError::Sqlite)?;
    conn.execute_batch(include_str!("schema.sql"))
        .map_err(CoreError::Sqlite)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_schema() {
        let temp = assert_fs::TempDir::new().unwrap();
        let conn = open(&temp.path().join("documents.db")).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}

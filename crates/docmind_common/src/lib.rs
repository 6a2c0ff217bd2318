//! Shared error type and small cross-crate value types for DocMind.
//!
//! This crate has no knowledge of search, storage, or indexing; it exists so the
//! other workspace members can agree on one error taxonomy and one logging
//! initialization path instead of each rolling their own.

pub mod telemetry;

use thiserror::Error;

/// The public error taxonomy for the DocMind search core.
///
/// Each variant corresponds to a component family rather than to a single
/// failure site; component-local errors are expected to convert into one of
/// these via `#[from]` or an explicit `map_err` at the crate boundary.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("indexing error: {0}")]
    Indexing(String),

    #[error("search error: {0}")]
    Search { component: String, message: String },

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("extraction error: {0}")]
    Extraction(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Whether the caller should treat this as a soft (recoverable) degradation
    /// rather than a hard failure. Used by Searcher when semantic search is
    /// unavailable but full-text can still serve the query.
    pub fn is_recoverable_search_degradation(&self) -> bool {
        matches!(self, CoreError::Search { .. })
    }
}

/// Crate-wide result alias for the public `CoreError` contract.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Standard process exit codes for the `docmind` CLI.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_CONFIG_ERROR: i32 = 101;
pub const EXIT_TERMINATED: i32 = 130;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_error_is_recoverable() {
        let err = CoreError::Search {
            component: "semantic".into(),
            message: "model unavailable".into(),
        };
        assert!(err.is_recoverable_search_degradation());
    }

    #[test]
    fn storage_error_is_not_recoverable() {
        let err = CoreError::Storage("disk full".into());
        assert!(!err.is_recoverable_search_degradation());
    }
}

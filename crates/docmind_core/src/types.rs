//! Shared data model for the search core.
//!
//! Every store and the fusion layer exchange values defined here rather than
//! ad-hoc tuples, so the referential-integrity and scoring invariants have a
//! single place to live.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Tagged file-type variant a document was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Pdf,
    Word,
    Excel,
    Markdown,
    Text,
    Unknown,
}

impl FileType {
    /// Classify by extension, the same dispatch an Extractor implementation uses.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => FileType::Pdf,
            "doc" | "docx" => FileType::Word,
            "xls" | "xlsx" => FileType::Excel,
            "md" | "markdown" => FileType::Markdown,
            "txt" => FileType::Text,
            _ => FileType::Unknown,
        }
    }

    /// Inverse of `as_str`, for round-tripping the value InvertedIndex stores.
    pub fn parse(s: &str) -> Self {
        match s {
            "pdf" => FileType::Pdf,
            "word" => FileType::Word,
            "excel" => FileType::Excel,
            "markdown" => FileType::Markdown,
            "text" => FileType::Text,
            _ => FileType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Word => "word",
            FileType::Excel => "excel",
            FileType::Markdown => "markdown",
            FileType::Text => "text",
            FileType::Unknown => "unknown",
        }
    }
}

/// Derive the content-addressed document id: SHA-256 over the normalized
/// absolute path. Two paths never collide; one path always yields the same id.
pub fn document_id_for_path(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    sha256_hex(normalized.as_bytes())
}

/// The one hashing primitive used throughout (content hash, text hash, doc id).
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// One indexed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub file_path: PathBuf,
    pub title: String,
    pub content: String,
    pub file_type: FileType,
    pub size: u64,
    pub created_at: i64,
    pub modified_at: i64,
    pub indexed_at: i64,
    pub content_hash: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Build a Document from extracted content, deriving id/hash/title defaults.
    pub fn new(
        file_path: PathBuf,
        title: Option<String>,
        content: String,
        file_type: FileType,
        size: u64,
        created_at: i64,
        modified_at: i64,
    ) -> Self {
        let id = document_id_for_path(&file_path);
        let content_hash = sha256_hex(content.as_bytes());
        let title = title.unwrap_or_else(|| {
            file_path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "untitled".to_string())
        });

        Self {
            id,
            file_path,
            title,
            content,
            file_type,
            size,
            created_at,
            modified_at,
            indexed_at: unix_now(),
            content_hash,
            metadata: HashMap::new(),
        }
    }

    /// A document is stale if the file's mtime is newer than `indexed_at`, or
    /// the recomputed content hash no longer matches the stored one.
    pub fn is_stale(&self, current_modified_at: i64, current_content_hash: &str) -> bool {
        current_modified_at > self.indexed_at || current_content_hash != self.content_hash
    }
}

/// Search mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    FullText,
    Semantic,
    Hybrid,
}

impl SearchMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "full_text" | "fulltext" | "text" => Some(SearchMode::FullText),
            "semantic" => Some(SearchMode::Semantic),
            "hybrid" => Some(SearchMode::Hybrid),
            _ => None,
        }
    }
}

/// Hybrid fusion weights, always stored normalized to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchWeights {
    pub full_text: f32,
    pub semantic: f32,
}

impl Default for SearchWeights {
    fn default() -> Self {
        Self {
            full_text: 0.6,
            semantic: 0.4,
        }
    }
}

impl SearchWeights {
    /// Normalize to sum 1; falls back to the default weights when both are zero
    /// or negative (matches `search_manager.py`'s `__post_init__`).
    pub fn normalized(full_text: f32, semantic: f32) -> Self {
        let full_text = full_text.max(0.0);
        let semantic = semantic.max(0.0);
        let sum = full_text + semantic;
        if sum <= 0.0 {
            return Self::default();
        }
        Self {
            full_text: full_text / sum,
            semantic: semantic / sum,
        }
    }
}

/// Search request descriptor.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub mode: SearchMode,
    pub limit: u32,
    pub file_types: Option<Vec<FileType>>,
    pub date_from: Option<i64>,
    pub date_to: Option<i64>,
    pub folder_paths: Option<Vec<String>>,
    pub weights: Option<SearchWeights>,
}

impl Query {
    pub fn new(text: impl Into<String>, mode: SearchMode) -> Self {
        Self {
            text: text.into(),
            mode,
            limit: 100,
            file_types: None,
            date_from: None,
            date_to: None,
            folder_paths: None,
            weights: None,
        }
    }
}

/// Which mode actually produced a Result's score.
pub type ModeUsed = SearchMode;

/// One search hit.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub document: Document,
    pub score: f32,
    pub mode_used: ModeUsed,
    pub snippet: String,
    pub highlighted_terms: Vec<String>,
    pub relevance_explanation: String,
    pub rank: u32,
}

/// Rebuild stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildStage {
    Idle,
    Scanning,
    Processing,
    Indexing,
    Completed,
    Error,
}

/// Singleton rebuild state.
#[derive(Debug, Clone, Default)]
pub struct RebuildState {
    pub thread_id: Option<String>,
    pub started_at: Option<i64>,
    pub folder_path: Option<PathBuf>,
    pub is_active: bool,
}

impl RebuildState {
    pub fn start(&mut self, thread_id: String, folder_path: PathBuf) {
        self.thread_id = Some(thread_id);
        self.started_at = Some(unix_now());
        self.folder_path = Some(folder_path);
        self.is_active = true;
    }

    pub fn reset(&mut self) {
        *self = RebuildState::default();
    }

    /// `is_active && (now - started_at) > minutes*60s`.
    pub fn is_timeout_exceeded(&self, minutes: u64) -> bool {
        match (self.is_active, self.started_at) {
            (true, Some(started_at)) => unix_now() - started_at > (minutes as i64) * 60,
            _ => false,
        }
    }
}

/// Rebuild progress snapshot.
#[derive(Debug, Clone)]
pub struct RebuildProgress {
    pub stage: RebuildStage,
    pub current_file: Option<PathBuf>,
    pub files_processed: u64,
    pub total_files: u64,
    pub message: Option<String>,
}

impl RebuildProgress {
    pub fn idle() -> Self {
        Self {
            stage: RebuildStage::Idle,
            current_file: None,
            files_processed: 0,
            total_files: 0,
            message: None,
        }
    }

    /// `min(100, files_processed*100/total_files)` else 100 if Completed else 0.
    pub fn percentage(&self) -> u8 {
        if self.total_files > 0 {
            let pct = (self.files_processed.saturating_mul(100) / self.total_files).min(100);
            pct as u8
        } else if self.stage == RebuildStage::Completed {
            100
        } else {
            0
        }
    }

    /// English-language default display message, derived deterministically
    /// from stage (localization is a UI concern layered on top of this).
    pub fn display_message(&self) -> String {
        if let Some(msg) = &self.message {
            return msg.clone();
        }
        match self.stage {
            RebuildStage::Idle => "idle".to_string(),
            RebuildStage::Scanning => "scanning files".to_string(),
            RebuildStage::Processing => format!(
                "processing {}/{} files",
                self.files_processed, self.total_files
            ),
            RebuildStage::Indexing => "finalizing index".to_string(),
            RebuildStage::Completed => "completed".to_string(),
            RebuildStage::Error => "error".to_string(),
        }
    }
}

/// Terminal summary emitted by IndexingPipeline/RebuildCoordinator.
#[derive(Debug, Clone, Default)]
pub struct CompletionStats {
    pub files_processed: u64,
    pub files_failed: u64,
    pub documents_added: u64,
    pub elapsed_seconds: f64,
}

/// Non-terminal (per-file) or terminal error surfaced through the progress channel.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub kind: String,
    pub message: String,
    pub context: Option<String>,
}

/// Observer-pattern progress/event surface.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Progress(RebuildProgress),
    Completed(CompletionStats),
    Error(ErrorEvent),
}

/// One row of the append-only search log.
#[derive(Debug, Clone)]
pub struct SearchHistoryRecord {
    pub id: i64,
    pub query_text: String,
    pub mode: SearchMode,
    pub timestamp: i64,
    pub result_count: u32,
    pub execution_time_ms: u32,
}

/// A saved/favorited search.
#[derive(Debug, Clone)]
pub struct SavedSearch {
    pub id: i64,
    pub name: String,
    pub query_text: String,
    pub mode: SearchMode,
    pub options_blob: Option<String>,
    pub created_at: i64,
    pub last_used_at: Option<i64>,
    pub use_count: u32,
}

/// Content extracted from a file.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub file_path: PathBuf,
    pub file_type: FileType,
    pub title: String,
    pub content: String,
    pub size: u64,
    pub created_at: i64,
    pub modified_at: i64,
}

/// Error taxonomy an Extractor implementation reports.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported file type")]
    Unsupported,
    #[error("file unreadable")]
    Unreadable,
    #[error("file corrupted")]
    Corrupted,
    #[error("file empty")]
    Empty,
}

/// Filesystem change kind delivered by a ChangeWatcher.
#[derive(Debug, Clone)]
pub enum ChangeKind {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_is_stable_per_path() {
        let a = document_id_for_path(Path::new("/docs/report.pdf"));
        let b = document_id_for_path(Path::new("/docs/report.pdf"));
        let c = document_id_for_path(Path::new("/docs/other.pdf"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn weights_normalize_to_default_when_zero() {
        let w = SearchWeights::normalized(0.0, 0.0);
        assert_eq!(w, SearchWeights::default());
    }

    #[test]
    fn weights_normalize_to_sum_one() {
        let w = SearchWeights::normalized(3.0, 1.0);
        assert!((w.full_text + w.semantic - 1.0).abs() < 1e-6);
        assert!((w.full_text - 0.75).abs() < 1e-6);
    }

    #[test]
    fn rebuild_progress_percentage_rules() {
        let mut p = RebuildProgress::idle();
        assert_eq!(p.percentage(), 0);

        p.stage = RebuildStage::Completed;
        assert_eq!(p.percentage(), 100);

        p.stage = RebuildStage::Processing;
        p.total_files = 10;
        p.files_processed = 5;
        assert_eq!(p.percentage(), 50);

        p.files_processed = 20;
        assert_eq!(p.percentage(), 100);
    }

    #[test]
    fn rebuild_state_timeout() {
        let mut state = RebuildState::default();
        assert!(!state.is_timeout_exceeded(30));

        state.start("t1".to_string(), PathBuf::from("/docs"));
        assert!(!state.is_timeout_exceeded(30));

        state.started_at = Some(unix_now() - 3601);
        assert!(state.is_timeout_exceeded(60));
    }
}

//! Core search engine for DocMind: three persistent stores (documents,
//! full-text index, embeddings), a fusion searcher over them, and the
//! pipelines that keep them in sync with a folder on disk.

pub mod change_watcher;
pub mod consistency;
pub mod context;
pub mod db;
pub mod document_store;
pub mod embedder;
pub mod embedding_store;
pub mod extractor;
pub mod history_store;
pub mod indexing_pipeline;
pub mod inverted_index;
pub mod rebuild_coordinator;
pub mod searcher;
pub mod suggestion_index;
pub mod types;

pub use change_watcher::{ChangeWatcher, ChangeWatcherConfig, WatcherStats};
pub use consistency::{sweep, ConsistencyReport};
pub use context::CoreContext;
pub use document_store::{DocumentStore, DocumentStoreStats};
pub use embedder::{Embedder, FastEmbedEmbedder};
pub use embedding_store::{CacheInfo, EmbeddingStore};
pub use extractor::{DefaultExtractor, Extractor};
pub use history_store::{HistoryStatistics, HistoryStore, PopularQuery, SearchTrend};
pub use indexing_pipeline::{CancelToken, IndexingPipeline};
pub use inverted_index::{IndexStats, InvertedIndex, RAW_SCORE_DIVISOR};
pub use rebuild_coordinator::RebuildCoordinator;
pub use searcher::{SearchStats, Searcher, SearcherSettings};
pub use suggestion_index::SuggestionIndex;
pub use types::{
    ChangeKind, CompletionStats, Document, ErrorEvent, Extracted, FileType, ProgressEvent, Query, RebuildProgress,
    RebuildStage, RebuildState, SavedSearch, SearchHistoryRecord, SearchMode, SearchResult, SearchWeights,
};

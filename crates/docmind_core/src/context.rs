//! Owns the application's persistent stores, config, and capability
//! implementations so they are threaded explicitly through constructors
//! instead of living behind process-wide statics.

use crate::document_store::DocumentStore;
use crate::embedder::{Embedder, FastEmbedEmbedder};
use crate::embedding_store::EmbeddingStore;
use crate::extractor::{DefaultExtractor, Extractor};
use crate::history_store::HistoryStore;
use crate::inverted_index::InvertedIndex;
use crate::rebuild_coordinator::RebuildCoordinator;
use crate::searcher::Searcher;
use docmind_common::Result;
use docmind_config::Config;
use std::path::Path;

/// The single handle an application entry point owns. Every long-lived
/// component (`Searcher`, `IndexingPipeline`, `RebuildCoordinator`,
/// `ChangeWatcher`) borrows from this instead of reaching into statics
///.
pub struct CoreContext {
    pub config: Config,
    pub document_store: DocumentStore,
    pub inverted_index: InvertedIndex,
    pub embedding_store: EmbeddingStore,
    pub history_store: HistoryStore,
    pub rebuild_coordinator: RebuildCoordinator,
    embedder: Box<dyn Embedder>,
    extractor: Box<dyn Extractor>,
}

impl CoreContext {
    /// Opens (or creates) all stores under `config.data_dir`: `documents.db`,
    /// `index/`, `embeddings.bin`. Uses the fastembed-backed embedder and the
    /// default text/markdown extractor.
    pub fn open(config: Config) -> Result<Self> {
        let cache_dir = config.data_dir.join("models");
        Self::open_with(
            config,
            Box::new(FastEmbedEmbedder::new(cache_dir)),
            Box::new(DefaultExtractor),
        )
    }

    /// Same as `open`, but lets a caller substitute the embedder/extractor —
    /// used by tests (a fixed-vector stub embedder avoids a network fetch)
    /// and by future format support.
    pub fn open_with(config: Config, embedder: Box<dyn Embedder>, extractor: Box<dyn Extractor>) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let documents_db = config.data_dir.join("documents.db");
        let document_store = DocumentStore::open(&documents_db)?;
        let history_store = HistoryStore::open(&documents_db)?;

        let index_dir = config.data_dir.join("index");
        let inverted_index = InvertedIndex::open(&index_dir)?;

        let embeddings_path = config.data_dir.join("embeddings.bin");
        let embedding_store = EmbeddingStore::open(&embeddings_path, embedder.dimension())?;

        let rebuild_coordinator = RebuildCoordinator::new(config.performance.rebuild_timeout_minutes);

        let report = crate::consistency::sweep(&document_store, &inverted_index, &embedding_store)?;
        if !report.is_clean() {
            tracing::info!(?report, "startup consistency sweep repaired dangling entries");
        }

        Ok(Self {
            config,
            document_store,
            inverted_index,
            embedding_store,
            history_store,
            rebuild_coordinator,
            embedder,
            extractor,
        })
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn extractor(&self) -> &dyn Extractor {
        self.extractor.as_ref()
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Builds a `Searcher` borrowing this context's four stores, seeded with
    /// the current config's weights. Cheap enough to call per request;
    /// not cached on `CoreContext` itself.
    pub fn searcher(&self) -> Searcher<'_> {
        let searcher = Searcher::new(
            &self.document_store,
            &self.inverted_index,
            &self.embedding_store,
            self.embedder(),
        );
        searcher.update_weights(self.config.search.full_text_weight, self.config.search.semantic_weight);
        searcher.update_min_semantic_similarity(self.config.search.min_semantic_similarity);
        searcher.update_snippet_max_length(self.config.search.snippet_max_length);
        searcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Query, SearchMode};

    struct FixedEmbedder;
    impl Embedder for FixedEmbedder {
        fn dimension(&self) -> usize {
            4
        }
        fn encode(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0, 0.0, 0.0])
        }
    }

    #[test]
    fn open_with_creates_data_dir_layout() {
        let temp = assert_fs::TempDir::new().unwrap();
        let data_dir = temp.path().join("data");
        let config = Config::new(data_dir.clone());

        let ctx = CoreContext::open_with(config, Box::new(FixedEmbedder), Box::new(DefaultExtractor)).unwrap();

        assert!(data_dir.join("documents.db").exists());
        assert!(data_dir.join("index").exists());
        assert_eq!(ctx.document_store.count().unwrap(), 0);
    }

    #[test]
    fn searcher_applies_config_weights() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut config = Config::new(temp.path().to_path_buf());
        config.search.full_text_weight = 1.0;
        config.search.semantic_weight = 0.0;

        let ctx = CoreContext::open_with(config, Box::new(FixedEmbedder), Box::new(DefaultExtractor)).unwrap();
        let searcher = ctx.searcher();
        let results = searcher.search(&Query::new("nothing indexed yet", SearchMode::FullText)).unwrap();
        assert!(results.is_empty());
    }
}

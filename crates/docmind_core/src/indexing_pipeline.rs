//! Walks a root folder, drives the extractor, upserts the three stores, and
//! emits progress.

use crate::document_store::DocumentStore;
use crate::embedder::Embedder;
use crate::embedding_store::EmbeddingStore;
use crate::extractor::Extractor;
use crate::inverted_index::InvertedIndex;
use crate::types::{ChangeKind, CompletionStats, Document, ErrorEvent, ProgressEvent, RebuildProgress, RebuildStage};
use docmind_common::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Cooperative cancellation flag, checked at natural boundaries: per file,
/// per batch, between the two sub-queries of Hybrid.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub(crate) const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "xls", "xlsx", "md", "markdown", "txt"];

pub(crate) fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub struct IndexingPipeline<'a> {
    document_store: &'a DocumentStore,
    inverted_index: &'a InvertedIndex,
    embedding_store: &'a EmbeddingStore,
    embedder: &'a dyn Embedder,
    extractor: &'a dyn Extractor,
    batch_size: usize,
    skip_embeddings: bool,
}

impl<'a> IndexingPipeline<'a> {
    pub fn new(
        document_store: &'a DocumentStore,
        inverted_index: &'a InvertedIndex,
        embedding_store: &'a EmbeddingStore,
        embedder: &'a dyn Embedder,
        extractor: &'a dyn Extractor,
        batch_size: usize,
        skip_embeddings: bool,
    ) -> Self {
        Self {
            document_store,
            inverted_index,
            embedding_store,
            embedder,
            extractor,
            batch_size,
            skip_embeddings,
        }
    }

    /// Scan → Process → Indexing finalization → Completed.
    pub fn run(
        &self,
        root: &Path,
        cancel: &CancelToken,
        mut emit: impl FnMut(ProgressEvent),
    ) -> Result<CompletionStats> {
        let start = Instant::now();

        emit(ProgressEvent::Progress(RebuildProgress {
            stage: RebuildStage::Scanning,
            current_file: None,
            files_processed: 0,
            total_files: 0,
            message: None,
        }));

        let paths: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_supported(e.path()))
            .map(|e| e.path().to_path_buf())
            .collect();

        let total_files = paths.len() as u64;
        let mut files_processed: u64 = 0;
        let mut files_failed: u64 = 0;
        let mut documents_added: u64 = 0;

        for chunk in paths.chunks(self.batch_size.max(1)) {
            if cancel.is_cancelled() {
                break;
            }
            for path in chunk {
                if cancel.is_cancelled() {
                    break;
                }

                emit(ProgressEvent::Progress(RebuildProgress {
                    stage: RebuildStage::Processing,
                    current_file: Some(path.clone()),
                    files_processed,
                    total_files,
                    message: None,
                }));

                match self.process_one(path) {
                    Ok(true) => documents_added += 1,
                    Ok(false) => {}
                    Err(e) => {
                        files_failed += 1;
                        emit(ProgressEvent::Error(ErrorEvent {
                            kind: "extraction".to_string(),
                            message: e.to_string(),
                            context: Some(path.display().to_string()),
                        }));
                    }
                }
                files_processed += 1;
            }
        }

        emit(ProgressEvent::Progress(RebuildProgress {
            stage: RebuildStage::Indexing,
            current_file: None,
            files_processed,
            total_files,
            message: Some("finalizing index".to_string()),
        }));

        self.inverted_index.optimize()?;
        if !self.skip_embeddings {
            self.embedding_store.save()?;
        }

        let stats = CompletionStats {
            files_processed,
            files_failed,
            documents_added,
            elapsed_seconds: start.elapsed().as_secs_f64(),
        };

        emit(ProgressEvent::Progress(RebuildProgress {
            stage: RebuildStage::Completed,
            current_file: None,
            files_processed,
            total_files,
            message: None,
        }));
        emit(ProgressEvent::Completed(stats.clone()));

        Ok(stats)
    }

    /// Returns `Ok(true)` if a document was written, `Ok(false)` if skipped
    /// as already up to date. Each file is a unit of failure:
    /// extractor errors are recorded and the run continues.
    fn process_one(&self, path: &Path) -> Result<bool> {
        let id = crate::types::document_id_for_path(path);
        let metadata = std::fs::metadata(path)?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let size = metadata.len();

        if let Some(existing) = self.document_store.get(&id)? {
            if mtime <= existing.indexed_at && size == existing.size {
                return Ok(false);
            }
        }

        let extracted = self
            .extractor
            .process_file(path)
            .map_err(|e| docmind_common::CoreError::Extraction(e.to_string()))?;

        let mut document = Document::new(
            extracted.file_path,
            Some(extracted.title),
            extracted.content,
            extracted.file_type,
            extracted.size,
            extracted.created_at,
            extracted.modified_at,
        );
        document.id = id;

        self.upsert_all(&document)?;
        Ok(true)
    }

    /// Commits to DocumentStore and EmbeddingStore first, InvertedIndex last
    /// so a concurrent searcher never observes a posting for a document the
    /// other two stores don't yet know about.
    fn upsert_all(&self, document: &Document) -> Result<()> {
        self.document_store.upsert(document)?;
        if !self.skip_embeddings {
            self.embedding_store
                .upsert(&document.id, &document.content, self.embedder)?;
        }
        if self.inverted_index.document_exists(&document.id)? {
            self.inverted_index.update(document)?;
        } else {
            self.inverted_index.add(document)?;
        }
        Ok(())
    }

    /// Single-file upsert path used by the ChangeWatcher for Created/Modified
    /// events, bypassing the scan/batch machinery.
    pub fn upsert_single(&self, path: &Path) -> Result<()> {
        self.process_one(path).map(|_| ())
    }

    /// Removes a document from all three stores.
    pub fn remove_path(&self, path: &Path) -> Result<()> {
        let id = crate::types::document_id_for_path(path);
        self.document_store.delete(&id)?;
        self.inverted_index.remove(&id)?;
        self.embedding_store.remove(&id);
        Ok(())
    }

    /// Dispatches one filesystem change event.
    pub fn apply_change(&self, kind: &ChangeKind) -> Result<()> {
        match kind {
            ChangeKind::Created(path) | ChangeKind::Modified(path) => self.upsert_single(path),
            ChangeKind::Deleted(path) => self.remove_path(path),
            ChangeKind::Renamed { from, to } => {
                self.remove_path(from)?;
                self.upsert_single(to)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::Embedder;
    use crate::extractor::DefaultExtractor;

    struct FixedEmbedder;
    impl Embedder for FixedEmbedder {
        fn dimension(&self) -> usize {
            4
        }
        fn encode(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0, 0.0, 0.0])
        }
    }

    fn setup() -> (assert_fs::TempDir, DocumentStore, InvertedIndex, EmbeddingStore) {
        let temp = assert_fs::TempDir::new().unwrap();
        let index_dir = temp.path().join("index");
        std::fs::create_dir_all(&index_dir).unwrap();
        let document_store = DocumentStore::open(&temp.path().join("documents.db")).unwrap();
        let inverted_index = InvertedIndex::open(&index_dir).unwrap();
        let embedding_store = EmbeddingStore::open(&temp.path().join("embeddings.bin"), 4).unwrap();
        (temp, document_store, inverted_index, embedding_store)
    }

    #[test]
    fn run_indexes_supported_files_and_skips_unsupported() {
        let (temp, document_store, inverted_index, embedding_store) = setup();
        let root = temp.path().join("docs");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.txt"), "hello world").unwrap();
        std::fs::write(root.join("ignored.bin"), [0u8, 1, 2]).unwrap();

        let embedder = FixedEmbedder;
        let extractor = DefaultExtractor;
        let pipeline = IndexingPipeline::new(
            &document_store,
            &inverted_index,
            &embedding_store,
            &embedder,
            &extractor,
            100,
            false,
        );
        let cancel = CancelToken::new();
        let stats = pipeline.run(&root, &cancel, |_| {}).unwrap();

        assert_eq!(stats.files_processed, 1);
        assert_eq!(stats.documents_added, 1);
        assert_eq!(document_store.count().unwrap(), 1);
    }

    #[test]
    fn run_records_extractor_failures_without_aborting() {
        let (temp, document_store, inverted_index, embedding_store) = setup();
        let root = temp.path().join("docs");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("ok.txt"), "fine content").unwrap();
        std::fs::write(root.join("bad.txt"), "   \n  ").unwrap(); // Empty per extractor

        let embedder = FixedEmbedder;
        let extractor = DefaultExtractor;
        let pipeline = IndexingPipeline::new(
            &document_store,
            &inverted_index,
            &embedding_store,
            &embedder,
            &extractor,
            100,
            false,
        );
        let cancel = CancelToken::new();
        let stats = pipeline.run(&root, &cancel, |_| {}).unwrap();

        assert_eq!(stats.files_processed, 2);
        assert_eq!(stats.files_failed, 1);
        assert_eq!(stats.documents_added, 1);
    }

    #[test]
    fn cancel_token_stops_processing_between_files() {
        let (temp, document_store, inverted_index, embedding_store) = setup();
        let root = temp.path().join("docs");
        std::fs::create_dir_all(&root).unwrap();
        for i in 0..5 {
            std::fs::write(root.join(format!("f{i}.txt")), "content").unwrap();
        }

        let embedder = FixedEmbedder;
        let extractor = DefaultExtractor;
        let pipeline = IndexingPipeline::new(
            &document_store,
            &inverted_index,
            &embedding_store,
            &embedder,
            &extractor,
            1,
            false,
        );
        let cancel = CancelToken::new();
        cancel.cancel();
        let stats = pipeline.run(&root, &cancel, |_| {}).unwrap();
        assert_eq!(stats.files_processed, 0);
    }

    #[test]
    fn apply_change_deleted_removes_from_all_stores() {
        let (temp, document_store, inverted_index, embedding_store) = setup();
        let path = temp.path().join("note.txt");
        std::fs::write(&path, "content to index").unwrap();

        let embedder = FixedEmbedder;
        let extractor = DefaultExtractor;
        let pipeline = IndexingPipeline::new(
            &document_store,
            &inverted_index,
            &embedding_store,
            &embedder,
            &extractor,
            100,
            false,
        );
        pipeline.upsert_single(&path).unwrap();
        assert_eq!(document_store.count().unwrap(), 1);

        pipeline.apply_change(&ChangeKind::Deleted(path.clone())).unwrap();
        assert_eq!(document_store.count().unwrap(), 0);
        assert!(document_store.get_by_path(&path).unwrap().is_none());
    }

    #[test]
    fn reprocessing_unchanged_file_is_skipped() {
        let (temp, document_store, inverted_index, embedding_store) = setup();
        let path = temp.path().join("note.txt");
        std::fs::write(&path, "content to index").unwrap();

        let embedder = FixedEmbedder;
        let extractor = DefaultExtractor;
        let pipeline = IndexingPipeline::new(
            &document_store,
            &inverted_index,
            &embedding_store,
            &embedder,
            &extractor,
            100,
            false,
        );
        let first = pipeline.process_one(&path).unwrap();
        let second = pipeline.process_one(&path).unwrap();
        assert!(first);
        assert!(!second);
    }
}

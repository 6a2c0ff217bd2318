//! State machine that owns at most one running `IndexingPipeline` run,
//! tracks progress, enforces a timeout, surfaces errors.
//!
//! Cancellation is cooperative (an atomic flag checked by the pipeline), not
//! thread killing, the same preference for polling over interrupting a
//! worker mid-flight as the `watch` command's debounce loop.

use crate::document_store::DocumentStore;
use crate::embedder::Embedder;
use crate::embedding_store::EmbeddingStore;
use crate::extractor::Extractor;
use crate::indexing_pipeline::{CancelToken, IndexingPipeline};
use crate::inverted_index::InvertedIndex;
use crate::types::{CompletionStats, ProgressEvent, RebuildState};
use docmind_common::{CoreError, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

struct Inner {
    state: RebuildState,
    cancel: Option<CancelToken>,
    worker_start: Option<Instant>,
}

/// Coordinates rebuild runs so at most one `IndexingPipeline` is active at a
/// time. Holds the context by shared reference plus its own exclusive lock
/// guarding `RebuildState`.
pub struct RebuildCoordinator {
    inner: Mutex<Inner>,
    timeout_minutes: u64,
}

impl RebuildCoordinator {
    pub fn new(timeout_minutes: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RebuildState::default(),
                cancel: None,
                worker_start: None,
            }),
            timeout_minutes,
        }
    }

    pub fn state(&self) -> RebuildState {
        self.inner.lock().unwrap().state.clone()
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().unwrap().state.is_active
    }

    pub fn is_timeout_exceeded(&self) -> bool {
        self.inner.lock().unwrap().state.is_timeout_exceeded(self.timeout_minutes)
    }

    /// Rejected if a rebuild is already active. The caller is expected to
    /// have already moved this call onto its own worker thread; this method
    /// itself runs the pipeline to completion, checking the wall-clock
    /// timeout at every progress callback the pipeline emits (per file, per
    /// batch) and requesting cooperative cancellation the moment it elapses.
    pub fn start_rebuild(
        &self,
        thread_id: String,
        folder_path: PathBuf,
        document_store: &DocumentStore,
        inverted_index: &InvertedIndex,
        embedding_store: &EmbeddingStore,
        embedder: &dyn Embedder,
        extractor: &dyn Extractor,
        batch_size: usize,
        skip_embeddings: bool,
        on_event: ProgressSink,
    ) -> Result<CompletionStats> {
        let cancel = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state.is_active {
                return Err(CoreError::Validation("a rebuild is already in progress".to_string()));
            }
            inner.state.start(thread_id, folder_path.clone());
            inner.worker_start = Some(Instant::now());
            let cancel = CancelToken::new();
            inner.cancel = Some(cancel.clone());
            cancel
        };

        let timeout = Duration::from_secs(self.timeout_minutes * 60);
        let started_at = Instant::now();
        let timed_out = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let pipeline = IndexingPipeline::new(
            document_store,
            inverted_index,
            embedding_store,
            embedder,
            extractor,
            batch_size,
            skip_embeddings,
        );

        let timed_out_cb = timed_out.clone();
        let cancel_cb = cancel.clone();
        let result = pipeline.run(&folder_path, &cancel, |event| {
            if started_at.elapsed() > timeout {
                cancel_cb.cancel();
                timed_out_cb.store(true, Ordering::SeqCst);
            }
            on_event(decorate(event, started_at));
        });

        // Always reset state back to Idle, whatever the pipeline returned,
        // so a failed or timed-out rebuild never leaves is_active stuck.
        self.finish();

        if timed_out.load(Ordering::SeqCst) {
            on_event(ProgressEvent::Error(crate::types::ErrorEvent {
                kind: "timeout".to_string(),
                message: "timeout exceeded".to_string(),
                context: None,
            }));
            return Err(CoreError::Timeout(timeout));
        }

        result
    }

    /// Requests cancellation and forces state back to Idle; partial stats
    /// are whatever the pipeline had already committed.
    pub fn cancel(&self) {
        let inner = self.inner.lock().unwrap();
        if let Some(cancel) = &inner.cancel {
            cancel.cancel();
        }
    }

    fn finish(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state.reset();
        inner.cancel = None;
        inner.worker_start = None;
    }
}

fn decorate(event: ProgressEvent, started_at: Instant) -> ProgressEvent {
    match event {
        ProgressEvent::Progress(mut progress) => {
            let elapsed = format_elapsed(started_at.elapsed());
            progress.message = Some(match progress.message {
                Some(m) => format!("{m} (elapsed {elapsed})"),
                None => format!("{} (elapsed {elapsed})", progress.display_message()),
            });
            ProgressEvent::Progress(progress)
        }
        other => other,
    }
}

/// `<60s -> "Ns"`, `<3600s -> "Mm Ss"`, else `"Hh Mm"`.
fn format_elapsed(d: Duration) -> String {
    let total_secs = d.as_secs();
    if total_secs < 60 {
        format!("{total_secs}s")
    } else if total_secs < 3600 {
        format!("{}m {}s", total_secs / 60, total_secs % 60)
    } else {
        format!("{}h {}m", total_secs / 3600, (total_secs % 3600) / 60)
    }
}

/// Used by a caller that wants `start_rebuild` dispatched on its own thread
/// pool and polled from elsewhere; exposes just the path-validity guard.
pub fn validate_folder(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(CoreError::Validation(format!("folder does not exist: {}", path.display())));
    }
    if !path.is_dir() {
        return Err(CoreError::Validation(format!("not a directory: {}", path.display())));
    }
    Ok(())
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
    fn successful_rebuild_leaves_state_idle() {
        let (temp, document_store, inverted_index, embedding_store) = setup();
        let root = temp.path().join("docs");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.txt"), "hello").unwrap();

        let coordinator = RebuildCoordinator::new(30);
        let embedder = FixedEmbedder;
        let extractor = DefaultExtractor;
        let stats = coordinator
            .start_rebuild(
                "t1".to_string(),
                root,
                &document_store,
                &inverted_index,
                &embedding_store,
                &embedder,
                &extractor,
                100,
                false,
                Arc::new(|_| {}),
            )
            .unwrap();

        assert_eq!(stats.documents_added, 1);
        assert!(!coordinator.is_active());
    }

    #[test]
    fn concurrent_start_rebuild_is_rejected() {
        let coordinator = RebuildCoordinator::new(30);
        {
            let mut inner = coordinator.inner.lock().unwrap();
            inner.state.start("existing".to_string(), PathBuf::from("/x"));
        }
        let (temp, document_store, inverted_index, embedding_store) = setup();
        let embedder = FixedEmbedder;
        let extractor = DefaultExtractor;
        let err = coordinator
            .start_rebuild(
                "t2".to_string(),
                temp.path().to_path_buf(),
                &document_store,
                &inverted_index,
                &embedding_store,
                &embedder,
                &extractor,
                100,
                false,
                Arc::new(|_| {}),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn format_elapsed_buckets() {
        assert_eq!(format_elapsed(Duration::from_secs(5)), "5s");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_elapsed(Duration::from_secs(3700)), "1h 1m");
    }

    #[test]
    fn validate_folder_rejects_missing_path() {
        let err = validate_folder(Path::new("/definitely/does/not/exist")).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    struct SlowExtractor;
    impl Extractor for SlowExtractor {
        fn process_file(
            &self,
            path: &std::path::Path,
        ) -> std::result::Result<crate::types::Extracted, crate::types::ExtractError> {
            std::thread::sleep(Duration::from_secs(5));
            DefaultExtractor.process_file(path)
        }
    }

    #[test]
    fn rebuild_exceeding_timeout_surfaces_timeout_error_and_resets_state() {
        let (temp, document_store, inverted_index, embedding_store) = setup();
        let root = temp.path().join("docs");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.txt"), "hello").unwrap();
        std::fs::write(root.join("b.txt"), "world").unwrap();

        // timeout_minutes=0 collapses to an immediate timeout window.
        let coordinator = RebuildCoordinator::new(0);
        let embedder = FixedEmbedder;
        let extractor = SlowExtractor;
        let err = coordinator
            .start_rebuild(
                "t3".to_string(),
                root,
                &document_store,
                &inverted_index,
                &embedding_store,
                &embedder,
                &extractor,
                1,
                false,
                Arc::new(|_| {}),
            )
            .unwrap_err();

        assert!(matches!(err, CoreError::Timeout(_)));
        assert!(!coordinator.is_active());

        // A fresh rebuild can start immediately after the timeout clears state.
        let ok = coordinator.start_rebuild(
            "t4".to_string(),
            temp.path().join("docs"),
            &document_store,
            &inverted_index,
            &embedding_store,
            &embedder,
            &DefaultExtractor,
            100,
            false,
            Arc::new(|_| {}),
        );
        assert!(ok.is_ok());
    }
}

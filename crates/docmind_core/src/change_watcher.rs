//! Subscribes to filesystem events from `notify` and schedules incremental
//! upserts/deletes through an `IndexingPipeline`.
//!
//! Filtering, debouncing, and dispatch happen on the thread that calls
//! `run`; a small worker pool applies the resulting `ChangeKind`s so a burst
//! of saves does not serialize behind slow extraction or embedding calls.

use crate::indexing_pipeline::{is_supported, CancelToken, IndexingPipeline};
use crate::types::ChangeKind;
use docmind_common::{CoreError, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_DEBOUNCE_MS: u64 = 500;
const DEFAULT_WORKER_THREADS: usize = 2;
const DEFAULT_MAX_QUEUE_DEPTH: usize = 10_000;
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Clone, Debug)]
pub struct ChangeWatcherConfig {
    pub debounce: Duration,
    pub worker_threads: usize,
    pub max_queue_depth: usize,
}

impl Default for ChangeWatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            worker_threads: DEFAULT_WORKER_THREADS,
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
        }
    }
}

/// Counters surfaced once `run` returns (on cancellation), mostly useful for
/// tests and the `docmind watch` CLI's shutdown summary.
#[derive(Default, Debug, Clone, Copy)]
pub struct WatcherStats {
    pub events_enqueued: usize,
    pub events_dropped: usize,
}

pub struct ChangeWatcher<'a> {
    pipeline: &'a IndexingPipeline<'a>,
    config: ChangeWatcherConfig,
}

impl<'a> ChangeWatcher<'a> {
    pub fn new(pipeline: &'a IndexingPipeline<'a>, config: ChangeWatcherConfig) -> Self {
        Self { pipeline, config }
    }

    /// Watches `root` recursively until `cancel` is set. `data_dir` (the
    /// index/db/embeddings directory) is excluded so the watcher never
    /// reacts to its own writes.
    pub fn run(&self, root: &Path, data_dir: &Path, cancel: &CancelToken) -> Result<WatcherStats> {
        self.run_with(root, data_dir, cancel, |_| {})
    }

    /// Same as `run`, but invokes `on_change` for every change dispatched to
    /// the worker pool — used by tests and by a CLI that wants to print a
    /// line per file.
    pub fn run_with(
        &self,
        root: &Path,
        data_dir: &Path,
        cancel: &CancelToken,
        mut on_change: impl FnMut(&ChangeKind),
    ) -> Result<WatcherStats> {
        let (fs_tx, fs_rx) = mpsc::channel();
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(fs_tx)
            .map_err(|e| CoreError::Indexing(format!("failed to start file watcher: {e}")))?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| CoreError::Indexing(format!("failed to watch {}: {e}", root.display())))?;

        let (work_tx, work_rx) = mpsc::channel::<ChangeKind>();
        let work_rx = Mutex::new(work_rx);
        let queue_depth = AtomicUsize::new(0);
        let dropped = AtomicUsize::new(0);
        let enqueued = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..self.config.worker_threads.max(1) {
                let work_rx = &work_rx;
                let queue_depth = &queue_depth;
                let pipeline = self.pipeline;
                scope.spawn(move || loop {
                    let kind = {
                        let rx = work_rx.lock().unwrap();
                        rx.recv()
                    };
                    match kind {
                        Ok(kind) => {
                            queue_depth.fetch_sub(1, Ordering::SeqCst);
                            if let Err(e) = pipeline.apply_change(&kind) {
                                tracing::warn!(?kind, error = %e, "failed to apply filesystem change");
                            }
                        }
                        Err(_) => break,
                    }
                });
            }

            let mut last_seen: HashMap<PathBuf, Instant> = HashMap::new();

            loop {
                if cancel.is_cancelled() {
                    break;
                }
                match fs_rx.recv_timeout(POLL_INTERVAL) {
                    Ok(Ok(event)) => {
                        for kind in classify(&event) {
                            let path = primary_path(&kind);
                            if !is_relevant(path, data_dir) {
                                continue;
                            }
                            let now = Instant::now();
                            if let Some(last) = last_seen.get(path) {
                                if now.duration_since(*last) < self.config.debounce {
                                    continue;
                                }
                            }
                            last_seen.insert(path.clone(), now);

                            if queue_depth.load(Ordering::SeqCst) >= self.config.max_queue_depth {
                                dropped.fetch_add(1, Ordering::SeqCst);
                                tracing::warn!(
                                    path = %path.display(),
                                    dropped_total = dropped.load(Ordering::SeqCst),
                                    "watcher queue depth exceeded, dropping event"
                                );
                                continue;
                            }

                            on_change(&kind);
                            queue_depth.fetch_add(1, Ordering::SeqCst);
                            enqueued.fetch_add(1, Ordering::SeqCst);
                            if work_tx.send(kind).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Err(e)) => tracing::warn!(error = %e, "watcher reported an error"),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            drop(work_tx);
        });

        Ok(WatcherStats {
            events_enqueued: enqueued.load(Ordering::SeqCst),
            events_dropped: dropped.load(Ordering::SeqCst),
        })
    }
}

fn primary_path(kind: &ChangeKind) -> &PathBuf {
    match kind {
        ChangeKind::Created(p) | ChangeKind::Modified(p) | ChangeKind::Deleted(p) => p,
        ChangeKind::Renamed { to, .. } => to,
    }
}

/// Ignored entirely: `.git`, the watcher's own data directory, and any path
/// whose extension the pipeline would skip anyway.
fn is_relevant(path: &Path, data_dir: &Path) -> bool {
    if path.starts_with(data_dir) {
        return false;
    }
    if path.components().any(|c| c.as_os_str() == ".git") {
        return false;
    }
    is_supported(path)
}

/// Maps a raw `notify::Event` to zero or more `ChangeKind`s. Renames are
/// recognized when the platform delivers them as a single `Modify(Name(Both))`
/// event carrying both paths; everything else falls back to checking whether
/// the path still exists, matching how a save-as or atomic-replace editor
/// write is observed.
fn classify(event: &notify::Event) -> Vec<ChangeKind> {
    match &event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            vec![ChangeKind::Renamed {
                from: event.paths[0].clone(),
                to: event.paths[1].clone(),
            }]
        }
        EventKind::Remove(_) => event.paths.iter().cloned().map(ChangeKind::Deleted).collect(),
        EventKind::Create(_) => event.paths.iter().cloned().map(ChangeKind::Created).collect(),
        _ => event
            .paths
            .iter()
            .cloned()
            .map(|p| if p.exists() { ChangeKind::Modified(p) } else { ChangeKind::Deleted(p) })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::DocumentStore;
    use crate::embedder::Embedder;
    use crate::embedding_store::EmbeddingStore;
    use crate::extractor::DefaultExtractor;
    use crate::inverted_index::InvertedIndex;

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
    fn ignores_data_dir_and_unsupported_extensions() {
        let data_dir = Path::new("/repo/.docmind");
        assert!(!is_relevant(Path::new("/repo/.docmind/documents.db"), data_dir));
        assert!(!is_relevant(Path::new("/repo/.git/HEAD"), data_dir));
        assert!(!is_relevant(Path::new("/repo/notes.bin"), data_dir));
        assert!(is_relevant(Path::new("/repo/notes.md"), data_dir));
    }

    #[test]
    fn watcher_picks_up_a_created_file_and_can_be_cancelled() {
        let temp = assert_fs::TempDir::new().unwrap();
        let root = temp.path().join("docs");
        std::fs::create_dir_all(&root).unwrap();
        let data_dir = temp.path().join(".docmind");
        std::fs::create_dir_all(&data_dir).unwrap();

        let document_store = DocumentStore::open(&data_dir.join("documents.db")).unwrap();
        let index_dir = data_dir.join("index");
        std::fs::create_dir_all(&index_dir).unwrap();
        let inverted_index = InvertedIndex::open(&index_dir).unwrap();
        let embedding_store = EmbeddingStore::open(&data_dir.join("embeddings.bin"), 4).unwrap();
        let embedder = FixedEmbedder;
        let extractor = DefaultExtractor;
        let pipeline = IndexingPipeline::new(
            &document_store,
            &inverted_index,
            &embedding_store,
            &embedder,
            &extractor,
            10,
            false,
        );

        let watcher = ChangeWatcher::new(
            &pipeline,
            ChangeWatcherConfig {
                debounce: Duration::from_millis(10),
                worker_threads: 1,
                max_queue_depth: 100,
            },
        );
        let cancel = CancelToken::new();

        std::thread::scope(|scope| {
            let cancel_for_writer = cancel.clone();
            let root_for_writer = root.clone();
            scope.spawn(move || {
                std::thread::sleep(Duration::from_millis(150));
                std::fs::write(root_for_writer.join("a.md"), "# hello\nworld").unwrap();
                std::thread::sleep(Duration::from_millis(500));
                cancel_for_writer.cancel();
            });

            let stats = watcher.run(&root, &data_dir, &cancel).unwrap();
            assert!(stats.events_enqueued >= 1);
        });

        assert_eq!(document_store.count().unwrap(), 1);
    }
}

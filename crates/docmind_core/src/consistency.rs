//! Referential-integrity sweep across the three stores, run once at startup
//!.
//!
//! `DocumentStore` is the source of truth for "what exists";
//! `InvertedIndex` and `EmbeddingStore` postings that outlive their
//! `DocumentStore` row are leftovers from a crash between the three writes
//! in `IndexingPipeline::upsert_all` and are simply dropped here.

use crate::document_store::DocumentStore;
use crate::embedding_store::EmbeddingStore;
use crate::inverted_index::InvertedIndex;
use docmind_common::Result;

/// Counts of what the sweep found and acted on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub dangling_index_entries_removed: usize,
    pub dangling_embedding_entries_removed: usize,
    pub orphaned_documents_found: usize,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Runs the sweep. Safe to call at any time, not just startup: it is
/// idempotent and only ever removes entries, never content, so running it
/// twice in a row is a no-op the second time.
pub fn sweep(
    document_store: &DocumentStore,
    inverted_index: &InvertedIndex,
    embedding_store: &EmbeddingStore,
) -> Result<ConsistencyReport> {
    let mut report = ConsistencyReport::default();

    for id in inverted_index.all_ids()? {
        if document_store.get(&id)?.is_none() {
            inverted_index.remove(&id)?;
            report.dangling_index_entries_removed += 1;
            tracing::warn!(id, "removed dangling InvertedIndex entry with no DocumentStore row");
        }
    }
    if report.dangling_index_entries_removed > 0 {
        inverted_index.optimize()?;
    }

    for id in embedding_store.all_ids() {
        if document_store.get(&id)?.is_none() {
            embedding_store.remove(&id);
            report.dangling_embedding_entries_removed += 1;
            tracing::warn!(id, "removed dangling EmbeddingStore entry with no DocumentStore row");
        }
    }
    if report.dangling_embedding_entries_removed > 0 {
        embedding_store.save()?;
    }

    // The reverse direction (a DocumentStore row whose InvertedIndex posting
    // never landed) cannot be repaired here: DocumentStore never persists
    // body text, so there is nothing to re-post. It is only
    // logged; the recovery path is a full rebuild of that folder.
    for document in document_store.list(None, None)? {
        if !inverted_index.document_exists(&document.id)? {
            report.orphaned_documents_found += 1;
            tracing::warn!(
                id = document.id,
                path = %document.file_path.display(),
                "DocumentStore row has no InvertedIndex posting; a rebuild will repair it"
            );
        }
    }

    Ok(report)
}

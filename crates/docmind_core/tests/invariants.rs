//! Randomized invariant checks driving the three stores and the fusion
//! weights through long sequences of operations, rather than one example
//! at a time. Seeded so a failure is reproducible.

use docmind_core::document_store::DocumentStore;
use docmind_core::embedder::Embedder;
use docmind_core::embedding_store::EmbeddingStore;
use docmind_core::inverted_index::InvertedIndex;
use docmind_core::searcher::Searcher;
use docmind_core::types::{Document, FileType, Query, SearchMode, SearchWeights};
use docmind_common::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::path::PathBuf;

struct FixedEmbedder {
    dimension: usize,
}

impl Embedder for FixedEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0_f32; self.dimension];
        for (i, b) in text.bytes().enumerate() {
            v[i % self.dimension] += b as f32;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        Ok(v)
    }
}

struct Stores {
    _temp: assert_fs::TempDir,
    document_store: DocumentStore,
    inverted_index: InvertedIndex,
    embedding_store: EmbeddingStore,
    embedder: FixedEmbedder,
}

fn open_stores() -> Stores {
    let temp = assert_fs::TempDir::new().unwrap();
    let index_dir = temp.path().join("index");
    std::fs::create_dir_all(&index_dir).unwrap();
    let document_store = DocumentStore::open(&temp.path().join("documents.db")).unwrap();
    let inverted_index = InvertedIndex::open(&index_dir).unwrap();
    let embedding_store = EmbeddingStore::open(&temp.path().join("embeddings.bin"), 8).unwrap();
    Stores {
        _temp: temp,
        document_store,
        inverted_index,
        embedding_store,
        embedder: FixedEmbedder { dimension: 8 },
    }
}

fn doc_for_slot(slot: usize, variant: u32) -> Document {
    Document::new(
        PathBuf::from(format!("/docs/slot-{slot}.txt")),
        Some(format!("Slot {slot}")),
        format!("synthetic content for slot {slot} variant {variant} fox dog cat"),
        FileType::Text,
        64,
        1_000 + slot as i64,
        1_000 + slot as i64,
    )
}

/// Mirrors `IndexingPipeline::upsert_all`'s commit order: DocumentStore and
/// EmbeddingStore land before the InvertedIndex posting becomes visible.
fn apply_upsert(stores: &Stores, doc: &Document) {
    stores.document_store.upsert(doc).unwrap();
    stores
        .embedding_store
        .upsert(&doc.id, &doc.content, &stores.embedder)
        .unwrap();
    if stores.inverted_index.document_exists(&doc.id).unwrap() {
        stores.inverted_index.update(doc).unwrap();
    } else {
        stores.inverted_index.add(doc).unwrap();
    }
}

/// Mirrors `IndexingPipeline::remove_path`.
fn apply_delete(stores: &Stores, id: &str) {
    stores.document_store.delete(id).unwrap();
    stores.inverted_index.remove(id).unwrap();
    stores.embedding_store.remove(id);
}

fn assert_three_stores_agree(stores: &Stores, live_ids: &HashSet<String>) {
    assert_eq!(stores.document_store.count().unwrap(), live_ids.len() as u64);

    for id in live_ids {
        assert!(stores.document_store.get(id).unwrap().is_some(), "missing DocumentStore row for {id}");
        assert!(stores.inverted_index.document_exists(id).unwrap(), "missing InvertedIndex posting for {id}");
        assert!(stores.embedding_store.contains(id), "missing EmbeddingStore entry for {id}");
    }

    for id in stores.inverted_index.all_ids().unwrap() {
        assert!(live_ids.contains(&id), "InvertedIndex has dangling posting for {id}");
    }
    for id in stores.embedding_store.all_ids() {
        assert!(live_ids.contains(&id), "EmbeddingStore has dangling entry for {id}");
    }
}

/// Drives `N` upsert/delete operations over a fixed pool of document slots
/// and checks the three stores agree on exactly the live set after every
/// operation, not just at the end.
#[test]
fn random_upsert_delete_sequences_keep_the_three_stores_in_sync() {
    const POOL_SIZE: usize = 40;
    const STEPS: usize = 600;

    let stores = open_stores();
    let mut rng = StdRng::seed_from_u64(0xD0C_1D);
    let mut live_ids: HashSet<String> = HashSet::new();
    let mut slot_ids: Vec<Option<String>> = vec![None; POOL_SIZE];

    for step in 0..STEPS {
        let slot = rng.gen_range(0..POOL_SIZE);
        let delete = slot_ids[slot].is_some() && rng.gen_bool(0.35);

        if delete {
            let id = slot_ids[slot].take().unwrap();
            apply_delete(&stores, &id);
            live_ids.remove(&id);
        } else {
            let variant = rng.gen_range(0..1000);
            let doc = doc_for_slot(slot, variant);
            apply_upsert(&stores, &doc);
            slot_ids[slot] = Some(doc.id.clone());
            live_ids.insert(doc.id);
        }

        if step % 25 == 0 || step == STEPS - 1 {
            assert_three_stores_agree(&stores, &live_ids);
        }
    }

    assert_three_stores_agree(&stores, &live_ids);
}

/// For any query against a randomly populated index, a result set never
/// contains the same document id twice, regardless of mode or limit.
#[test]
fn search_results_never_repeat_a_document_id() {
    const POOL_SIZE: usize = 25;

    let stores = open_stores();
    let mut rng = StdRng::seed_from_u64(0x5EA_CCH);

    for slot in 0..POOL_SIZE {
        let doc = doc_for_slot(slot, 0);
        apply_upsert(&stores, &doc);
    }

    let searcher = Searcher::new(
        &stores.document_store,
        &stores.inverted_index,
        &stores.embedding_store,
        &stores.embedder,
    );
    searcher.update_min_semantic_similarity(-1.0);

    for mode in [SearchMode::FullText, SearchMode::Semantic, SearchMode::Hybrid] {
        for _ in 0..20 {
            let limit = rng.gen_range(1..=POOL_SIZE as u32 * 2);
            let mut query = Query::new("fox dog cat", mode);
            query.limit = limit;
            let results = searcher.search(&query).unwrap();

            let mut seen = HashSet::new();
            for r in &results {
                assert!(seen.insert(r.document.id.clone()), "duplicate document id {} in a {:?} result set", r.document.id, mode);
            }
            assert!(results.len() as u32 <= limit);
        }
    }
}

/// `SearchWeights::normalized` always returns weights summing to 1 when the
/// inputs are positive, and falls back to the documented defaults when both
/// are zero, across a wide random range of inputs.
#[test]
fn normalized_weights_always_sum_to_one_or_fall_back_to_defaults() {
    let mut rng = StdRng::seed_from_u64(0x5E1G_H75);

    for _ in 0..500 {
        let full_text: f32 = rng.gen_range(0.0..10.0);
        let semantic: f32 = rng.gen_range(0.0..10.0);
        let weights = SearchWeights::normalized(full_text, semantic);

        if full_text + semantic > 0.0 {
            assert!((weights.full_text + weights.semantic - 1.0).abs() < 1e-5);
        } else {
            assert_eq!(weights, SearchWeights::default());
        }
    }

    assert_eq!(SearchWeights::normalized(0.0, 0.0), SearchWeights::default());
}

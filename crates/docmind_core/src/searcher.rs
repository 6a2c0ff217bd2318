//! Fusion layer: executes FullText/Semantic/Hybrid queries and merges
//! rankings into `SearchResult`s.

use crate::document_store::DocumentStore;
use crate::embedder::Embedder;
use crate::embedding_store::EmbeddingStore;
use crate::inverted_index::{IndexFilters, InvertedIndex, RAW_SCORE_DIVISOR};
use crate::suggestion_index::SuggestionIndex;
use crate::types::{Document, ModeUsed, Query, SearchMode, SearchResult, SearchWeights};
use docmind_common::{CoreError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Runtime-mutable fusion settings.
#[derive(Debug, Clone)]
pub struct SearcherSettings {
    pub weights: SearchWeights,
    pub min_semantic_similarity: f32,
    pub snippet_max_length: usize,
}

impl Default for SearcherSettings {
    fn default() -> Self {
        Self {
            weights: SearchWeights::default(),
            min_semantic_similarity: 0.1,
            snippet_max_length: 200,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    pub indexed_documents: u64,
    pub cached_embeddings: usize,
    pub suggestion_terms: usize,
    pub suggestion_cache_size: usize,
    pub default_weights: SearchWeights,
}

struct Candidate {
    document: Document,
    score: f32,
    snippet: String,
    highlighted_terms: Vec<String>,
}

pub struct Searcher<'a> {
    document_store: &'a DocumentStore,
    inverted_index: &'a InvertedIndex,
    embedding_store: &'a EmbeddingStore,
    embedder: &'a dyn Embedder,
    suggestions: SuggestionIndex,
    settings: RwLock<SearcherSettings>,
}

impl<'a> Searcher<'a> {
    pub fn new(
        document_store: &'a DocumentStore,
        inverted_index: &'a InvertedIndex,
        embedding_store: &'a EmbeddingStore,
        embedder: &'a dyn Embedder,
    ) -> Self {
        Self {
            document_store,
            inverted_index,
            embedding_store,
            embedder,
            suggestions: SuggestionIndex::new(),
            settings: RwLock::new(SearcherSettings::default()),
        }
    }

    pub fn settings(&self) -> SearcherSettings {
        self.settings.read().unwrap().clone()
    }

    pub fn update_weights(&self, full_text_weight: f32, semantic_weight: f32) {
        let mut settings = self.settings.write().unwrap();
        settings.weights = SearchWeights::normalized(full_text_weight, semantic_weight);
    }

    pub fn update_min_semantic_similarity(&self, value: f32) {
        self.settings.write().unwrap().min_semantic_similarity = value;
    }

    pub fn update_snippet_max_length(&self, value: usize) {
        self.settings.write().unwrap().snippet_max_length = value;
    }

    pub fn search(&self, query: &Query) -> Result<Vec<SearchResult>> {
        let settings = self.settings();
        let results = match query.mode {
            SearchMode::FullText => self.search_full_text(query, query.limit as usize, &settings)?,
            SearchMode::Semantic => self.search_semantic(query, query.limit as usize, &settings)?,
            SearchMode::Hybrid => self.search_hybrid(query, &settings)?,
        };
        Ok(self.post_process(results, query))
    }

    fn index_filters(&self, query: &Query) -> IndexFilters {
        IndexFilters {
            file_types: query
                .file_types
                .as_ref()
                .map(|types| types.iter().map(|t| t.as_str().to_string()).collect()),
            modified_from: query.date_from,
            modified_to: query.date_to,
        }
    }

    fn search_full_text(
        &self,
        query: &Query,
        limit: usize,
        settings: &SearcherSettings,
    ) -> Result<Vec<Candidate>> {
        let filters = self.index_filters(query);
        let hits = self.inverted_index.query(&query.text, limit, &filters)?;
        let terms = self.inverted_index.extract_query_terms(&query.text);

        Ok(hits
            .into_iter()
            .map(|hit| {
                let score = (hit.raw_score / RAW_SCORE_DIVISOR).min(1.0);
                let snippet = self
                    .inverted_index
                    .snippet(&hit.content, &query.text, settings.snippet_max_length);
                let document = Document {
                    id: hit.id,
                    file_path: hit.file_path.into(),
                    title: hit.title,
                    content: hit.content,
                    file_type: crate::types::FileType::parse(&hit.file_type),
                    size: hit.size,
                    created_at: hit.created_date,
                    modified_at: hit.modified_date,
                    indexed_at: hit.indexed_date,
                    content_hash: hit.content_hash,
                    metadata: Default::default(),
                };
                Candidate {
                    document,
                    score,
                    snippet,
                    highlighted_terms: terms.clone(),
                }
            })
            .collect())
    }

    fn search_semantic(
        &self,
        query: &Query,
        limit: usize,
        settings: &SearcherSettings,
    ) -> Result<Vec<Candidate>> {
        let min_similarity = settings.min_semantic_similarity;
        let hits = self
            .embedding_store
            .search_similar(&query.text, limit, min_similarity, self.embedder)
            .map_err(|e| CoreError::Search {
                component: "semantic".to_string(),
                message: e.to_string(),
            })?;

        let terms = self.inverted_index.extract_query_terms(&query.text);
        let mut candidates = Vec::with_capacity(hits.len());
        for (doc_id, score) in hits {
            let Some(mut document) = self.document_store.get(&doc_id)? else {
                continue;
            };
            // DocumentStore never persists body text; InvertedIndex does, so
            // pull content from there to hydrate the Result the caller sees.
            if let Some(posting) = self.inverted_index.get_by_id(&doc_id)? {
                document.content = posting.content;
            }
            let snippet = truncate_prefix(&document.content, settings.snippet_max_length);
            candidates.push(Candidate {
                document,
                score,
                snippet,
                highlighted_terms: terms.clone(),
            });
        }
        Ok(candidates)
    }

    fn search_hybrid(&self, query: &Query, settings: &SearcherSettings) -> Result<Vec<Candidate>> {
        let broad_limit = (query.limit as usize).saturating_mul(2).max(1);
        let weights = query.weights.unwrap_or(settings.weights);

        // The two sub-queries touch independent stores (InvertedIndex vs.
        // EmbeddingStore), so they run on rayon's pool instead of one after
        // the other.
        let (full_text_result, semantic_result) = rayon::join(
            || self.search_full_text(query, broad_limit, settings),
            || self.search_semantic(query, broad_limit, settings),
        );

        let full_text = full_text_result.unwrap_or_default();
        let semantic = match semantic_result {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!("semantic sub-query degraded in hybrid search: {}", e);
                Vec::new()
            }
        };

        let mut fts_by_id: HashMap<String, Candidate> = HashMap::new();
        for c in full_text {
            fts_by_id.insert(c.document.id.clone(), c);
        }
        let mut sem_by_id: HashMap<String, Candidate> = HashMap::new();
        for c in semantic {
            sem_by_id.insert(c.document.id.clone(), c);
        }

        let mut ids: Vec<String> = fts_by_id.keys().cloned().collect();
        for id in sem_by_id.keys() {
            if !fts_by_id.contains_key(id) {
                ids.push(id.clone());
            }
        }

        let mut combined = Vec::with_capacity(ids.len());
        for id in ids {
            let fts = fts_by_id.get(&id);
            let sem = sem_by_id.get(&id);

            let fts_score = fts.map(|c| c.score).unwrap_or(0.0);
            let sem_score = sem.map(|c| c.score).unwrap_or(0.0);
            let score = fts_score * weights.full_text + sem_score * weights.semantic;

            let document = fts
                .map(|c| c.document.clone())
                .or_else(|| sem.map(|c| c.document.clone()))
                .expect("id present in at least one map");

            let snippet = match (fts, sem) {
                (Some(a), Some(b)) => {
                    if a.snippet.len() >= b.snippet.len() {
                        a.snippet.clone()
                    } else {
                        b.snippet.clone()
                    }
                }
                (Some(a), None) => a.snippet.clone(),
                (None, Some(b)) => b.snippet.clone(),
                (None, None) => String::new(),
            };

            let mut terms: HashSet<String> = HashSet::new();
            if let Some(c) = fts {
                terms.extend(c.highlighted_terms.iter().cloned());
            }
            if let Some(c) = sem {
                terms.extend(c.highlighted_terms.iter().cloned());
            }

            combined.push(Candidate {
                document,
                score,
                snippet,
                highlighted_terms: terms.into_iter().collect(),
            });
        }

        combined.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(combined)
    }

    fn post_process(&self, mut candidates: Vec<Candidate>, query: &Query) -> Vec<SearchResult> {
        let mut seen = HashSet::new();
        candidates.retain(|c| seen.insert(c.document.id.clone()));

        if let Some(prefixes) = &query.folder_paths {
            candidates.retain(|c| {
                let path = c.document.file_path.to_string_lossy();
                prefixes.iter().any(|p| path.starts_with(p.as_str()))
            });
        }

        if let Some(from) = query.date_from {
            candidates.retain(|c| c.document.modified_at >= from);
        }
        if let Some(to) = query.date_to {
            candidates.retain(|c| c.document.modified_at <= to);
        }

        candidates.truncate(query.limit as usize);

        candidates
            .into_iter()
            .enumerate()
            .map(|(i, c)| {
                let mode_used: ModeUsed = query.mode;
                let relevance_explanation = explanation_for(query.mode, c.score);
                SearchResult {
                    document: c.document,
                    score: c.score,
                    mode_used,
                    snippet: c.snippet,
                    highlighted_terms: c.highlighted_terms,
                    relevance_explanation,
                    rank: (i + 1) as u32,
                }
            })
            .collect()
    }

    pub fn rebuild_suggestions<'b, I>(&self, texts: I)
    where
        I: IntoIterator<Item = &'b str>,
    {
        self.suggestions.rebuild(texts);
    }

    pub fn get_suggestions(&self, prefix: &str, limit: usize) -> Vec<String> {
        if !self.suggestions.is_built() {
            if let Ok(docs) = self.document_store.list(None, None) {
                let owned: Vec<String> = docs
                    .iter()
                    .flat_map(|d| [d.title.clone(), d.content.clone()])
                    .collect();
                let refs: Vec<&str> = owned.iter().map(|s| s.as_str()).collect();
                self.suggestions.rebuild(refs);
            }
        }
        self.suggestions.get_suggestions(prefix, limit)
    }

    pub fn search_stats(&self) -> Result<SearchStats> {
        Ok(SearchStats {
            indexed_documents: self.inverted_index.document_count()?,
            cached_embeddings: self.embedding_store.len(),
            suggestion_terms: self.suggestions.term_count(),
            suggestion_cache_size: self.suggestions.cache_size(),
            default_weights: self.settings().weights,
        })
    }
}

fn truncate_prefix(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let truncated: String = content.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", truncated)
}

fn explanation_for(mode: SearchMode, score: f32) -> String {
    match mode {
        SearchMode::FullText => format!("full_text score={:.4}", score),
        SearchMode::Semantic => format!("semantic similarity={:.4}", score),
        SearchMode::Hybrid => format!("hybrid combined={:.4}", score),
    }
}

//! On-disk lexical inverted index over title + body.
//!
//! Backed by `tantivy`: a single exclusive `IndexWriter` per batch, unlimited
//! concurrent `IndexReader` snapshots. `content_ngram` is tokenized with a
//! character n-gram (2-4) analyzer so CJK substrings are matchable the way a
//! word-boundary tokenizer alone can't manage.

use crate::types::Document;
use docmind_common::{CoreError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query as TantivyQuery, QueryParser, RangeQuery, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, SchemaBuilder, Value, FAST, STORED, STRING, TEXT,
};
use tantivy::tokenizer::NgramTokenizer;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

/// The raw→normalized score divisor.
/// Kept as the original empirical value from `index_manager.py`'s `hit.score / 10.0`.
pub const RAW_SCORE_DIVISOR: f32 = 10.0;

const WRITER_HEAP_BYTES: usize = 50_000_000;

#[derive(Clone, Copy)]
struct Fields {
    id: Field,
    file_path: Field,
    title: Field,
    content: Field,
    content_ngram: Field,
    file_type: Field,
    size: Field,
    created_date: Field,
    modified_date: Field,
    indexed_date: Field,
    content_hash: Field,
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = SchemaBuilder::new();
    let id = builder.add_text_field("id", STRING | STORED);
    let file_path = builder.add_text_field("file_path", TEXT | STORED);
    let title = builder.add_text_field("title", TEXT | STORED);
    let content = builder.add_text_field("content", TEXT | STORED);
    let content_ngram = builder.add_text_field(
        "content_ngram",
        tantivy::schema::TextOptions::default().set_indexing_options(
            tantivy::schema::TextFieldIndexing::default()
                .set_tokenizer("ngram")
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        ),
    );
    let file_type = builder.add_text_field("file_type", STRING | STORED);
    let size = builder.add_u64_field("size", STORED | FAST);
    let created_date = builder.add_i64_field("created_date", STORED | FAST);
    let modified_date = builder.add_i64_field("modified_date", STORED | FAST);
    let indexed_date = builder.add_i64_field("indexed_date", STORED | FAST);
    let content_hash = builder.add_text_field("content_hash", STRING | STORED);

    (
        builder.build(),
        Fields {
            id,
            file_path,
            title,
            content,
            content_ngram,
            file_type,
            size,
            created_date,
            modified_date,
            indexed_date,
            content_hash,
        },
    )
}

/// One ranked hit; carries every stored field so the Searcher can hydrate a
/// full `Document` (with body text) without a second round-trip.
#[derive(Debug, Clone)]
pub struct Hit {
    pub id: String,
    pub raw_score: f32,
    pub file_path: String,
    pub title: String,
    pub content: String,
    pub file_type: String,
    pub size: u64,
    pub created_date: i64,
    pub modified_date: i64,
    pub indexed_date: i64,
    pub content_hash: String,
}

/// Filter predicates applied alongside the text query.
#[derive(Debug, Clone, Default)]
pub struct IndexFilters {
    pub file_types: Option<Vec<String>>,
    pub modified_from: Option<i64>,
    pub modified_to: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub document_count: u64,
    pub index_size_bytes: u64,
    pub last_modified: Option<i64>,
}

pub struct InvertedIndex {
    dir_path: PathBuf,
    schema: Schema,
    fields: Fields,
    index: Index,
    reader: RwLock<IndexReader>,
    writer: Arc<RwLock<IndexWriter>>,
}

impl InvertedIndex {
    pub fn open(dir_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir_path)?;
        let (schema, fields) = build_schema();

        let index = if directory_has_index(dir_path) {
            Index::open_in_dir(dir_path).map_err(|e| CoreError::Indexing(e.to_string()))?
        } else {
            let directory = MmapDirectory::open(dir_path).map_err(|e| CoreError::Indexing(e.to_string()))?;
            Index::create(directory, schema.clone(), tantivy::IndexSettings::default())
                .map_err(|e| CoreError::Indexing(e.to_string()))?
        };
        index
            .tokenizers()
            .register("ngram", NgramTokenizer::new(2, 4, false).map_err(|e| CoreError::Indexing(e.to_string()))?);

        let writer = index
            .writer(WRITER_HEAP_BYTES)
            .map_err(|e| CoreError::Indexing(e.to_string()))?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e: tantivy::TantivyError| CoreError::Indexing(e.to_string()))?;

        Ok(Self {
            dir_path: dir_path.to_path_buf(),
            schema,
            fields,
            index,
            reader: RwLock::new(reader),
            writer: Arc::new(RwLock::new(writer)),
        })
    }

    fn to_tantivy_doc(&self, document: &Document) -> TantivyDocument {
        let f = self.fields;
        doc!(
            f.id => document.id.clone(),
            f.file_path => document.file_path.to_string_lossy().to_string(),
            f.title => document.title.clone(),
            f.content => document.content.clone(),
            f.content_ngram => document.content.clone(),
            f.file_type => document.file_type.as_str().to_string(),
            f.size => document.size,
            f.created_date => document.created_at,
            f.modified_date => document.modified_at,
            f.indexed_date => document.indexed_at,
            f.content_hash => document.content_hash.clone(),
        )
    }

    pub fn add(&self, document: &Document) -> Result<()> {
        let tdoc = self.to_tantivy_doc(document);
        let mut writer = self.writer.write().unwrap();
        writer
            .add_document(tdoc)
            .map_err(|e| CoreError::Indexing(e.to_string()))?;
        writer.commit().map_err(|e| CoreError::Indexing(e.to_string()))?;
        Ok(())
    }

    /// Atomic replace on id: delete then add within one writer critical section.
    pub fn update(&self, document: &Document) -> Result<()> {
        let tdoc = self.to_tantivy_doc(document);
        let mut writer = self.writer.write().unwrap();
        writer.delete_term(Term::from_field_text(self.fields.id, &document.id));
        writer
            .add_document(tdoc)
            .map_err(|e| CoreError::Indexing(e.to_string()))?;
        writer.commit().map_err(|e| CoreError::Indexing(e.to_string()))?;
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        let mut writer = self.writer.write().unwrap();
        writer.delete_term(Term::from_field_text(self.fields.id, id));
        writer.commit().map_err(|e| CoreError::Indexing(e.to_string()))?;
        Ok(())
    }

    /// Preferred path: close, delete the directory, re-create an empty schema.
    /// Falls back to a per-document delete-all-term sweep if the directory
    /// removal fails (e.g. a file handle is still held open on Windows).
    pub fn clear(&self) -> Result<()> {
        {
            let mut writer = self.writer.write().unwrap();
            match writer.delete_all_documents() {
                Ok(_) => {
                    writer.commit().map_err(|e| CoreError::Indexing(e.to_string()))?;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("delete_all_documents failed, falling back: {}", e);
                }
            }
        }
        Ok(())
    }

    pub fn optimize(&self) -> Result<()> {
        let mut writer = self.writer.write().unwrap();
        writer
            .garbage_collect_files()
            .map(|_| ())
            .map_err(|e| CoreError::Indexing(e.to_string()))
    }

    /// Parses `text` against title (boosted 2.0)/content/content_ngram,
    /// intersects with `filters`, scores with tantivy's built-in BM25.
    pub fn query(&self, text: &str, limit: usize, filters: &IndexFilters) -> Result<Vec<Hit>> {
        let reader = self.reader.read().unwrap();
        let searcher = reader.searcher();

        let mut parser = QueryParser::for_index(
            &self.index,
            vec![self.fields.title, self.fields.content, self.fields.content_ngram],
        );
        parser.set_field_boost(self.fields.title, 2.0);
        let text_query = parser
            .parse_query(text)
            .map_err(|e| CoreError::Search {
                component: "full_text".to_string(),
                message: e.to_string(),
            })?;

        let mut clauses: Vec<(Occur, Box<dyn TantivyQuery>)> = vec![(Occur::Must, text_query)];

        if let Some(types) = &filters.file_types {
            if !types.is_empty() {
                let type_clauses: Vec<(Occur, Box<dyn TantivyQuery>)> = types
                    .iter()
                    .map(|t| {
                        let term = Term::from_field_text(self.fields.file_type, t);
                        let q: Box<dyn TantivyQuery> =
                            Box::new(TermQuery::new(term, IndexRecordOption::Basic));
                        (Occur::Should, q)
                    })
                    .collect();
                clauses.push((Occur::Must, Box::new(BooleanQuery::new(type_clauses))));
            }
        }

        if filters.modified_from.is_some() || filters.modified_to.is_some() {
            let lower = filters.modified_from.unwrap_or(i64::MIN);
            let upper = filters.modified_to.unwrap_or(i64::MAX);
            clauses.push((
                Occur::Must,
                Box::new(RangeQuery::new_i64_bounds(
                    "modified_date".to_string(),
                    std::ops::Bound::Included(lower),
                    std::ops::Bound::Included(upper),
                )),
            ));
        }

        let query: Box<dyn TantivyQuery> = if clauses.len() == 1 {
            clauses.into_iter().next().unwrap().1
        } else {
            Box::new(BooleanQuery::new(clauses))
        };

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(|e| CoreError::Search {
                component: "full_text".to_string(),
                message: e.to_string(),
            })?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let retrieved: TantivyDocument = searcher
                .doc(addr)
                .map_err(|e| CoreError::Search {
                    component: "full_text".to_string(),
                    message: e.to_string(),
                })?;
            hits.push(self.hit_from_doc(&retrieved, score));
        }
        Ok(hits)
    }

    fn field_text(&self, doc: &TantivyDocument, field: Field) -> String {
        doc.get_first(field)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    fn field_i64(&self, doc: &TantivyDocument, field: Field) -> i64 {
        doc.get_first(field).and_then(|v| v.as_i64()).unwrap_or(0)
    }

    fn field_u64(&self, doc: &TantivyDocument, field: Field) -> u64 {
        doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0)
    }

    fn hit_from_doc(&self, retrieved: &TantivyDocument, score: f32) -> Hit {
        let f = self.fields;
        Hit {
            id: self.field_text(retrieved, f.id),
            raw_score: score,
            file_path: self.field_text(retrieved, f.file_path),
            title: self.field_text(retrieved, f.title),
            content: self.field_text(retrieved, f.content),
            file_type: self.field_text(retrieved, f.file_type),
            size: self.field_u64(retrieved, f.size),
            created_date: self.field_i64(retrieved, f.created_date),
            modified_date: self.field_i64(retrieved, f.modified_date),
            indexed_date: self.field_i64(retrieved, f.indexed_date),
            content_hash: self.field_text(retrieved, f.content_hash),
        }
    }

    /// Extracts a window of `content` around the highest-scoring matched
    /// region, surrounded by ~50 chars of context, HTML-stripped, truncated
    /// with an ellipsis.
    pub fn snippet(&self, content: &str, query_text: &str, max_chars: usize) -> String {
        let stripped = strip_html_tags(content);
        let terms = extract_query_terms(query_text);

        let lower = stripped.to_lowercase();
        let best_pos = terms
            .iter()
            .filter_map(|t| lower.find(&t.to_lowercase()))
            .min();

        match best_pos {
            Some(pos) => {
                let start = pos.saturating_sub(50);
                let start = floor_char_boundary(&stripped, start);
                let end = (pos + max_chars.saturating_sub(50).max(max_chars / 2)).min(stripped.len());
                let end = ceil_char_boundary(&stripped, end.max(start));
                let mut snippet = stripped[start..end].to_string();
                if start > 0 {
                    snippet = format!("...{}", snippet);
                }
                if end < stripped.len() {
                    snippet = format!("{}...", snippet);
                }
                truncate_chars(&snippet, max_chars)
            }
            None => truncate_chars(&stripped, max_chars),
        }
    }

    /// Alphanumeric tokens ≥2 chars plus contiguous CJK runs, lowercased for Latin.
    pub fn extract_query_terms(&self, text: &str) -> Vec<String> {
        extract_query_terms(text)
    }

    pub fn document_exists(&self, id: &str) -> Result<bool> {
        let reader = self.reader.read().unwrap();
        let searcher = reader.searcher();
        let term = Term::from_field_text(self.fields.id, id);
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        let count = searcher
            .search(&query, &TopDocs::with_limit(1))
            .map_err(|e| CoreError::Indexing(e.to_string()))?;
        Ok(!count.is_empty())
    }

    /// Fetches the stored fields for a single posting by id. DocumentStore
    /// never persists body text (InvertedIndex already stores it), so this is
    /// how callers outside a text query - the Semantic search path, chiefly -
    /// hydrate `content` for a document they only have the id for.
    pub fn get_by_id(&self, id: &str) -> Result<Option<Hit>> {
        let reader = self.reader.read().unwrap();
        let searcher = reader.searcher();
        let term = Term::from_field_text(self.fields.id, id);
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(1))
            .map_err(|e| CoreError::Indexing(e.to_string()))?;
        match top_docs.into_iter().next() {
            Some((score, addr)) => {
                let retrieved: TantivyDocument = searcher
                    .doc(addr)
                    .map_err(|e| CoreError::Indexing(e.to_string()))?;
                Ok(Some(self.hit_from_doc(&retrieved, score)))
            }
            None => Ok(None),
        }
    }

    pub fn document_count(&self) -> Result<u64> {
        let reader = self.reader.read().unwrap();
        let searcher = reader.searcher();
        Ok(searcher.num_docs())
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let document_count = self.document_count()?;
        let index_size_bytes = dir_size(&self.dir_path).unwrap_or(0);
        let last_modified = std::fs::metadata(&self.dir_path)
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);
        Ok(IndexStats {
            document_count,
            index_size_bytes,
            last_modified,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// All document ids currently posted. Used by the startup consistency
    /// sweep to find postings whose DocumentStore row has gone missing.
    pub fn all_ids(&self) -> Result<Vec<String>> {
        let reader = self.reader.read().unwrap();
        let searcher = reader.searcher();
        let limit = (searcher.num_docs() as usize).max(1);
        let top_docs = searcher
            .search(&AllQuery, &TopDocs::with_limit(limit))
            .map_err(|e| CoreError::Indexing(e.to_string()))?;

        let mut ids = Vec::with_capacity(top_docs.len());
        for (_, addr) in top_docs {
            let retrieved: TantivyDocument = searcher.doc(addr).map_err(|e| CoreError::Indexing(e.to_string()))?;
            ids.push(self.field_text(&retrieved, self.fields.id));
        }
        Ok(ids)
    }
}

fn directory_has_index(path: &Path) -> bool {
    path.join("meta.json").exists()
}

fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut total = 0u64;
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if meta.is_file() {
                total += meta.len();
            }
        }
    }
    Ok(total)
}

fn strip_html_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn floor_char_boundary(s: &str, idx: usize) -> usize {
    let mut idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, idx: usize) -> usize {
    let mut idx = idx.min(s.len());
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", truncated)
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF | 0x4E00..=0x9FFF | 0x3400..=0x4DBF)
}

pub fn extract_query_terms(text: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut current_is_cjk = false;

    let flush = |current: &mut String, current_is_cjk: bool, terms: &mut Vec<String>| {
        if current.is_empty() {
            return;
        }
        if current_is_cjk {
            if current.chars().count() >= 2 {
                terms.push(std::mem::take(current));
            } else {
                current.clear();
            }
        } else if current.chars().count() >= 2 {
            terms.push(current.to_lowercase());
            current.clear();
        } else {
            current.clear();
        }
    };

    for c in text.chars() {
        if is_cjk(c) {
            if !current.is_empty() && !current_is_cjk {
                flush(&mut current, current_is_cjk, &mut terms);
            }
            current_is_cjk = true;
            current.push(c);
        } else if c.is_alphanumeric() {
            if !current.is_empty() && current_is_cjk {
                flush(&mut current, current_is_cjk, &mut terms);
            }
            current_is_cjk = false;
            current.push(c);
        } else {
            flush(&mut current, current_is_cjk, &mut terms);
            current_is_cjk = false;
        }
    }
    flush(&mut current, current_is_cjk, &mut terms);
    terms
}

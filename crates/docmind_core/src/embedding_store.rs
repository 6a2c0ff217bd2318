//! Persistent `doc_id -> embedding` map backed by a custom binary format
//!. Fully resident in memory; rewritten
//! atomically on `save()` the same way `embedding_cache.rs`'s predecessor
//! rewrote its bincode blob, but with a format we control end to end.

use crate::embedder::Embedder;
use crate::types::sha256_hex;
use docmind_common::{CoreError, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const MAGIC: &[u8; 4] = b"DMEM";
const FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone)]
struct Entry {
    text_hash: [u8; 32],
    created_at: i64,
    vector: Vec<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct CacheInfo {
    pub total_embeddings: usize,
    pub file_size_bytes: u64,
    pub model_dimension: usize,
}

struct State {
    entries: HashMap<String, Entry>,
}

pub struct EmbeddingStore {
    path: PathBuf,
    dimension: usize,
    state: RwLock<State>,
}

impl EmbeddingStore {
    /// Loads `path` if present; a missing or corrupt file yields an empty map.
    pub fn open(path: &Path, dimension: usize) -> Result<Self> {
        let entries = match load_file(path, dimension) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("embedding store at {:?} unreadable, starting empty: {}", path, e);
                HashMap::new()
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            dimension,
            state: RwLock::new(State { entries }),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Serializes the full in-memory map atomically (temp file + rename).
    pub fn save(&self) -> Result<()> {
        let state = self.state.read().unwrap();
        let tmp_path = tmp_path_for(&self.path);
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            write_header(&mut file, self.dimension as u16, state.entries.len() as u64)?;
            for (id, entry) in state.entries.iter() {
                write_record(&mut file, id, entry)?;
            }
            file.flush()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// No-op if the stored hash already matches; otherwise re-encodes via `embedder`.
    /// Empty `text` stores the zero vector rather than calling the model.
    pub fn upsert(&self, doc_id: &str, text: &str, embedder: &dyn Embedder) -> Result<()> {
        let hash_hex = sha256_hex(text.as_bytes());
        let hash = hex_to_bytes32(&hash_hex);

        {
            let state = self.state.read().unwrap();
            if let Some(existing) = state.entries.get(doc_id) {
                if existing.text_hash == hash {
                    return Ok(());
                }
            }
        }

        let vector = if text.is_empty() {
            vec![0.0_f32; self.dimension]
        } else {
            embedder.encode(text)?
        };

        let mut state = self.state.write().unwrap();
        state.entries.insert(
            doc_id.to_string(),
            Entry {
                text_hash: hash,
                created_at: crate::types::unix_now(),
                vector,
            },
        );
        Ok(())
    }

    pub fn remove(&self, doc_id: &str) {
        let mut state = self.state.write().unwrap();
        state.entries.remove(doc_id);
    }

    pub fn contains(&self, doc_id: &str) -> bool {
        self.state.read().unwrap().entries.contains_key(doc_id)
    }

    /// Cosine similarity against every stored vector, filtered and sorted descending.
    pub fn search_similar(
        &self,
        query_text: &str,
        limit: usize,
        min_similarity: f32,
        embedder: &dyn Embedder,
    ) -> Result<Vec<(String, f32)>> {
        let query_vector = embedder.encode(query_text)?;
        let state = self.state.read().unwrap();

        let mut scored: Vec<(String, f32)> = state
            .entries
            .iter()
            .map(|(id, entry)| (id.clone(), cosine_similarity(&query_vector, &entry.vector)))
            .filter(|(_, score)| *score >= min_similarity)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    /// Clears the map, then re-encodes `docs`, periodically flushing, with a
    /// final `save()` on completion.
    pub fn rebuild<'a, I>(&self, docs: I, embedder: &dyn Embedder) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        {
            let mut state = self.state.write().unwrap();
            state.entries.clear();
        }
        let mut processed = 0usize;
        for (doc_id, text) in docs {
            self.upsert(doc_id, text, embedder)?;
            processed += 1;
            if processed % 200 == 0 {
                self.save()?;
            }
        }
        self.save()
    }

    pub fn cache_info(&self) -> CacheInfo {
        let state = self.state.read().unwrap();
        let file_size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        CacheInfo {
            total_embeddings: state.entries.len(),
            file_size_bytes,
            model_dimension: self.dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All document ids currently holding a vector. Used by the startup
    /// consistency sweep to find entries whose DocumentStore row is gone.
    pub fn all_ids(&self) -> Vec<String> {
        self.state.read().unwrap().entries.keys().cloned().collect()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let file_name = tmp
        .file_name()
        .map(|n| format!("{}.tmp", n.to_string_lossy()))
        .unwrap_or_else(|| "embeddings.tmp".to_string());
    tmp.set_file_name(file_name);
    tmp
}

fn hex_to_bytes32(hex: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (i, chunk) in hex.as_bytes().chunks(2).take(32).enumerate() {
        if let Ok(s) = std::str::from_utf8(chunk) {
            if let Ok(byte) = u8::from_str_radix(s, 16) {
                out[i] = byte;
            }
        }
    }
    out
}

fn write_header(file: &mut std::fs::File, dimension: u16, count: u64) -> Result<()> {
    file.write_all(MAGIC)?;
    file.write_all(&FORMAT_VERSION.to_le_bytes())?;
    file.write_all(&dimension.to_le_bytes())?;
    file.write_all(&count.to_le_bytes())?;
    Ok(())
}

fn write_record(file: &mut std::fs::File, id: &str, entry: &Entry) -> Result<()> {
    let id_bytes = id.as_bytes();
    file.write_all(&(id_bytes.len() as u16).to_le_bytes())?;
    file.write_all(id_bytes)?;
    file.write_all(&entry.text_hash)?;
    file.write_all(&entry.created_at.to_le_bytes())?;
    for v in &entry.vector {
        file.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

fn load_file(path: &Path, expected_dimension: usize) -> Result<HashMap<String, Entry>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let mut file = std::fs::File::open(path)?;
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(CoreError::Validation("embedding store magic mismatch".to_string()));
    }
    let mut buf2 = [0u8; 2];
    file.read_exact(&mut buf2)?;
    let _version = u16::from_le_bytes(buf2);
    file.read_exact(&mut buf2)?;
    let dimension = u16::from_le_bytes(buf2) as usize;
    let mut buf8 = [0u8; 8];
    file.read_exact(&mut buf8)?;
    let count = u64::from_le_bytes(buf8);

    if dimension != expected_dimension {
        return Err(CoreError::Validation(format!(
            "embedding store dimension {} does not match model dimension {}",
            dimension, expected_dimension
        )));
    }

    let mut entries = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let mut len_buf = [0u8; 2];
        file.read_exact(&mut len_buf)?;
        let id_len = u16::from_le_bytes(len_buf) as usize;
        let mut id_bytes = vec![0u8; id_len];
        file.read_exact(&mut id_bytes)?;
        let id = String::from_utf8(id_bytes)
            .map_err(|_| CoreError::Validation("embedding store id is not utf-8".to_string()))?;

        let mut text_hash = [0u8; 32];
        file.read_exact(&mut text_hash)?;

        file.read_exact(&mut buf8)?;
        let created_at = i64::from_le_bytes(buf8);

        let mut vector = Vec::with_capacity(dimension);
        let mut vbuf = [0u8; 4];
        for _ in 0..dimension {
            file.read_exact(&mut vbuf)?;
            vector.push(f32::from_le_bytes(vbuf));
        }

        entries.insert(
            id,
            Entry {
                text_hash,
                created_at,
                vector,
            },
        );
    }

    Ok(entries)
}

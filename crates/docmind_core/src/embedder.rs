//! Text-to-vector capability.
//!
//! The trait lets `EmbeddingStore`/`Searcher` stay decoupled from the model
//! backend. `FastEmbedEmbedder` is the production implementation, lazily
//! initializing a process-wide `TextEmbedding` singleton on first use.

use docmind_common::{CoreError, Result};
use fastembed::{EmbeddingModel as FastEmbedModelKind, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::OnceLock;

pub const ALL_MINILM_L6_V2_DIMENSION: usize = 384;

/// Encodes text into a fixed-dimension, L2-normalized vector.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;
    fn encode(&self, text: &str) -> Result<Vec<f32>>;

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.encode(t)).collect()
    }
}

/// `all-MiniLM-L6-v2` via `fastembed`, lazily initialized once per process.
pub struct FastEmbedEmbedder {
    cache_dir: PathBuf,
    model: OnceLock<TextEmbedding>,
}

impl FastEmbedEmbedder {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            model: OnceLock::new(),
        }
    }

    fn model(&self) -> Result<&TextEmbedding> {
        if let Some(model) = self.model.get() {
            return Ok(model);
        }
        tracing::info!("initializing embedding model (all-MiniLM-L6-v2)");
        let start = std::time::Instant::now();
        let model = TextEmbedding::try_new(
            InitOptions::new(FastEmbedModelKind::AllMiniLML6V2)
                .with_show_download_progress(false)
                .with_cache_dir(self.cache_dir.clone()),
        )
        .map_err(|e| CoreError::Embedding(e.to_string()))?;
        tracing::info!("embedding model initialized in {}ms", start.elapsed().as_millis());
        Ok(self.model.get_or_init(|| model))
    }
}

impl Embedder for FastEmbedEmbedder {
    fn dimension(&self) -> usize {
        ALL_MINILM_L6_V2_DIMENSION
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.model()?;
        let mut embeddings = model
            .embed(vec![text], None)
            .map_err(|e| CoreError::Embedding(e.to_string()))?;
        let vector = embeddings
            .pop()
            .ok_or_else(|| CoreError::Embedding("embedder produced no vector".to_string()))?;
        Ok(l2_normalize(vector))
    }

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.model()?;
        let embeddings = model
            .embed(texts.to_vec(), None)
            .map_err(|e| CoreError::Embedding(e.to_string()))?;
        Ok(embeddings.into_iter().map(l2_normalize).collect())
    }
}

fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder {
        vector: Vec<f32>,
    }

    impl Embedder for FixedEmbedder {
        fn dimension(&self) -> usize {
            self.vector.len()
        }

        fn encode(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.vector.clone())
        }
    }

    #[test]
    fn encode_batch_default_impl_calls_encode_per_text() {
        let embedder = FixedEmbedder {
            vector: vec![1.0, 0.0],
        };
        let batch = embedder.encode_batch(&["a", "b", "c"]).unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batch.iter().all(|v| v == &vec![1.0, 0.0]));
    }

    #[test]
    fn l2_normalize_produces_unit_vector() {
        let normalized = l2_normalize(vec![3.0, 4.0]);
        let norm: f32 = normalized.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_zero_vector_stays_zero() {
        let normalized = l2_normalize(vec![0.0, 0.0, 0.0]);
        assert_eq!(normalized, vec![0.0, 0.0, 0.0]);
    }
}

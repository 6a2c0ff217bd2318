//! Configuration management for DocMind.
//!
//! Loads and persists `<data_dir>/config.json`. Unknown keys are
//! ignored on load; missing keys fall back to their defaults, the same
//! `#[serde(default = "...")]` discipline the rest of the workspace uses for
//! layered config.

use docmind_common::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level runtime configuration, persisted as `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding `documents.db`, `index/`, `embeddings.bin`, `logs/`.
    pub data_dir: PathBuf,

    /// Folders the IndexingPipeline/ChangeWatcher should scan and watch.
    #[serde(default)]
    pub indexed_folders: Vec<PathBuf>,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub performance: PerformanceConfig,
}

/// `search.*` settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    #[serde(default = "default_mode")]
    pub default_mode: String,

    #[serde(default = "default_full_text_weight")]
    pub full_text_weight: f32,

    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,

    #[serde(default = "default_min_semantic_similarity")]
    pub min_semantic_similarity: f32,

    #[serde(default = "default_snippet_max_length")]
    pub snippet_max_length: usize,
}

fn default_max_results() -> u32 {
    100
}
fn default_mode() -> String {
    "hybrid".to_string()
}
fn default_full_text_weight() -> f32 {
    0.6
}
fn default_semantic_weight() -> f32 {
    0.4
}
fn default_min_semantic_similarity() -> f32 {
    0.1
}
fn default_snippet_max_length() -> usize {
    200
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            default_mode: default_mode(),
            full_text_weight: default_full_text_weight(),
            semantic_weight: default_semantic_weight(),
            min_semantic_similarity: default_min_semantic_similarity(),
            snippet_max_length: default_snippet_max_length(),
        }
    }
}

/// `indexing.*` settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub skip_embeddings: bool,

    #[serde(default = "default_watcher_debounce_ms")]
    pub watcher_debounce_ms: u64,
}

fn default_batch_size() -> usize {
    100
}
fn default_watcher_debounce_ms() -> u64 {
    500
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            skip_embeddings: false,
            watcher_debounce_ms: default_watcher_debounce_ms(),
        }
    }
}

/// `performance.*` settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_search_timeout_seconds")]
    pub search_timeout_seconds: u64,

    #[serde(default = "default_rebuild_timeout_minutes")]
    pub rebuild_timeout_minutes: u64,
}

fn default_search_timeout_seconds() -> u64 {
    5
}
fn default_rebuild_timeout_minutes() -> u64 {
    30
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            search_timeout_seconds: default_search_timeout_seconds(),
            rebuild_timeout_minutes: default_rebuild_timeout_minutes(),
        }
    }
}

impl Config {
    /// Build a default config rooted at `data_dir`, with no indexed folders yet.
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            indexed_folders: Vec::new(),
            search: SearchConfig::default(),
            indexing: IndexingConfig::default(),
            performance: PerformanceConfig::default(),
        }
    }

    fn config_path(data_dir: &Path) -> PathBuf {
        data_dir.join("config.json")
    }

    /// Load `config.json` from `data_dir`, or return a default config rooted
    /// there if the file does not exist yet.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = Self::config_path(data_dir);

        if !path.exists() {
            return Ok(Self::new(data_dir.to_path_buf()));
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CoreError::Validation(format!("invalid config.json: {e}")))?;
        Ok(config)
    }

    /// Persist this config to `<data_dir>/config.json`, atomically (write to
    /// a sibling `.tmp` file then rename), matching the atomic-rewrite
    /// discipline EmbeddingStore uses for its own file.
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        let path = Self::config_path(&self.data_dir);
        let tmp_path = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let cfg = Config::new(PathBuf::from("/tmp/docmind-test"));
        assert_eq!(cfg.search.full_text_weight, 0.6);
        assert_eq!(cfg.search.semantic_weight, 0.4);
        assert_eq!(cfg.search.min_semantic_similarity, 0.1);
        assert_eq!(cfg.indexing.watcher_debounce_ms, 500);
        assert_eq!(cfg.performance.rebuild_timeout_minutes, 30);
    }

    #[test]
    fn load_missing_file_returns_default() {
        let temp = assert_fs::TempDir::new().unwrap();
        let cfg = Config::load(temp.path()).unwrap();
        assert_eq!(cfg.data_dir, temp.path());
        assert!(cfg.indexed_folders.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut cfg = Config::new(temp.path().to_path_buf());
        cfg.indexed_folders.push(PathBuf::from("/home/user/docs"));
        cfg.search.snippet_max_length = 300;
        cfg.save().unwrap();

        let reloaded = Config::load(temp.path()).unwrap();
        assert_eq!(reloaded.indexed_folders, vec![PathBuf::from("/home/user/docs")]);
        assert_eq!(reloaded.search.snippet_max_length, 300);
    }

    #[test]
    fn malformed_config_is_validation_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.json"), "{not json").unwrap();
        let err = Config::load(temp.path()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let temp = assert_fs::TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("config.json"),
            r#"{"data_dir": "/x", "unknown_field": 42}"#,
        )
        .unwrap();
        let cfg = Config::load(temp.path()).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/x"));
    }
}

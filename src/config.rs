use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::search::common::{DEFAULT_MAX_RESULTS, DEFAULT_MIN_MATCH_FRACTION, DEFAULT_WRITER_HEAP_SIZE};

/// Runtime configuration for building and querying the publication index.
///
/// Everything the library needs is passed in explicitly through this struct;
/// nothing is looked up from the environment or the working directory.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding the tantivy index
    pub index_dir: PathBuf,

    /// JSON Lines feed produced by the crawler
    pub feed_path: PathBuf,

    /// Memory budget for the index writer, in bytes
    pub writer_heap_size: usize,

    /// Maximum number of results returned by a query
    pub max_results: usize,

    /// Fraction of distinct query terms a document must match
    pub min_match_fraction: f64,

    /// Per-field ranking weights
    pub weights: FieldWeights,
}

/// BM25F field weights
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct FieldWeights {
    pub title: f32,
    pub authors: f32,
    pub publication_type: f32,
    pub title_ngram: f32,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            title: 1.3,
            authors: 1.0,
            publication_type: 0.8,
            title_ngram: 0.6,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pubsearch");
        Self::with_base_dir(base)
    }
}

impl Config {
    /// Default configuration rooted at `base`: `base/index` and `base/publications.jsonl`
    pub fn with_base_dir<P: AsRef<Path>>(base: P) -> Self {
        let base = base.as_ref();
        Self {
            index_dir: base.join("index"),
            feed_path: base.join("publications.jsonl"),
            writer_heap_size: DEFAULT_WRITER_HEAP_SIZE,
            max_results: DEFAULT_MAX_RESULTS,
            min_match_fraction: DEFAULT_MIN_MATCH_FRACTION,
            weights: FieldWeights::default(),
        }
    }

    /// Load configuration from a TOML file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).context("Failed to parse TOML")?;
        Ok(config.normalized())
    }

    /// Result cap, never zero
    pub fn result_limit(&self) -> usize {
        self.max_results.max(1)
    }

    /// Clamp values that would make the engine misbehave
    fn normalized(mut self) -> Self {
        self.max_results = self.max_results.max(1);
        if !(self.min_match_fraction > 0.0 && self.min_match_fraction <= 1.0) {
            self.min_match_fraction = DEFAULT_MIN_MATCH_FRACTION;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights() {
        let weights = FieldWeights::default();
        assert_eq!(weights.title, 1.3);
        assert_eq!(weights.authors, 1.0);
        assert_eq!(weights.publication_type, 0.8);
        assert_eq!(weights.title_ngram, 0.6);
    }

    #[test]
    fn test_with_base_dir() {
        let config = Config::with_base_dir("/tmp/pubs");
        assert_eq!(config.index_dir, PathBuf::from("/tmp/pubs/index"));
        assert_eq!(config.feed_path, PathBuf::from("/tmp/pubs/publications.jsonl"));
        assert_eq!(config.max_results, 100);
        assert_eq!(config.min_match_fraction, 0.9);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = Config::from_toml(
            r#"
            index_dir = "/data/index"
            max_results = 25

            [weights]
            title = 2.0
            "#,
        )
        .unwrap();

        assert_eq!(config.index_dir, PathBuf::from("/data/index"));
        assert_eq!(config.max_results, 25);
        assert_eq!(config.weights.title, 2.0);
        // Untouched keys keep defaults
        assert_eq!(config.weights.authors, 1.0);
        assert_eq!(config.min_match_fraction, 0.9);
    }

    #[test]
    fn test_from_toml_clamps_invalid_values() {
        let config = Config::from_toml("max_results = 0\nmin_match_fraction = 1.5").unwrap();
        assert_eq!(config.max_results, 1);
        assert_eq!(config.min_match_fraction, 0.9);
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(Config::from_toml("max_results = \"many\"").is_err());
    }
}

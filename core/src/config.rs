//! Indexer configuration, read once at startup.

use crate::error::{IndexError, Result};
use rust_stemmers::Algorithm;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming the index directory.
pub const INDEX_DIR_ENV: &str = "WITNESS_INDEX_DIR";

/// Number of top-weighted terms kept per fragment.
pub const SIGNIFICANT_TERMS: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Directory holding `meta.json` and the segment files.
    pub index_dir: PathBuf,
    #[serde(default = "default_significant_terms")]
    pub significant_terms: usize,
    /// Live segment count above which a commit merges everything into one segment.
    #[serde(default = "default_merge_factor")]
    pub merge_factor: usize,
    #[serde(default = "default_store_term_vectors")]
    pub store_term_vectors: bool,
    #[serde(default)]
    pub stemmer: Option<StemmerLanguage>,
}

fn default_significant_terms() -> usize { SIGNIFICANT_TERMS }
fn default_merge_factor() -> usize { 10 }
fn default_store_term_vectors() -> bool { true }

/// Languages accepted for optional stemming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemmerLanguage {
    English,
    French,
    German,
    Italian,
    Portuguese,
    Spanish,
}

impl StemmerLanguage {
    pub fn algorithm(self) -> Algorithm {
        match self {
            StemmerLanguage::English => Algorithm::English,
            StemmerLanguage::French => Algorithm::French,
            StemmerLanguage::German => Algorithm::German,
            StemmerLanguage::Italian => Algorithm::Italian,
            StemmerLanguage::Portuguese => Algorithm::Portuguese,
            StemmerLanguage::Spanish => Algorithm::Spanish,
        }
    }
}

impl IndexerConfig {
    pub fn new<P: AsRef<Path>>(index_dir: P) -> Self {
        Self {
            index_dir: index_dir.as_ref().to_path_buf(),
            significant_terms: default_significant_terms(),
            merge_factor: default_merge_factor(),
            store_term_vectors: default_store_term_vectors(),
            stemmer: None,
        }
    }

    /// Load a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| IndexError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: IndexerConfig = serde_json::from_str(&raw)
            .map_err(|e| IndexError::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Build a default configuration from `WITNESS_INDEX_DIR`.
    pub fn from_env() -> Result<Self> {
        let dir = std::env::var(INDEX_DIR_ENV)
            .map_err(|_| IndexError::Config(format!("{INDEX_DIR_ENV} is not set")))?;
        let config = Self::new(dir);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.index_dir.as_os_str().is_empty() {
            return Err(IndexError::Config("index_dir cannot be empty".to_string()));
        }
        if self.significant_terms == 0 {
            return Err(IndexError::Config(
                "significant_terms must be greater than 0".to_string(),
            ));
        }
        if self.merge_factor < 2 {
            return Err(IndexError::Config(
                "merge_factor must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied_to_partial_json() {
        let config: IndexerConfig =
            serde_json::from_str(r#"{ "index_dir": "/var/lib/ldod/index" }"#).unwrap();
        assert_eq!(config.significant_terms, SIGNIFICANT_TERMS);
        assert_eq!(config.merge_factor, 10);
        assert!(config.store_term_vectors);
        assert!(config.stemmer.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn stemmer_language_is_lowercase() {
        let config: IndexerConfig =
            serde_json::from_str(r#"{ "index_dir": "idx", "stemmer": "portuguese" }"#).unwrap();
        assert_eq!(config.stemmer, Some(StemmerLanguage::Portuguese));
    }

    #[test]
    fn rejects_invalid_values() {
        let mut config = IndexerConfig::new("");
        assert!(matches!(config.validate(), Err(IndexError::Config(_))));
        config.index_dir = PathBuf::from("idx");
        config.merge_factor = 1;
        assert!(config.validate().is_err());
        config.merge_factor = 4;
        config.significant_terms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexer.json");
        std::fs::write(&path, r#"{ "index_dir": "idx", "significant_terms": 50 }"#).unwrap();
        let config = IndexerConfig::from_file(&path).unwrap();
        assert_eq!(config.significant_terms, 50);
        assert_eq!(config.index_dir, PathBuf::from("idx"));
    }
}

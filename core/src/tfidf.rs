//! Per-fragment TF-IDF weights.
//!
//! Term frequency comes from the stored term vector of a witness:
//! `tf = count / total terms`. Document frequency only counts representative
//! witnesses, one per fragment:
//!
//! ```text
//! idf    = ln(N / (1 + df))      N = number of representative witnesses
//! weight = tf * idf
//! ```
//!
//! The smoothing makes `idf` negative for terms present in most fragments.
//!
//! Results are cached per fragment until [`TfIdfEngine::clear_cache`]. Reindexing
//! a fragment's representative does not refresh its cached weights.

use crate::builder::QueryBuilder;
use crate::error::Result;
use crate::index::Field;
use crate::query::Query;
use crate::source::FragmentRef;
use crate::store::IndexStore;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Normalized term frequencies of one document.
pub type TermFrequencies = BTreeMap<String, f64>;

/// `ln(num_docs / (1 + doc_freq))`
pub fn idf(num_docs: u64, doc_freq: u64) -> f64 {
    (num_docs as f64 / (1 + doc_freq) as f64).ln()
}

/// Term weights ordered by descending weight, ties by ascending term.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermWeights {
    entries: Vec<(String, f64)>,
}

impl TermWeights {
    /// Rank `entries` and keep the best `limit`.
    pub fn ranked(mut entries: Vec<(String, f64)>, limit: usize) -> Self {
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(limit);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, term: &str) -> Option<f64> {
        self.entries.iter().find(|(t, _)| t == term).map(|(_, w)| *w)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(t, w)| (t.as_str(), *w))
    }

    /// The `n` heaviest terms.
    pub fn top_terms(&self, n: usize) -> Vec<String> {
        self.entries.iter().take(n).map(|(t, _)| t.clone()).collect()
    }

    /// Only the entries whose term is in `terms`, order preserved.
    pub fn restrict<S: AsRef<str>>(&self, terms: &[S]) -> TermWeights {
        let wanted: HashSet<&str> = terms.iter().map(|t| t.as_ref()).collect();
        TermWeights {
            entries: self.entries.iter().filter(|(t, _)| wanted.contains(t.as_str())).cloned().collect(),
        }
    }
}

pub struct TfIdfEngine {
    store: Arc<IndexStore>,
    significant_terms: usize,
    cache: DashMap<String, Arc<TermWeights>>,
}

impl TfIdfEngine {
    pub fn new(store: Arc<IndexStore>, significant_terms: usize) -> Self {
        Self { store, significant_terms, cache: DashMap::new() }
    }

    /// Term frequencies of the witness indexed under `document_id`.
    /// Empty when the witness is missing or was indexed without term vectors.
    pub fn term_frequency(&self, document_id: &str) -> Result<TermFrequencies> {
        self.term_frequency_for(&Query::term(Field::Id, document_id))
    }

    fn representative_term_frequency(&self, document_id: &str) -> Result<TermFrequencies> {
        let query = QueryBuilder::scope_to_document(QueryBuilder::representative_filter(), document_id);
        self.term_frequency_for(&query)
    }

    fn term_frequency_for(&self, query: &Query) -> Result<TermFrequencies> {
        let reader = self.store.open_reader()?;
        // Several entries for one id means it was re-added without a delete; the newest wins.
        let newest = reader.search(query, reader.num_docs()).into_iter().map(|h| h.address).max();
        let Some(vector) = newest.and_then(|address| reader.term_vector(address)) else {
            tracing::debug!(%query, "no term vector");
            return Ok(TermFrequencies::new());
        };
        let total: u64 = vector.iter().map(|(_, n)| *n as u64).sum();
        if total == 0 {
            return Ok(TermFrequencies::new());
        }
        Ok(vector.iter().map(|(term, n)| (term.clone(), *n as f64 / total as f64)).collect())
    }

    /// Cached weights of the fragment's distinctive terms.
    pub fn tfidf(&self, fragment: &FragmentRef) -> Result<Arc<TermWeights>> {
        if let Some(cached) = self.cache.get(&fragment.id) {
            tracing::debug!(fragment = %fragment.id, "tf-idf cache hit");
            return Ok(Arc::clone(cached.value()));
        }
        let tf = self.representative_term_frequency(&fragment.representative)?;
        let weights = Arc::new(self.weigh(&tf)?);
        tracing::info!(
            fragment = %fragment.id,
            representative = %fragment.representative,
            terms = weights.len(),
            "computed tf-idf"
        );
        self.cache.insert(fragment.id.clone(), Arc::clone(&weights));
        Ok(weights)
    }

    fn weigh(&self, tf: &TermFrequencies) -> Result<TermWeights> {
        if tf.is_empty() {
            return Ok(TermWeights::default());
        }
        let reader = self.store.open_reader()?;
        let num_docs = reader.count(&QueryBuilder::representative_filter()) as u64;
        let entries = tf
            .iter()
            .map(|(term, tf)| {
                let df = reader.count(&QueryBuilder::representative_term(term)) as u64;
                (term.clone(), tf * idf(num_docs, df))
            })
            .collect();
        Ok(TermWeights::ranked(entries, self.significant_terms))
    }

    /// The fragment's weights for `terms` only.
    pub fn tfidf_for_terms<S: AsRef<str>>(&self, fragment: &FragmentRef, terms: &[S]) -> Result<TermWeights> {
        Ok(self.tfidf(fragment)?.restrict(terms))
    }

    /// The fragment's `n` heaviest terms.
    pub fn tfidf_terms(&self, fragment: &FragmentRef, n: usize) -> Result<Vec<String>> {
        Ok(self.tfidf(fragment)?.top_terms(n))
    }

    pub fn clear_cache(&self) {
        let dropped = self.cache.len();
        self.cache.clear();
        tracing::info!(dropped, "cleared tf-idf cache");
    }

    pub fn cached_fragments(&self) -> usize {
        self.cache.len()
    }

    pub fn is_cached(&self, fragment_id: &str) -> bool {
        self.cache.contains_key(fragment_id)
    }
}

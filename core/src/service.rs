use crate::builder::QueryBuilder;
use crate::config::IndexerConfig;
use crate::error::Result;
use crate::index::IndexedDocument;
use crate::search::SearchService;
use crate::source::{FragmentRef, TextSource};
use crate::store::IndexStore;
use crate::tfidf::{TermFrequencies, TermWeights, TfIdfEngine};
use std::sync::Arc;

/// The indexing subsystem as one object: build it once at startup and share it.
pub struct IndexerService<S: TextSource> {
    store: Arc<IndexStore>,
    source: Arc<S>,
    search: SearchService<S>,
    tfidf: TfIdfEngine,
}

impl<S: TextSource> IndexerService<S> {
    pub fn open(config: &IndexerConfig, source: Arc<S>) -> Result<Self> {
        let store = Arc::new(IndexStore::open(config)?);
        let builder = QueryBuilder::new(Arc::clone(store.analyzer()));
        Ok(Self {
            search: SearchService::new(Arc::clone(&store), builder, Arc::clone(&source)),
            tfidf: TfIdfEngine::new(Arc::clone(&store), config.significant_terms),
            store,
            source,
        })
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    fn indexed(&self, reference: &S::Ref) -> IndexedDocument {
        IndexedDocument::new(
            self.source.external_id(reference),
            self.source.flatten_to_text(reference),
            self.source.is_representative(reference),
        )
    }

    pub fn add_document(&self, reference: &S::Ref) -> Result<()> {
        self.store.add_document(self.indexed(reference))
    }

    /// Delete any existing entries for the witness and index its current text.
    pub fn reindex_document(&self, reference: &S::Ref) -> Result<()> {
        self.store.replace_document(self.indexed(reference))
    }

    pub fn remove_document(&self, id: &str) -> Result<usize> {
        self.search.purge(&[id.to_string()])
    }

    pub fn search(&self, words: &str) -> Result<Vec<S::Ref>> {
        self.search.search(words)
    }

    pub fn search_fuzzy(&self, words: &str) -> Result<Vec<S::Ref>> {
        self.search.search_fuzzy(words)
    }

    pub fn search_within_document(&self, words: &str, document_id: &str) -> Result<Vec<String>> {
        self.search.search_within_document(words, document_id)
    }

    pub fn term_frequency(&self, reference: &S::Ref) -> Result<TermFrequencies> {
        self.tfidf.term_frequency(&self.source.external_id(reference))
    }

    pub fn tfidf(&self, fragment: &FragmentRef) -> Result<Arc<TermWeights>> {
        self.tfidf.tfidf(fragment)
    }

    pub fn tfidf_for_terms<T: AsRef<str>>(&self, fragment: &FragmentRef, terms: &[T]) -> Result<TermWeights> {
        self.tfidf.tfidf_for_terms(fragment, terms)
    }

    pub fn tfidf_terms(&self, fragment: &FragmentRef, n: usize) -> Result<Vec<String>> {
        self.tfidf.tfidf_terms(fragment, n)
    }

    pub fn clear_cache(&self) {
        self.tfidf.clear_cache()
    }

    pub fn cached_fragments(&self) -> usize {
        self.tfidf.cached_fragments()
    }

    pub fn is_cached(&self, fragment_id: &str) -> bool {
        self.tfidf.is_cached(fragment_id)
    }

    /// Wipe the index. Cached TF-IDF weights are kept until [`clear_cache`](Self::clear_cache).
    pub fn clean_index(&self) -> Result<()> {
        self.store.clean()
    }

    pub fn num_docs(&self) -> Result<usize> {
        self.store.num_docs()
    }
}

//! Free-text search that resolves hits to live domain objects and purges
//! index entries whose objects are gone.

use crate::builder::QueryBuilder;
use crate::error::Result;
use crate::query::Query;
use crate::source::{DomainKind, Resolver};
use crate::store::IndexStore;
use std::collections::HashSet;
use std::sync::Arc;

enum Resolution<T> {
    Live(T),
    Miss(&'static str),
}

pub struct SearchService<R: Resolver> {
    store: Arc<IndexStore>,
    builder: QueryBuilder,
    resolver: Arc<R>,
}

impl<R: Resolver> SearchService<R> {
    pub fn new(store: Arc<IndexStore>, builder: QueryBuilder, resolver: Arc<R>) -> Self {
        Self { store, builder, resolver }
    }

    /// Every token must match exactly. Stale hits are purged and left out.
    pub fn search(&self, words: &str) -> Result<Vec<R::Ref>> {
        let query = self.builder.build_exact(words)?;
        self.search_query(&query)
    }

    /// Like [`search`](Self::search), but each token may be one edit away.
    pub fn search_fuzzy(&self, words: &str) -> Result<Vec<R::Ref>> {
        let query = self.builder.build_fuzzy(words)?;
        self.search_query(&query)
    }

    pub fn search_query(&self, query: &Query) -> Result<Vec<R::Ref>> {
        let hits = self.hits(query)?;
        tracing::debug!(%query, hits = hits.len(), "search hits");
        Ok(self.resolve_and_purge(hits))
    }

    /// Ids of `document_id` entries matching `words`; no resolution or purge.
    pub fn search_within_document(&self, words: &str, document_id: &str) -> Result<Vec<String>> {
        let query = QueryBuilder::scope_to_document(self.builder.build_exact(words)?, document_id);
        self.hits(&query)
    }

    /// Distinct document ids matching `query`, best match first.
    pub fn hits(&self, query: &Query) -> Result<Vec<String>> {
        let reader = self.store.open_reader()?;
        let limit = reader.num_docs();
        let mut seen = HashSet::new();
        let ids = reader
            .search(query, limit)
            .into_iter()
            .filter_map(|hit| reader.doc(hit.address))
            .filter(|doc| seen.insert(doc.id.as_str()))
            .map(|doc| doc.id.clone())
            .collect();
        Ok(ids)
    }

    fn resolve(&self, id: &str) -> Resolution<R::Ref> {
        match self.resolver.resolve(id) {
            None => Resolution::Miss("unresolved"),
            Some(reference) => match self.resolver.kind_of(&reference) {
                DomainKind::Witness => Resolution::Live(reference),
                DomainKind::Other(_) => Resolution::Miss("unexpected kind"),
            },
        }
    }

    fn resolve_and_purge(&self, hits: Vec<String>) -> Vec<R::Ref> {
        let mut live = Vec::with_capacity(hits.len());
        let mut misses = Vec::new();
        for id in hits {
            match self.resolve(&id) {
                Resolution::Live(reference) => live.push(reference),
                Resolution::Miss(reason) => {
                    tracing::warn!(%id, reason, "stale index entry");
                    misses.push(id);
                }
            }
        }
        if !misses.is_empty() {
            if let Err(e) = self.purge(&misses) {
                tracing::warn!(error = %e, misses = misses.len(), "failed to purge stale index entries");
            }
        }
        live
    }

    /// Remove the given ids from the index.
    pub fn purge(&self, misses: &[String]) -> Result<usize> {
        if misses.is_empty() {
            return Ok(0);
        }
        let query = QueryBuilder::build_id_deletion_query(misses)?;
        let deleted = self.store.delete_by_query(&query)?;
        tracing::info!(deleted, "purged stale index entries");
        Ok(deleted)
    }
}

//! Turns free-text search input into queries.

use crate::error::{IndexError, Result};
use crate::index::{flag_value, Field};
use crate::query::{Query, QueryParser};
use crate::tokenizer::Analyzer;
use std::sync::Arc;

/// Edit distance used by the fuzzy search policy.
pub const FUZZY_EDITS: u8 = 1;

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    analyzer: Arc<Analyzer>,
}

fn split_words(words: &str) -> Result<Vec<&str>> {
    let tokens: Vec<&str> = words.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(IndexError::InvalidQuery("search input is empty".to_string()));
    }
    Ok(tokens)
}

impl QueryBuilder {
    pub fn new(analyzer: Arc<Analyzer>) -> Self {
        Self { analyzer }
    }

    /// `a AND b AND c`, every token taken literally.
    pub fn exact_query_string(words: &str) -> Result<String> {
        Ok(split_words(words)?.join(" AND "))
    }

    /// `a~1 AND b~1 AND c~1`.
    pub fn fuzzy_query_string(words: &str) -> Result<String> {
        Ok(split_words(words)?
            .iter()
            .map(|t| format!("{t}~{FUZZY_EDITS}"))
            .collect::<Vec<_>>()
            .join(" AND "))
    }

    /// Parse a raw query string against the text field.
    pub fn parse(&self, query: &str) -> Result<Query> {
        QueryParser::new(Field::Text, &self.analyzer).parse(query)
    }

    pub fn build_exact(&self, words: &str) -> Result<Query> {
        self.parse(&Self::exact_query_string(words)?)
    }

    pub fn build_fuzzy(&self, words: &str) -> Result<Query> {
        self.parse(&Self::fuzzy_query_string(words)?)
    }

    /// `id:<id> AND (query)`.
    pub fn scope_to_document(query: Query, id: &str) -> Query {
        Query::and(vec![Query::term(Field::Id, id), query])
    }

    /// `id:a OR id:b ...`; the caller skips the purge when there is nothing to delete.
    pub fn build_id_deletion_query<S: AsRef<str>>(ids: &[S]) -> Result<Query> {
        match ids {
            [] => Err(IndexError::InvalidQuery("no ids to delete".to_string())),
            [id] => Ok(Query::term(Field::Id, id.as_ref())),
            _ => Ok(Query::or(ids.iter().map(|id| Query::term(Field::Id, id.as_ref())).collect())),
        }
    }

    /// `rep:true`
    pub fn representative_filter() -> Query {
        Query::term(Field::Representative, flag_value(true))
    }

    /// `rep:true AND text:<term>` for an already analyzed term.
    pub fn representative_term(term: &str) -> Query {
        Query::and(vec![Self::representative_filter(), Query::term(Field::Text, term)])
    }
}

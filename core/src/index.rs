use crate::tokenizer::Analyzer;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Local document number inside one segment.
pub type DocId = u32;

/// The three fields of an indexed witness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Field {
    /// Stored, exact-match external identifier.
    Id,
    /// Analyzed full text with term vectors.
    Text,
    /// Stored, exact-match `"true"`/`"false"` representative flag.
    Representative,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Text => "text",
            Field::Representative => "rep",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        match name {
            "id" => Some(Field::Id),
            "text" => Some(Field::Text),
            "rep" => Some(Field::Representative),
            _ => None,
        }
    }

    /// Keyword fields are matched verbatim, never analyzed.
    pub fn is_keyword(self) -> bool {
        !matches!(self, Field::Text)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value stored in the representative field.
pub fn flag_value(representative: bool) -> &'static str {
    if representative { "true" } else { "false" }
}

/// A witness as handed to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedDocument {
    pub id: String,
    pub text: String,
    pub representative: bool,
}

impl IndexedDocument {
    pub fn new(id: impl Into<String>, text: impl Into<String>, representative: bool) -> Self {
        Self { id: id.into(), text: text.into(), representative }
    }
}

/// A document as persisted in a segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub text: String,
    pub representative: bool,
    /// Raw term counts sorted by term; `None` when vectors were disabled at index time.
    pub term_vector: Option<Vec<(String, u32)>>,
}

impl StoredDocument {
    /// Total number of term occurrences recorded in the vector.
    pub fn total_terms(&self) -> u64 {
        self.term_vector
            .as_ref()
            .map(|tv| tv.iter().map(|(_, n)| *n as u64).sum())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn freq(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// An immutable batch of documents with its own inverted index.
/// Postings per term are sorted by doc_id.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Segment {
    pub docs: Vec<StoredDocument>,
    pub postings: BTreeMap<Field, BTreeMap<String, Vec<Posting>>>,
}

impl Segment {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Analyze and append a new document.
    pub fn push(&mut self, doc: IndexedDocument, analyzer: &Analyzer, store_term_vectors: bool) -> DocId {
        let tokens = analyzer.tokenize(&doc.text);
        let term_vector = store_term_vectors.then(|| term_vector(&tokens));
        self.push_analyzed(
            StoredDocument { id: doc.id, text: doc.text, representative: doc.representative, term_vector },
            tokens,
        )
    }

    /// Re-append an already stored document (used by merges); its term vector is kept as is.
    pub fn push_stored(&mut self, doc: StoredDocument, analyzer: &Analyzer) -> DocId {
        let tokens = analyzer.tokenize(&doc.text);
        self.push_analyzed(doc, tokens)
    }

    fn push_analyzed(&mut self, doc: StoredDocument, tokens: Vec<(String, usize)>) -> DocId {
        let doc_id = self.docs.len() as DocId;

        let mut positions: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for (term, pos) in tokens {
            positions.entry(term).or_default().push(pos as u32);
        }
        let text = self.postings.entry(Field::Text).or_default();
        for (term, positions) in positions {
            text.entry(term).or_default().push(Posting { doc_id, positions });
        }

        self.add_keyword(Field::Id, doc.id.clone(), doc_id);
        self.add_keyword(Field::Representative, flag_value(doc.representative).to_string(), doc_id);

        self.docs.push(doc);
        doc_id
    }

    fn add_keyword(&mut self, field: Field, value: String, doc_id: DocId) {
        self.postings
            .entry(field)
            .or_default()
            .entry(value)
            .or_default()
            .push(Posting { doc_id, positions: vec![0] });
    }

    pub fn postings(&self, field: Field, term: &str) -> &[Posting] {
        self.postings
            .get(&field)
            .and_then(|terms| terms.get(term))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Sorted term dictionary of a field.
    pub fn terms(&self, field: Field) -> impl Iterator<Item = &str> {
        self.postings.get(&field).into_iter().flat_map(|terms| terms.keys().map(String::as_str))
    }
}

fn term_vector(tokens: &[(String, usize)]) -> Vec<(String, u32)> {
    let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
    for (term, _) in tokens {
        *counts.entry(term.as_str()).or_insert(0) += 1;
    }
    counts.into_iter().map(|(t, n)| (t.to_string(), n)).collect()
}

/// A segment paired with the deletions recorded for it at snapshot time.
#[derive(Debug, Clone, Copy)]
pub struct SegmentView<'a> {
    pub segment: &'a Segment,
    pub deleted: &'a BTreeSet<DocId>,
}

impl<'a> SegmentView<'a> {
    pub fn is_live(&self, doc_id: DocId) -> bool {
        (doc_id as usize) < self.segment.len() && !self.deleted.contains(&doc_id)
    }

    pub fn live_docs(&self) -> usize {
        self.segment.len().saturating_sub(self.deleted.len())
    }

    pub fn live_postings(&self, field: Field, term: &str) -> impl Iterator<Item = &'a Posting> + 'a {
        let deleted = self.deleted;
        self.segment.postings(field, term).iter().filter(move |p| !deleted.contains(&p.doc_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_builds_postings_and_vectors() {
        let analyzer = Analyzer::default();
        let mut segment = Segment::new();
        segment.push(IndexedDocument::new("A", "the quick fox the", true), &analyzer, true);
        segment.push(IndexedDocument::new("B", "lazy dog", false), &analyzer, false);

        let the = segment.postings(Field::Text, "the");
        assert_eq!(the.len(), 1);
        assert_eq!(the[0].positions, vec![0, 3]);
        assert_eq!(segment.postings(Field::Id, "B")[0].doc_id, 1);
        assert_eq!(segment.postings(Field::Representative, "true").len(), 1);
        assert_eq!(segment.postings(Field::Representative, "false").len(), 1);

        let doc = &segment.docs[0];
        assert_eq!(doc.total_terms(), 4);
        assert_eq!(
            doc.term_vector.as_deref(),
            Some(&[("fox".to_string(), 1), ("quick".to_string(), 1), ("the".to_string(), 2)][..])
        );
        assert!(segment.docs[1].term_vector.is_none());
    }

    #[test]
    fn view_hides_deleted_docs() {
        let analyzer = Analyzer::default();
        let mut segment = Segment::new();
        segment.push(IndexedDocument::new("A", "fox", true), &analyzer, true);
        segment.push(IndexedDocument::new("B", "fox", true), &analyzer, true);
        let deleted: BTreeSet<DocId> = [0].into_iter().collect();
        let view = SegmentView { segment: &segment, deleted: &deleted };
        assert_eq!(view.live_docs(), 1);
        assert!(!view.is_live(0));
        let live: Vec<DocId> = view.live_postings(Field::Text, "fox").map(|p| p.doc_id).collect();
        assert_eq!(live, vec![1]);
    }
}

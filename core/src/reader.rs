//! Read sessions over a committed snapshot, and query evaluation.

use crate::fuzzy::bounded_distance;
use crate::index::{DocId, Field, Posting, Segment, SegmentView, StoredDocument};
use crate::query::Query;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

/// Position of a document inside one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocAddress {
    pub segment: u32,
    pub doc_id: DocId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub address: DocAddress,
    pub score: f32,
}

#[derive(Debug)]
pub(crate) struct LoadedSegment {
    pub name: String,
    pub segment: Arc<Segment>,
    pub deleted: BTreeSet<DocId>,
}

/// An immutable view of the last commit. Later commits are not visible through it;
/// dropping the session releases its segments.
#[derive(Debug)]
pub struct ReaderSession {
    root: PathBuf,
    segments: Vec<LoadedSegment>,
    num_docs: usize,
}

impl ReaderSession {
    pub(crate) fn new(root: PathBuf, segments: Vec<LoadedSegment>) -> Self {
        let num_docs = segments.iter().map(|s| s.segment.len().saturating_sub(s.deleted.len())).sum();
        Self { root, segments, num_docs }
    }

    /// Live documents in the snapshot.
    pub fn num_docs(&self) -> usize {
        self.num_docs
    }

    pub fn segment_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(|s| s.name.as_str())
    }

    fn searcher(&self) -> Searcher<'_> {
        Searcher::new(
            self.segments
                .iter()
                .map(|s| SegmentView { segment: &s.segment, deleted: &s.deleted })
                .collect(),
        )
    }

    /// Matching documents, best score first, at most `limit` of them.
    pub fn search(&self, query: &Query, limit: usize) -> Vec<Hit> {
        let hits = self.searcher().search(query, limit);
        tracing::trace!(root = %self.root.display(), %query, hits = hits.len(), "evaluated query");
        hits
    }

    /// Number of live documents matching `query`.
    pub fn count(&self, query: &Query) -> usize {
        self.searcher().matches(query).iter().map(|(_, docs)| docs.len()).sum()
    }

    pub fn doc(&self, address: DocAddress) -> Option<&StoredDocument> {
        let loaded = self.segments.get(address.segment as usize)?;
        if loaded.deleted.contains(&address.doc_id) {
            return None;
        }
        loaded.segment.docs.get(address.doc_id as usize)
    }

    /// Stored term vector of a document; `None` if the document has none.
    pub fn term_vector(&self, address: DocAddress) -> Option<&[(String, u32)]> {
        self.doc(address)?.term_vector.as_deref()
    }

    pub fn doc_freq(&self, field: Field, term: &str) -> usize {
        self.searcher().doc_freq(field, term)
    }
}

/// Evaluates queries over a set of segment views.
pub(crate) struct Searcher<'a> {
    views: Vec<SegmentView<'a>>,
    num_docs: usize,
}

type Scores = HashMap<DocId, f32>;

impl<'a> Searcher<'a> {
    pub fn new(views: Vec<SegmentView<'a>>) -> Self {
        let num_docs = views.iter().map(|v| v.live_docs()).sum();
        Self { views, num_docs }
    }

    pub fn search(&self, query: &Query, limit: usize) -> Vec<Hit> {
        let mut hits: Vec<Hit> = self
            .matches(query)
            .into_iter()
            .flat_map(|(segment, docs)| {
                docs.into_iter().map(move |(doc_id, score)| Hit {
                    address: DocAddress { segment: segment as u32, doc_id },
                    score,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.address.cmp(&b.address)));
        hits.truncate(limit);
        hits
    }

    /// Per segment ordinal, the matching live documents and their scores.
    pub fn matches(&self, query: &Query) -> Vec<(usize, Scores)> {
        self.views
            .iter()
            .enumerate()
            .map(|(i, view)| (i, self.eval(view, query)))
            .filter(|(_, docs)| !docs.is_empty())
            .collect()
    }

    pub fn doc_freq(&self, field: Field, term: &str) -> usize {
        self.views.iter().map(|v| v.live_postings(field, term).count()).sum()
    }

    fn term_score(&self, freq: u32, doc_freq: usize) -> f32 {
        let tf = 1.0 + (freq.max(1) as f32).ln();
        let idf = (1.0 + self.num_docs as f32 / doc_freq.max(1) as f32).ln();
        tf * idf
    }

    fn eval(&self, view: &SegmentView<'a>, query: &Query) -> Scores {
        match query {
            Query::Term { field, text } => self.eval_term(view, *field, text),
            Query::Phrase { field, terms } => self.eval_phrase(view, *field, terms),
            Query::Fuzzy { field, text, max_edits } => {
                let mut scores = Scores::new();
                for term in view.segment.terms(*field) {
                    if bounded_distance(term, text, *max_edits as usize).is_none() {
                        continue;
                    }
                    for (doc_id, score) in self.eval_term(view, *field, term) {
                        let best = scores.entry(doc_id).or_insert(0.0);
                        *best = best.max(score);
                    }
                }
                scores
            }
            Query::Bool { must, should, must_not } => {
                let mut acc = match must.split_first() {
                    Some((first, rest)) => {
                        let mut acc = self.eval(view, first);
                        for clause in rest {
                            if acc.is_empty() {
                                break;
                            }
                            let other = self.eval(view, clause);
                            acc.retain(|doc_id, _| other.contains_key(doc_id));
                            for (doc_id, score) in acc.iter_mut() {
                                *score += other[doc_id];
                            }
                        }
                        for clause in should {
                            if acc.is_empty() {
                                break;
                            }
                            for (doc_id, score) in self.eval(view, clause) {
                                if let Some(total) = acc.get_mut(&doc_id) {
                                    *total += score;
                                }
                            }
                        }
                        acc
                    }
                    None => {
                        let mut acc = Scores::new();
                        for clause in should {
                            for (doc_id, score) in self.eval(view, clause) {
                                *acc.entry(doc_id).or_insert(0.0) += score;
                            }
                        }
                        acc
                    }
                };
                for clause in must_not {
                    if acc.is_empty() {
                        break;
                    }
                    let other = self.eval(view, clause);
                    acc.retain(|doc_id, _| !other.contains_key(doc_id));
                }
                acc
            }
        }
    }

    fn eval_term(&self, view: &SegmentView<'a>, field: Field, term: &str) -> Scores {
        let df = self.doc_freq(field, term);
        view.live_postings(field, term)
            .map(|p| (p.doc_id, self.term_score(p.freq(), df)))
            .collect()
    }

    fn eval_phrase(&self, view: &SegmentView<'a>, field: Field, terms: &[String]) -> Scores {
        let Some((head, tail)) = terms.split_first() else { return Scores::new() };
        let tail_postings: Vec<&[Posting]> = tail.iter().map(|t| view.segment.postings(field, t)).collect();
        if tail_postings.iter().any(|p| p.is_empty()) {
            return Scores::new();
        }
        let dfs: Vec<usize> = terms.iter().map(|t| self.doc_freq(field, t)).collect();

        let mut scores = Scores::new();
        for first in view.live_postings(field, head) {
            let mut starts: Vec<u32> = first.positions.clone();
            for (offset, postings) in tail_postings.iter().enumerate() {
                let Ok(idx) = postings.binary_search_by_key(&first.doc_id, |p| p.doc_id) else {
                    starts.clear();
                    break;
                };
                let positions = &postings[idx].positions;
                starts.retain(|start| positions.binary_search(&(start + offset as u32 + 1)).is_ok());
                if starts.is_empty() {
                    break;
                }
            }
            if !starts.is_empty() {
                let freq = starts.len() as u32;
                let score: f32 = dfs.iter().map(|df| self.term_score(freq, *df)).sum();
                scores.insert(first.doc_id, score);
            }
        }
        scores
    }
}

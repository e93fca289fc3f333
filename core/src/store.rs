//! The on-disk index: commit points, writer sessions and reader sessions.

use crate::config::IndexerConfig;
use crate::error::{IndexError, Result};
use crate::index::{DocId, IndexedDocument, Segment, SegmentView};
use crate::persist::{
    clean_directory, load_meta, load_segment, now_rfc3339, remove_unreferenced, save_meta, save_segment,
    segment_name, IndexPaths, MetaFile, SegmentMeta,
};
use crate::query::Query;
use crate::reader::{LoadedSegment, ReaderSession, Searcher};
use crate::tokenizer::Analyzer;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeSet;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Attempts made to load a snapshot whose segments were merged away underneath us.
const SNAPSHOT_ATTEMPTS: usize = 3;

/// Owns one index directory.
///
/// Writer sessions are serialized by an in-process lock; reader sessions are
/// independent snapshots and never wait for writers.
pub struct IndexStore {
    paths: IndexPaths,
    analyzer: Arc<Analyzer>,
    store_term_vectors: bool,
    merge_factor: usize,
    write_lock: Mutex<()>,
    /// Segment files are immutable, so a loaded segment is shared by name.
    segments: DashMap<String, Arc<Segment>>,
    sessions: AtomicU64,
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("root", &self.paths.root)
            .field("cached_segments", &self.segments.len())
            .finish()
    }
}

impl IndexStore {
    pub fn open(config: &IndexerConfig) -> Result<Self> {
        config.validate()?;
        let paths = IndexPaths::new(&config.index_dir);
        std::fs::create_dir_all(&paths.root).map_err(|e| IndexError::unavailable(&paths.root, e))?;
        let meta = load_meta(&paths)?;
        tracing::info!(
            root = %paths.root.display(),
            segments = meta.segments.len(),
            num_docs = meta.num_docs(),
            "opened index"
        );
        Ok(Self {
            paths,
            analyzer: Arc::new(Analyzer::new(config.stemmer)),
            store_term_vectors: config.store_term_vectors,
            merge_factor: config.merge_factor,
            write_lock: Mutex::new(()),
            segments: DashMap::new(),
            sessions: AtomicU64::new(0),
        })
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    pub fn analyzer(&self) -> &Arc<Analyzer> {
        &self.analyzer
    }

    /// Reader and writer sessions opened so far.
    pub fn sessions_opened(&self) -> u64 {
        self.sessions.load(Ordering::Relaxed)
    }

    /// Open a writer session, waiting for any other writer in this process.
    pub fn writer(&self) -> Result<IndexWriter<'_>> {
        let guard = self.write_lock.lock();
        let meta = load_meta(&self.paths)?;
        self.sessions.fetch_add(1, Ordering::Relaxed);
        Ok(IndexWriter {
            store: self,
            _guard: guard,
            meta,
            committed: None,
            pending: Segment::new(),
            pending_deleted: BTreeSet::new(),
            dirty: false,
        })
    }

    /// Open a reader over the current commit point.
    pub fn open_reader(&self) -> Result<ReaderSession> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let meta = load_meta(&self.paths)?;
            match self.load_segments(&meta) {
                Ok(segments) => {
                    self.sessions.fetch_add(1, Ordering::Relaxed);
                    self.segments.retain(|name, _| meta.segments.iter().any(|s| &s.name == name));
                    return Ok(ReaderSession::new(self.paths.root.clone(), segments));
                }
                Err((name, e)) if e.kind() == io::ErrorKind::NotFound && attempt < SNAPSHOT_ATTEMPTS => {
                    tracing::debug!(segment = %name, attempt, "segment vanished while opening reader, retrying");
                }
                Err((name, e)) => return Err(IndexError::unavailable(&self.paths.segment(&name), e)),
            }
        }
    }

    fn load_segments(&self, meta: &MetaFile) -> std::result::Result<Vec<LoadedSegment>, (String, io::Error)> {
        meta.segments
            .iter()
            .map(|sm| {
                let segment = self.segment(&sm.name).map_err(|e| (sm.name.clone(), e))?;
                Ok(LoadedSegment { name: sm.name.clone(), segment, deleted: sm.deleted.clone() })
            })
            .collect()
    }

    fn segment(&self, name: &str) -> io::Result<Arc<Segment>> {
        if let Some(seg) = self.segments.get(name) {
            return Ok(Arc::clone(seg.value()));
        }
        let seg = Arc::new(load_segment(&self.paths, name)?);
        self.segments.insert(name.to_string(), Arc::clone(&seg));
        Ok(seg)
    }

    /// Add one document and commit.
    pub fn add_document(&self, doc: IndexedDocument) -> Result<()> {
        let mut writer = self.writer()?;
        writer.add_document(doc);
        writer.commit()
    }

    /// Delete every document matching `query` and commit. Returns the number deleted.
    pub fn delete_by_query(&self, query: &Query) -> Result<usize> {
        let mut writer = self.writer()?;
        let deleted = writer.delete_by_query(query)?;
        writer.commit()?;
        Ok(deleted)
    }

    /// Replace every entry for `doc.id` with `doc` in a single commit.
    pub fn replace_document(&self, doc: IndexedDocument) -> Result<()> {
        let mut writer = self.writer()?;
        writer.delete_by_query(&Query::term(crate::index::Field::Id, doc.id.clone()))?;
        writer.add_document(doc);
        writer.commit()
    }

    /// Wipe the index directory and leave an empty commit point behind.
    pub fn clean(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        let generation = load_meta(&self.paths).map(|m| m.generation).unwrap_or(0);
        clean_directory(&self.paths)?;
        self.segments.clear();
        let mut meta = MetaFile::empty();
        // Keep counting so new segment names never repeat old ones.
        meta.generation = generation;
        save_meta(&self.paths, &meta)?;
        tracing::info!(root = %self.paths.root.display(), "cleaned index");
        Ok(())
    }

    /// Live documents in the current commit point.
    pub fn num_docs(&self) -> Result<usize> {
        Ok(self.open_reader()?.num_docs())
    }
}

/// A write session. Operations apply in call order; nothing is visible to readers
/// until [`IndexWriter::commit`]. Dropping the writer discards its changes.
pub struct IndexWriter<'a> {
    store: &'a IndexStore,
    _guard: MutexGuard<'a, ()>,
    meta: MetaFile,
    /// Committed segments, loaded on the first delete.
    committed: Option<Vec<Arc<Segment>>>,
    pending: Segment,
    pending_deleted: BTreeSet<DocId>,
    dirty: bool,
}

impl<'a> IndexWriter<'a> {
    pub fn add_document(&mut self, doc: IndexedDocument) {
        tracing::debug!(id = %doc.id, representative = doc.representative, "buffering document");
        self.pending.push(doc, &self.store.analyzer, self.store.store_term_vectors);
        self.dirty = true;
    }

    /// Mark every matching document, committed or buffered, as deleted.
    pub fn delete_by_query(&mut self, query: &Query) -> Result<usize> {
        if self.committed.is_none() {
            let segments = self
                .meta
                .segments
                .iter()
                .map(|sm| self.store.segment(&sm.name).map_err(|e| IndexError::unavailable(&self.store.paths.segment(&sm.name), e)))
                .collect::<Result<Vec<_>>>()?;
            self.committed = Some(segments);
        }
        let committed = self.committed.as_deref().unwrap_or(&[]);

        let mut views: Vec<SegmentView<'_>> = committed
            .iter()
            .zip(&self.meta.segments)
            .map(|(segment, sm)| SegmentView { segment, deleted: &sm.deleted })
            .collect();
        views.push(SegmentView { segment: &self.pending, deleted: &self.pending_deleted });
        let pending_ordinal = views.len() - 1;

        let matches = Searcher::new(views).matches(query);
        let mut deleted = 0;
        for (ordinal, docs) in matches {
            deleted += docs.len();
            let target = if ordinal == pending_ordinal {
                &mut self.pending_deleted
            } else {
                &mut self.meta.segments[ordinal].deleted
            };
            target.extend(docs.into_keys());
        }
        if deleted > 0 {
            self.dirty = true;
        }
        tracing::debug!(%query, deleted, "delete by query");
        Ok(deleted)
    }

    /// Persist buffered changes and publish a new commit point.
    pub fn commit(mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let store = self.store;
        let paths = &store.paths;
        let mut written: Vec<(String, Arc<Segment>)> = Vec::new();

        let pending = std::mem::take(&mut self.pending);
        if pending.len() > self.pending_deleted.len() {
            self.meta.generation += 1;
            let name = segment_name(self.meta.generation);
            save_segment(paths, &name, &pending)?;
            self.meta.segments.push(SegmentMeta {
                name: name.clone(),
                num_docs: pending.len() as u32,
                deleted: std::mem::take(&mut self.pending_deleted),
            });
            written.push((name, Arc::new(pending)));
        }
        self.meta.segments.retain(|s| s.live_docs() > 0);

        if self.meta.segments.len() > store.merge_factor {
            let merged = self.merge(&written)?;
            written.push(merged);
        }

        self.meta.updated_at = now_rfc3339();
        save_meta(paths, &self.meta)?;
        for (name, segment) in written {
            store.segments.insert(name, segment);
        }
        match remove_unreferenced(paths, &self.meta) {
            Ok(removed) if !removed.is_empty() => tracing::debug!(?removed, "removed unreferenced segments"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "failed to remove unreferenced segments"),
        }
        tracing::info!(
            generation = self.meta.generation,
            segments = self.meta.segments.len(),
            num_docs = self.meta.num_docs(),
            "committed index"
        );
        Ok(())
    }

    /// Rewrite all live documents into one segment, in index order.
    fn merge(&mut self, fresh: &[(String, Arc<Segment>)]) -> Result<(String, Arc<Segment>)> {
        let store = self.store;
        let mut merged = Segment::new();
        for sm in &self.meta.segments {
            let segment = match fresh.iter().find(|(name, _)| name == &sm.name) {
                Some((_, seg)) => Arc::clone(seg),
                None => store.segment(&sm.name).map_err(|e| IndexError::unavailable(&store.paths.segment(&sm.name), e))?,
            };
            for (doc_id, doc) in segment.docs.iter().enumerate() {
                if !sm.deleted.contains(&(doc_id as DocId)) {
                    merged.push_stored(doc.clone(), &store.analyzer);
                }
            }
        }
        self.meta.generation += 1;
        let name = segment_name(self.meta.generation);
        save_segment(&store.paths, &name, &merged)?;
        tracing::info!(merged_segments = self.meta.segments.len(), num_docs = merged.len(), segment = %name, "merged segments");
        self.meta.segments = vec![SegmentMeta { name: name.clone(), num_docs: merged.len() as u32, deleted: BTreeSet::new() }];
        Ok((name, Arc::new(merged)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Field;

    fn store(dir: &std::path::Path) -> IndexStore {
        IndexStore::open(&IndexerConfig::new(dir)).unwrap()
    }

    fn ids(reader: &ReaderSession, query: &Query) -> Vec<String> {
        reader
            .search(query, reader.num_docs())
            .iter()
            .filter_map(|h| reader.doc(h.address).map(|d| d.id.clone()))
            .collect()
    }

    #[test]
    fn add_is_visible_after_commit_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let before = store.open_reader().unwrap();

        let mut writer = store.writer().unwrap();
        writer.add_document(IndexedDocument::new("A", "the quick fox", true));
        let mid = store.open_reader().unwrap();
        assert_eq!(mid.num_docs(), 0);
        writer.commit().unwrap();

        assert_eq!(before.num_docs(), 0);
        let after = store.open_reader().unwrap();
        assert_eq!(ids(&after, &Query::term(Field::Text, "fox")), vec!["A"]);
    }

    #[test]
    fn dropped_writer_discards_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        {
            let mut writer = store.writer().unwrap();
            writer.add_document(IndexedDocument::new("A", "fox", true));
        }
        assert_eq!(store.num_docs().unwrap(), 0);
    }

    #[test]
    fn delete_sees_earlier_adds_in_same_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.add_document(IndexedDocument::new("A", "old text", true)).unwrap();
        store.replace_document(IndexedDocument::new("A", "new text", true)).unwrap();

        let reader = store.open_reader().unwrap();
        assert_eq!(reader.num_docs(), 1);
        assert!(ids(&reader, &Query::term(Field::Text, "old")).is_empty());
        assert_eq!(ids(&reader, &Query::term(Field::Text, "new")), vec!["A"]);

        let mut writer = store.writer().unwrap();
        writer.add_document(IndexedDocument::new("B", "fox", false));
        assert_eq!(writer.delete_by_query(&Query::term(Field::Id, "B")).unwrap(), 1);
        writer.add_document(IndexedDocument::new("C", "fox", false));
        writer.commit().unwrap();
        let reader = store.open_reader().unwrap();
        assert_eq!(ids(&reader, &Query::term(Field::Text, "fox")), vec!["C"]);
    }

    #[test]
    fn delete_of_absent_id_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.add_document(IndexedDocument::new("A", "fox", true)).unwrap();
        let meta_before = std::fs::read(store.paths().meta()).unwrap();
        assert_eq!(store.delete_by_query(&Query::term(Field::Id, "missing")).unwrap(), 0);
        assert_eq!(std::fs::read(store.paths().meta()).unwrap(), meta_before);
        assert_eq!(store.num_docs().unwrap(), 1);
    }

    #[test]
    fn fully_deleted_segments_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.add_document(IndexedDocument::new("A", "fox", true)).unwrap();
        store.add_document(IndexedDocument::new("B", "dog", true)).unwrap();
        store.delete_by_query(&Query::term(Field::Id, "A")).unwrap();
        let reader = store.open_reader().unwrap();
        assert_eq!(reader.segment_names().count(), 1);
        assert!(!store.paths().segment(&segment_name(1)).exists());
    }

    #[test]
    fn merge_keeps_documents_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = IndexerConfig::new(dir.path());
        config.merge_factor = 3;
        let store = IndexStore::open(&config).unwrap();
        for i in 0..5 {
            store.add_document(IndexedDocument::new(format!("W{i}"), "mar salgado", i == 0)).unwrap();
        }
        store.delete_by_query(&Query::term(Field::Id, "W2")).unwrap();

        let reader = store.open_reader().unwrap();
        assert!(reader.segment_names().count() <= 3);
        assert_eq!(ids(&reader, &Query::term(Field::Text, "mar")), vec!["W0", "W1", "W3", "W4"]);
        assert_eq!(reader.count(&Query::term(Field::Representative, "true")), 1);
    }

    #[test]
    fn clean_empties_index_and_keeps_generation() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.add_document(IndexedDocument::new("A", "fox", true)).unwrap();
        store.clean().unwrap();
        assert_eq!(store.num_docs().unwrap(), 0);
        store.add_document(IndexedDocument::new("B", "dog", true)).unwrap();
        let reader = store.open_reader().unwrap();
        assert_eq!(reader.segment_names().collect::<Vec<_>>(), vec![segment_name(2).as_str()]);
    }

    #[test]
    fn reopened_store_sees_committed_data() {
        let dir = tempfile::tempdir().unwrap();
        store(dir.path()).add_document(IndexedDocument::new("A", "fox", true)).unwrap();
        let reopened = store(dir.path());
        assert_eq!(reopened.num_docs().unwrap(), 1);
        assert_eq!(reopened.sessions_opened(), 1);
    }
}

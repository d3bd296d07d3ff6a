use crate::backend::{compare_by, BackendKind, SearchBackend, SearchHit, SearchOptions, SearchResults};
use crate::document::{DocumentId, IndexedDocument};
use crate::error::{Result, SheafError};
use crate::query::parser::{parse_query, Query, QueryNode};
use crate::record::RecordType;
use crate::utils::{extract_tokens, tokenize_query};
use roaring::RoaringBitmap;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Slot number of a document inside a [`DocumentTable`]
type Slot = u32;

/// Tables smaller than this are never compacted
const MIN_COMPACTION_SLOTS: usize = 64;

/// Inverted index over the documents of one connection.
///
/// Removed documents leave a tombstoned slot behind; postings are not rewritten
/// on removal but are always intersected with the live bitmap. Once tombstones
/// exceed the compaction ratio the table is rebuilt from its live documents.
#[derive(Debug, Clone, Default)]
pub(crate) struct DocumentTable {
    slots: Vec<Option<IndexedDocument>>,
    by_id: HashMap<DocumentId, Slot>,
    /// Token -> slots containing it
    postings: HashMap<String, RoaringBitmap>,
    /// Record type -> slots of that type
    by_type: HashMap<RecordType, RoaringBitmap>,
    live: RoaringBitmap,
    tombstones: usize,
}

impl DocumentTable {
    pub(crate) fn from_documents(documents: Vec<IndexedDocument>) -> Self {
        let mut table = Self::default();
        for document in documents {
            table.upsert(document);
        }
        table
    }

    pub(crate) fn len(&self) -> usize {
        self.live.len() as usize
    }

    /// Insert a document, replacing any document with the same id
    pub(crate) fn upsert(&mut self, document: IndexedDocument) {
        self.remove(&document.id);

        let slot = self.slots.len() as Slot;
        for token in extract_tokens(&document.text) {
            self.postings.entry(token).or_default().insert(slot);
        }
        self.by_type
            .entry(document.record_type.clone())
            .or_default()
            .insert(slot);
        self.by_id.insert(document.id.clone(), slot);
        self.live.insert(slot);
        self.slots.push(Some(document));
    }

    /// Remove a document; returns whether it was present
    pub(crate) fn remove(&mut self, id: &DocumentId) -> bool {
        let Some(slot) = self.by_id.remove(id) else {
            return false;
        };
        self.live.remove(slot);
        if let Some(document) = self.slots[slot as usize].take() {
            if let Some(slots) = self.by_type.get_mut(&document.record_type) {
                slots.remove(slot);
            }
        }
        self.tombstones += 1;
        true
    }

    /// Remove every document of the given types, or everything; returns the number removed
    pub(crate) fn clear(&mut self, models: Option<&[RecordType]>) -> usize {
        let Some(models) = models else {
            let removed = self.len();
            *self = Self::default();
            return removed;
        };

        let doomed: Vec<DocumentId> = self
            .slots_of(models)
            .iter()
            .filter_map(|slot| self.slots[slot as usize].as_ref())
            .map(|doc| doc.id.clone())
            .collect();

        for id in &doomed {
            self.remove(id);
        }
        doomed.len()
    }

    /// Rebuild the table when tombstones exceed `ratio` of all slots
    pub(crate) fn maybe_compact(&mut self, ratio: f32) -> bool {
        let total = self.slots.len();
        if total < MIN_COMPACTION_SLOTS || (self.tombstones as f32) <= ratio * total as f32 {
            return false;
        }
        let documents: Vec<IndexedDocument> = self.slots.drain(..).flatten().collect();
        *self = Self::from_documents(documents);
        true
    }

    pub(crate) fn documents(&self) -> impl Iterator<Item = &IndexedDocument> {
        self.slots.iter().flatten()
    }

    pub(crate) fn search(&self, query_string: &str, options: &SearchOptions) -> SearchResults {
        let query = parse_query(query_string);
        let mut matched = self.evaluate(&query.root);
        if !options.models.is_empty() {
            matched &= self.slots_of(&options.models);
        }

        let hits = matched.len() as usize;
        let terms = query_terms(&query);
        let mut scored: Vec<(&IndexedDocument, f32)> = matched
            .iter()
            .filter_map(|slot| {
                self.slots[slot as usize]
                    .as_ref()
                    .map(|doc| (doc, self.score(slot, &terms)))
            })
            .collect();

        if options.order_by.is_empty() {
            scored.sort_by(|a, b| {
                b.1.total_cmp(&a.1)
                    .then_with(|| a.0.record_type.cmp(&b.0.record_type))
                    .then_with(|| a.0.record_id.cmp(&b.0.record_id))
            });
        } else {
            scored.sort_by(|a, b| {
                options
                    .order_by
                    .iter()
                    .map(|key| compare_by(a.0, b.0, key))
                    .find(|o| o.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        let results = scored
            .into_iter()
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|(doc, score)| SearchHit::from_document(doc, score))
            .collect();

        SearchResults { hits, results }
    }

    fn evaluate(&self, node: &QueryNode) -> RoaringBitmap {
        match node {
            QueryNode::Empty | QueryNode::MatchAll => self.live.clone(),
            QueryNode::Term(term) => self.term_slots(term),
            QueryNode::Phrase(phrase) => {
                // Substring match, so a phrase need not start or end on a token boundary
                let needle = phrase.to_lowercase();
                self.live
                    .iter()
                    .filter(|&slot| {
                        self.slots[slot as usize]
                            .as_ref()
                            .is_some_and(|doc| doc.text.to_lowercase().contains(&needle))
                    })
                    .collect()
            }
            QueryNode::And(nodes) => {
                let mut result = self.live.clone();
                for node in nodes {
                    match node {
                        QueryNode::Not(inner) => result -= self.evaluate(inner),
                        other => result &= self.evaluate(other),
                    }
                }
                result
            }
            QueryNode::Or(nodes) => {
                let mut result = RoaringBitmap::new();
                for node in nodes {
                    result |= self.evaluate(node);
                }
                result
            }
            QueryNode::Not(inner) => &self.live - &self.evaluate(inner),
            QueryNode::Model(types) => self.slots_of(types),
        }
    }

    /// Slots containing every token of `term`
    fn term_slots(&self, term: &str) -> RoaringBitmap {
        let tokens = tokenize_query(term);
        if tokens.is_empty() {
            return self.live.clone();
        }

        let mut sets: Vec<&RoaringBitmap> = Vec::with_capacity(tokens.len());
        for token in &tokens {
            match self.postings.get(token) {
                Some(slots) => sets.push(slots),
                None => return RoaringBitmap::new(),
            }
        }

        // Smallest first for cheap intersection
        sets.sort_by_key(|s| s.len());
        let mut result = sets[0] & &self.live;
        for set in &sets[1..] {
            result &= *set;
        }
        result
    }

    fn slots_of(&self, models: &[RecordType]) -> RoaringBitmap {
        let mut result = RoaringBitmap::new();
        for model in models {
            if let Some(slots) = self.by_type.get(model) {
                result |= slots;
            }
        }
        result &= &self.live;
        result
    }

    /// Fraction of query tokens present in the document
    fn score(&self, slot: Slot, terms: &[String]) -> f32 {
        if terms.is_empty() {
            return 1.0;
        }
        let found = terms
            .iter()
            .filter(|t| self.postings.get(*t).is_some_and(|s| s.contains(slot)))
            .count();
        found as f32 / terms.len() as f32
    }
}

/// Positive tokens of a query, used for scoring
fn query_terms(query: &Query) -> Vec<String> {
    fn collect(node: &QueryNode, out: &mut Vec<String>) {
        match node {
            QueryNode::Term(t) | QueryNode::Phrase(t) => out.extend(tokenize_query(t)),
            QueryNode::And(nodes) | QueryNode::Or(nodes) => {
                for node in nodes {
                    collect(node, out);
                }
            }
            QueryNode::Not(_) | QueryNode::Model(_) | QueryNode::MatchAll | QueryNode::Empty => {}
        }
    }

    let mut terms = Vec::new();
    collect(&query.root, &mut terms);
    terms.sort();
    terms.dedup();
    terms
}

pub(crate) fn read_table<'a>(
    connection: &str,
    table: &'a RwLock<DocumentTable>,
) -> Result<RwLockReadGuard<'a, DocumentTable>> {
    table
        .read()
        .map_err(|_| SheafError::backend(connection, "index lock poisoned"))
}

pub(crate) fn write_table<'a>(
    connection: &str,
    table: &'a RwLock<DocumentTable>,
) -> Result<RwLockWriteGuard<'a, DocumentTable>> {
    table
        .write()
        .map_err(|_| SheafError::backend(connection, "index lock poisoned"))
}

/// In-process backend; contents live as long as the backend value
pub struct MemoryBackend {
    connection: String,
    table: RwLock<DocumentTable>,
    compaction_ratio: f32,
}

impl MemoryBackend {
    pub fn new(connection: &str, compaction_ratio: f32) -> Self {
        Self {
            connection: connection.to_string(),
            table: RwLock::new(DocumentTable::default()),
            compaction_ratio,
        }
    }
}

impl SearchBackend for MemoryBackend {
    fn connection_name(&self) -> &str {
        &self.connection
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn update(&self, documents: &[IndexedDocument]) -> Result<()> {
        let mut table = write_table(&self.connection, &self.table)?;
        for document in documents {
            table.upsert(document.clone());
        }
        table.maybe_compact(self.compaction_ratio);
        Ok(())
    }

    fn remove(&self, id: &DocumentId) -> Result<()> {
        let mut table = write_table(&self.connection, &self.table)?;
        table.remove(id);
        table.maybe_compact(self.compaction_ratio);
        Ok(())
    }

    fn clear(&self, models: Option<&[RecordType]>) -> Result<()> {
        let mut table = write_table(&self.connection, &self.table)?;
        table.clear(models);
        table.maybe_compact(self.compaction_ratio);
        Ok(())
    }

    fn search(&self, query_string: &str, options: &SearchOptions) -> Result<SearchResults> {
        let table = read_table(&self.connection, &self.table)?;
        Ok(table.search(query_string, options))
    }

    fn document_count(&self) -> Result<usize> {
        Ok(read_table(&self.connection, &self.table)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::OrderBy;
    use serde_json::json;

    fn doc(record_type: &str, id: u64, text: &str) -> IndexedDocument {
        IndexedDocument::new(RecordType::from(record_type), id, text.to_string())
    }

    fn sample_backend() -> MemoryBackend {
        let backend = MemoryBackend::new("default", 0.5);
        backend
            .update(&[
                doc("foo", 1, "foo 1"),
                doc("foo", 2, "foo 2"),
                doc("bar", 1, "bar 1"),
                doc("bar", 2, "bar 2"),
                doc("bar", 3, "bar 3"),
            ])
            .unwrap();
        backend
    }

    fn hits(backend: &MemoryBackend, query: &str) -> usize {
        backend.search(query, &SearchOptions::default()).unwrap().hits
    }

    #[test]
    fn test_search_terms() {
        let backend = sample_backend();
        assert_eq!(hits(&backend, "foo"), 2);
        assert_eq!(hits(&backend, "bar"), 3);
        assert_eq!(hits(&backend, "1"), 2);
        assert_eq!(hits(&backend, "foo 1"), 1);
        assert_eq!(hits(&backend, "baz"), 0);
        assert_eq!(hits(&backend, ""), 5);
        assert_eq!(hits(&backend, "*"), 5);
    }

    #[test]
    fn test_search_boolean() {
        let backend = sample_backend();
        assert_eq!(hits(&backend, "foo | bar"), 5);
        assert_eq!(hits(&backend, "bar -3"), 2);
        assert_eq!(hits(&backend, "-foo"), 3);
        assert_eq!(hits(&backend, "(foo | bar) 2"), 2);
    }

    #[test]
    fn test_search_phrase_verified() {
        let backend = MemoryBackend::new("default", 0.5);
        backend
            .update(&[doc("foo", 1, "haystack test"), doc("foo", 2, "test of haystack")])
            .unwrap();
        assert_eq!(hits(&backend, "\"haystack test\""), 1);
        assert_eq!(hits(&backend, "haystack test"), 2);
    }

    #[test]
    fn test_search_phrase_is_substring() {
        let backend = sample_backend();
        assert_eq!(hits(&backend, "\"oo 1\""), 1);
        assert_eq!(hits(&backend, "\"AR 2\""), 1);
        assert_eq!(hits(&backend, "\"1 bar\""), 0);
    }

    #[test]
    fn test_search_models() {
        let backend = sample_backend();
        let options = SearchOptions {
            models: vec![RecordType::from("bar")],
            ..Default::default()
        };
        assert_eq!(backend.search("", &options).unwrap().hits, 3);
        assert_eq!(backend.search("1", &options).unwrap().hits, 1);
        assert_eq!(hits(&backend, "model:foo"), 2);
        assert_eq!(hits(&backend, "model:baz"), 0);
    }

    #[test]
    fn test_model_clause_composes() {
        let backend = sample_backend();
        assert_eq!(hits(&backend, "-model:bar"), 2);
        assert_eq!(hits(&backend, "foo | model:bar"), 5);
        assert_eq!(hits(&backend, "model:foo,bar 1"), 2);
        assert_eq!(hits(&backend, "-(model:foo 1)"), 4);

        // Options restrict on top of the query string
        let bars = SearchOptions {
            models: vec![RecordType::from("bar")],
            ..Default::default()
        };
        assert_eq!(backend.search("model:foo", &bars).unwrap().hits, 0);
        assert_eq!(backend.search("model:foo | 2", &bars).unwrap().hits, 1);
    }

    #[test]
    fn test_upsert_replaces() {
        let backend = sample_backend();
        backend.update(&[doc("foo", 1, "a different body")]).unwrap();
        assert_eq!(backend.document_count().unwrap(), 5);
        assert_eq!(hits(&backend, "foo"), 1);
        assert_eq!(hits(&backend, "different"), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let backend = sample_backend();
        backend.remove(&DocumentId::new(&RecordType::from("foo"), 1)).unwrap();
        // Removing again is not an error
        backend.remove(&DocumentId::new(&RecordType::from("foo"), 1)).unwrap();
        assert_eq!(hits(&backend, "foo"), 1);

        backend.clear(Some(&[RecordType::from("bar")])).unwrap();
        assert_eq!(backend.document_count().unwrap(), 1);

        backend.clear(None).unwrap();
        assert_eq!(backend.document_count().unwrap(), 0);
    }

    #[test]
    fn test_order_limit_offset() {
        let backend = sample_backend();
        let options = SearchOptions {
            models: vec![RecordType::from("bar")],
            order_by: vec![OrderBy::parse("-id")],
            offset: 1,
            limit: Some(1),
        };
        let results = backend.search("", &options).unwrap();
        assert_eq!(results.hits, 3);
        assert_eq!(results.results.len(), 1);
        assert_eq!(results.results[0].record_id, 2);
        assert_eq!(results.results[0].text, "bar 2");
    }

    #[test]
    fn test_order_by_stored_field() {
        let backend = MemoryBackend::new("default", 0.5);
        let mut first = doc("foo", 1, "foo");
        first.fields.insert("title".to_string(), json!("b"));
        let mut second = doc("foo", 2, "foo");
        second.fields.insert("title".to_string(), json!("a"));
        backend.update(&[first, second]).unwrap();

        let options = SearchOptions {
            order_by: vec![OrderBy::parse("title")],
            ..Default::default()
        };
        let results = backend.search("foo", &options).unwrap();
        assert_eq!(results.results[0].record_id, 2);
    }

    #[test]
    fn test_relevance_order() {
        let backend = MemoryBackend::new("default", 0.5);
        backend
            .update(&[doc("foo", 1, "alpha"), doc("foo", 2, "alpha beta")])
            .unwrap();
        let results = backend.search("alpha | beta", &SearchOptions::default()).unwrap();
        assert_eq!(results.results[0].record_id, 2);
        assert!(results.results[0].score > results.results[1].score);
    }

    #[test]
    fn test_compaction_keeps_live_documents() {
        let mut table = DocumentTable::default();
        for i in 0..100 {
            table.upsert(doc("foo", i, &format!("foo {}", i)));
        }
        for i in 0..60 {
            table.remove(&DocumentId::new(&RecordType::from("foo"), i));
        }
        assert!(table.maybe_compact(0.5));
        assert_eq!(table.len(), 40);
        assert_eq!(table.slots.len(), 40);
        assert_eq!(table.tombstones, 0);

        let results = table.search("foo", &SearchOptions::default());
        assert_eq!(results.hits, 40);
        assert_eq!(table.search("99", &SearchOptions::default()).hits, 1);
        assert_eq!(table.search("5", &SearchOptions::default()).hits, 0);
    }
}

use crate::locks::KeyedLocks;
use crate::store::Store;
use crate::tokenizer::{terms, tokenize};
use crate::{DocId, EdgeId, Position, Result, TermId};
use std::collections::HashMap;
use std::sync::Arc;

/// Turns page text into occurrences and page links into graph edges.
pub trait Indexer: Send + Sync {
    /// Returns true if this call wrote the document's occurrences.
    fn index_document(&self, doc: DocId, text: &str) -> Result<bool>;

    /// Returns the new edge, or None for a self-link.
    fn add_link(&self, from: DocId, to: DocId, anchor_text: &str) -> Result<Option<EdgeId>>;
}

#[derive(Clone)]
pub struct StoreIndexer {
    store: Store,
    locks: Arc<KeyedLocks<DocId>>,
}

impl StoreIndexer {
    pub fn new(store: Store) -> Self {
        Self { store, locks: Arc::new(KeyedLocks::new()) }
    }

    pub fn store(&self) -> &Store { &self.store }

    /// Resolve a URL to its document, creating it if needed, and index it.
    pub fn index_url(&self, url: &str, text: &str) -> Result<(DocId, bool)> {
        let doc = self.store.document_id(url)?;
        Ok((doc, self.index_document(doc, text)?))
    }

    fn resolve_terms<I: Iterator<Item = (String, Position)>>(&self, tokens: I) -> Result<Vec<(TermId, Position)>> {
        let mut ids: HashMap<String, TermId> = HashMap::new();
        let mut entries = Vec::new();
        for (term, pos) in tokens {
            let tid = match ids.get(&term) {
                Some(&tid) => tid,
                None => {
                    let tid = self.store.term_id(&term)?;
                    ids.insert(term, tid);
                    tid
                }
            };
            entries.push((tid, pos));
        }
        Ok(entries)
    }
}

impl Indexer for StoreIndexer {
    fn index_document(&self, doc: DocId, text: &str) -> Result<bool> {
        self.locks.with(&doc, || {
            if self.store.is_indexed(doc)? {
                tracing::debug!(doc, "already indexed");
                return Ok(false);
            }
            let entries = self.resolve_terms(tokenize(text))?;
            let written = self.store.write_occurrences(doc, &entries)?;
            if written {
                tracing::debug!(doc, words = entries.len(), "indexed document");
            }
            Ok(written)
        })
    }

    fn add_link(&self, from: DocId, to: DocId, anchor_text: &str) -> Result<Option<EdgeId>> {
        if from == to {
            return Ok(None);
        }
        let mut anchor_terms = Vec::new();
        for term in terms(anchor_text) {
            anchor_terms.push(self.store.term_id(&term)?);
        }
        anchor_terms.sort_unstable();
        anchor_terms.dedup();
        let edge = self.store.insert_edge(from, to, &anchor_terms)?;
        Ok(Some(edge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexing_twice_is_a_noop() {
        let indexer = StoreIndexer::new(Store::temporary().unwrap());
        let (doc, first) = indexer.index_url("http://a.test/", "cats are great").unwrap();
        assert!(first);
        assert!(!indexer.index_document(doc, "cats are great").unwrap());
        let store = indexer.store();
        assert_eq!(store.document(doc).unwrap().unwrap().word_count, 3);
        let cats = store.lookup_term("cats").unwrap().unwrap();
        assert_eq!(store.occurrences(cats).unwrap(), vec![(doc, 0)]);
    }

    #[test]
    fn concurrent_indexing_writes_one_occurrence_set() {
        let store = Store::temporary().unwrap();
        let shared = StoreIndexer::new(store.clone());
        let doc = store.document_id("http://a.test/").unwrap();
        // half the threads share a lock table, the rest race through the store alone
        let results: Vec<bool> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let indexer = if i % 2 == 0 { shared.clone() } else { StoreIndexer::new(store.clone()) };
                    s.spawn(move || indexer.index_document(doc, "cats purr cats").unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results.iter().filter(|&&w| w).count(), 1);
        assert_eq!(store.document(doc).unwrap().unwrap().word_count, 3);
        let cats = store.lookup_term("cats").unwrap().unwrap();
        assert_eq!(store.occurrences(cats).unwrap(), vec![(doc, 0), (doc, 2)]);
        let purr = store.lookup_term("purr").unwrap().unwrap();
        assert_eq!(store.occurrences(purr).unwrap(), vec![(doc, 1)]);
    }

    #[test]
    fn empty_text_leaves_document_unindexed() {
        let indexer = StoreIndexer::new(Store::temporary().unwrap());
        let (doc, written) = indexer.index_url("http://a.test/", "the of and").unwrap();
        assert!(!written);
        assert!(!indexer.store().is_indexed(doc).unwrap());
    }

    #[test]
    fn self_links_are_excluded() {
        let indexer = StoreIndexer::new(Store::temporary().unwrap());
        let a = indexer.store().document_id("http://a.test/").unwrap();
        assert_eq!(indexer.add_link(a, a, "home").unwrap(), None);
        assert!(indexer.store().edges_from(a).unwrap().is_empty());
    }

    #[test]
    fn anchor_words_skip_stopwords() {
        let indexer = StoreIndexer::new(Store::temporary().unwrap());
        let store = indexer.store().clone();
        let a = store.document_id("http://a.test/").unwrap();
        let b = store.document_id("http://b.test/").unwrap();
        indexer.add_link(a, b, "see the dogs").unwrap().unwrap();
        assert!(store.lookup_term("the").unwrap().is_none());
        let dogs = store.lookup_term("dogs").unwrap().unwrap();
        assert_eq!(store.edges_with_term(dogs).unwrap().len(), 1);
    }
}

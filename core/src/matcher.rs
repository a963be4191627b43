use crate::store::Store;
use crate::tokenizer::terms;
use crate::{DocId, Position, Result, TermId};
use std::collections::{BTreeMap, HashMap};

/// One combination of positions, one per query term, inside a single document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRow {
    pub doc: DocId,
    pub positions: Vec<Position>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSet {
    pub rows: Vec<MatchRow>,
    /// Ids of the query terms found in the vocabulary, in query order
    pub term_ids: Vec<TermId>,
}

impl MatchSet {
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    /// Distinct matched documents, ascending.
    pub fn documents(&self) -> Vec<DocId> {
        let mut docs: Vec<DocId> = self.rows.iter().map(|r| r.doc).collect();
        docs.dedup();
        docs
    }
}

pub trait Matcher: Send + Sync {
    fn match_query(&self, query: &str) -> Result<MatchSet>;
}

pub struct StoreMatcher {
    store: Store,
}

impl StoreMatcher {
    pub fn new(store: Store) -> Self { Self { store } }

    /// Query words split on whitespace, each tokenized the way page text is, then resolved
    /// against the vocabulary. Stop words and unknown terms are dropped.
    pub fn resolve_terms(&self, query: &str) -> Result<Vec<TermId>> {
        let mut ids = Vec::new();
        for word in query.split_whitespace() {
            for term in terms(word) {
                match self.store.lookup_term(&term)? {
                    Some(tid) => ids.push(tid),
                    None => tracing::debug!(term, "query term not in vocabulary"),
                }
            }
        }
        Ok(ids)
    }
}

impl Matcher for StoreMatcher {
    fn match_query(&self, query: &str) -> Result<MatchSet> {
        let term_ids = self.resolve_terms(query)?;
        if term_ids.is_empty() {
            return Ok(MatchSet::default());
        }

        // Per term: document -> positions, ordered by document
        let mut per_term: Vec<BTreeMap<DocId, Vec<Position>>> = Vec::with_capacity(term_ids.len());
        let mut loaded: HashMap<TermId, usize> = HashMap::new();
        for &tid in &term_ids {
            if let Some(&i) = loaded.get(&tid) {
                per_term.push(per_term[i].clone());
                continue;
            }
            let mut by_doc: BTreeMap<DocId, Vec<Position>> = BTreeMap::new();
            for (doc, pos) in self.store.occurrences(tid)? {
                by_doc.entry(doc).or_default().push(pos);
            }
            loaded.insert(tid, per_term.len());
            per_term.push(by_doc);
        }

        let mut rows = Vec::new();
        for (&doc, first) in &per_term[0] {
            let mut lists: Vec<&[Position]> = vec![first.as_slice()];
            for by_doc in &per_term[1..] {
                match by_doc.get(&doc) {
                    Some(positions) => lists.push(positions),
                    None => break,
                }
            }
            if lists.len() == per_term.len() {
                cross_join(doc, &lists, &mut rows);
            }
        }
        Ok(MatchSet { rows, term_ids })
    }
}

/// Every combination of one position per list, first list varying slowest.
fn cross_join(doc: DocId, lists: &[&[Position]], rows: &mut Vec<MatchRow>) {
    let mut cursor = vec![0usize; lists.len()];
    loop {
        rows.push(MatchRow { doc, positions: cursor.iter().zip(lists).map(|(&i, l)| l[i]).collect() });
        // advance the odometer from the last column
        let mut col = lists.len();
        loop {
            if col == 0 {
                return;
            }
            col -= 1;
            cursor[col] += 1;
            if cursor[col] < lists[col].len() {
                break;
            }
            cursor[col] = 0;
        }
    }
}

//! Durable document store on sled.
//!
//! One tree per entity plus secondary index trees. Integer keys are big-endian so
//! prefix scans come back ordered: occurrences by term, edges by source or target,
//! anchor words by term.

use crate::network::Layer;
use crate::{DocId, Document, Edge, EdgeId, Error, HiddenId, Position, Result, TermId};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::transaction::ConflictableTransactionError;
use sled::{Batch, Db, IVec, Transactional, Tree};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

const EMPTY: &[u8] = b"";

type TxResult<T> = std::result::Result<T, ConflictableTransactionError<Error>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub documents: usize,
    pub indexed: usize,
    pub terms: usize,
    pub edges: usize,
    pub hidden_nodes: usize,
}

#[derive(Clone)]
pub struct Store {
    db: Db,
    urls: Tree,
    docs: Tree,
    terms: Tree,
    term_text: Tree,
    occurrences: Tree,
    edges: Tree,
    edges_by_source: Tree,
    edges_by_target: Tree,
    edge_words: Tree,
    ranks: Tree,
    hidden_nodes: Tree,
    word_hidden: Tree,
    hidden_url: Tree,
    hidden_by_url: Tree,
    meta: Tree,
    // Edge writers share it, a rank snapshot takes it exclusively.
    graph_gate: Arc<RwLock<()>>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory store removed on drop.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            urls: db.open_tree("urls")?,
            docs: db.open_tree("docs")?,
            terms: db.open_tree("terms")?,
            term_text: db.open_tree("term_text")?,
            occurrences: db.open_tree("occurrences")?,
            edges: db.open_tree("edges")?,
            edges_by_source: db.open_tree("edges_by_source")?,
            edges_by_target: db.open_tree("edges_by_target")?,
            edge_words: db.open_tree("edge_words")?,
            ranks: db.open_tree("ranks")?,
            hidden_nodes: db.open_tree("hidden_nodes")?,
            word_hidden: db.open_tree("word_hidden")?,
            hidden_url: db.open_tree("hidden_url")?,
            hidden_by_url: db.open_tree("hidden_by_url")?,
            meta: db.open_tree("meta")?,
            graph_gate: Arc::new(RwLock::new(())),
            db,
        })
    }

    /// Durably commit everything written so far.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    // --- documents ---

    /// Id for `url`, creating the document on first reference.
    pub fn document_id(&self, url: &str) -> Result<DocId> {
        if let Some(id) = self.lookup_document(url)? {
            return Ok(id);
        }
        let id = self.db.generate_id()?;
        let record = bincode::serialize(&Document { id, url: url.to_string(), indexed: false, word_count: 0 })?;
        let id = (&self.urls, &self.docs).transaction(|(urls, docs)| {
            if let Some(existing) = urls.get(url.as_bytes())? {
                return read_u64("urls", &existing, 0).map_err(ConflictableTransactionError::Abort);
            }
            urls.insert(url.as_bytes(), &id.to_be_bytes()[..])?;
            docs.insert(&id.to_be_bytes()[..], record.as_slice())?;
            Ok(id)
        })?;
        Ok(id)
    }

    pub fn lookup_document(&self, url: &str) -> Result<Option<DocId>> {
        self.urls.get(url.as_bytes())?.map(|v| read_u64("urls", &v, 0)).transpose()
    }

    pub fn document(&self, id: DocId) -> Result<Option<Document>> {
        match self.docs.get(id.to_be_bytes())? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn document_by_url(&self, url: &str) -> Result<Option<Document>> {
        match self.lookup_document(url)? {
            Some(id) => self.document(id),
            None => Ok(None),
        }
    }

    pub fn url(&self, id: DocId) -> Result<Option<String>> {
        Ok(self.document(id)?.map(|d| d.url))
    }

    pub fn is_indexed(&self, id: DocId) -> Result<bool> {
        Ok(self.document(id)?.is_some_and(|d| d.indexed))
    }

    pub fn documents(&self) -> Result<Vec<Document>> {
        self.docs
            .iter()
            .values()
            .map(|raw| -> Result<Document> { Ok(bincode::deserialize(&raw?)?) })
            .collect()
    }

    // --- terms ---

    /// Id for `text`, creating the term on first occurrence.
    pub fn term_id(&self, text: &str) -> Result<TermId> {
        if let Some(id) = self.lookup_term(text)? {
            return Ok(id);
        }
        let id = self.db.generate_id()?;
        let id = (&self.terms, &self.term_text).transaction(|(terms, term_text)| {
            if let Some(existing) = terms.get(text.as_bytes())? {
                return read_u64("terms", &existing, 0).map_err(ConflictableTransactionError::Abort);
            }
            terms.insert(text.as_bytes(), &id.to_be_bytes()[..])?;
            term_text.insert(&id.to_be_bytes()[..], text.as_bytes())?;
            Ok(id)
        })?;
        Ok(id)
    }

    pub fn lookup_term(&self, text: &str) -> Result<Option<TermId>> {
        self.terms.get(text.as_bytes())?.map(|v| read_u64("terms", &v, 0)).transpose()
    }

    pub fn term_text(&self, id: TermId) -> Result<Option<String>> {
        match self.term_text.get(id.to_be_bytes())? {
            Some(raw) => Ok(Some(String::from_utf8_lossy(&raw).into_owned())),
            None => Ok(None),
        }
    }

    // --- occurrences ---

    /// Write all occurrences of one document and mark it indexed, atomically.
    /// Returns false, writing nothing, if the document was already indexed.
    pub fn write_occurrences(&self, doc: DocId, entries: &[(TermId, Position)]) -> Result<bool> {
        if entries.is_empty() {
            return Ok(false);
        }
        let mut batch = Batch::default();
        for &(term, pos) in entries {
            batch.insert(occurrence_key(term, doc, pos), EMPTY);
        }
        let doc_key = doc.to_be_bytes();
        let written = (&self.docs, &self.occurrences).transaction(|(docs, occurrences)| -> TxResult<bool> {
            let raw = docs
                .get(doc_key)?
                .ok_or_else(|| abort(Error::corrupt("docs", format!("missing document {doc}"))))?;
            let mut record: Document = bincode::deserialize(&raw).map_err(abort)?;
            if record.indexed {
                return Ok(false);
            }
            occurrences.apply_batch(&batch)?;
            record.indexed = true;
            record.word_count = entries.len() as u32;
            docs.insert(&doc_key[..], bincode::serialize(&record).map_err(abort)?)?;
            Ok(true)
        })?;
        Ok(written)
    }

    /// Range scan of one term's occurrences, ordered by document then position.
    pub fn occurrences(&self, term: TermId) -> Result<Vec<(DocId, Position)>> {
        self.occurrences
            .scan_prefix(term.to_be_bytes())
            .keys()
            .map(|key| -> Result<(DocId, Position)> {
                let key = key?;
                Ok((read_u64("occurrences", &key, 8)?, read_u32("occurrences", &key, 16)?))
            })
            .collect()
    }

    // --- link graph ---

    /// Append one edge and its anchor words. Duplicate edges between a pair are kept.
    pub fn insert_edge(&self, from: DocId, to: DocId, anchor_terms: &[TermId]) -> Result<EdgeId> {
        let _gate = self.graph_gate.read();
        let id = self.db.generate_id()?;
        let record = bincode::serialize(&Edge { id, from, to })?;
        let mut words = Batch::default();
        for &term in anchor_terms {
            words.insert(pair_key(term, id), EMPTY);
        }
        (&self.edges, &self.edges_by_source, &self.edges_by_target, &self.edge_words).transaction(
            |(edges, by_source, by_target, edge_words)| {
                edges.insert(&id.to_be_bytes()[..], record.as_slice())?;
                by_source.insert(pair_key(from, id), &to.to_be_bytes()[..])?;
                by_target.insert(pair_key(to, id), &from.to_be_bytes()[..])?;
                edge_words.apply_batch(&words)?;
                Ok::<(), ConflictableTransactionError<Error>>(())
            },
        )?;
        Ok(id)
    }

    pub fn edge(&self, id: EdgeId) -> Result<Option<Edge>> {
        match self.edges.get(id.to_be_bytes())? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn edges_from(&self, doc: DocId) -> Result<Vec<Edge>> {
        scan_pairs(&self.edges_by_source, "edges_by_source", doc)
            .map(|res| -> Result<Edge> {
                let (id, value) = res?;
                Ok(Edge { id, from: doc, to: read_u64("edges_by_source", &value, 0)? })
            })
            .collect()
    }

    pub fn edges_to(&self, doc: DocId) -> Result<Vec<Edge>> {
        scan_pairs(&self.edges_by_target, "edges_by_target", doc)
            .map(|res| -> Result<Edge> {
                let (id, value) = res?;
                Ok(Edge { id, from: read_u64("edges_by_target", &value, 0)?, to: doc })
            })
            .collect()
    }

    pub fn inbound_count(&self, doc: DocId) -> Result<usize> {
        Ok(self.edges_by_target.scan_prefix(doc.to_be_bytes()).count())
    }

    /// Edges whose anchor text contains `term`.
    pub fn edges_with_term(&self, term: TermId) -> Result<Vec<Edge>> {
        let mut out = Vec::new();
        for key in self.edge_words.scan_prefix(term.to_be_bytes()).keys() {
            let edge_id = read_u64("edge_words", &key?, 8)?;
            match self.edge(edge_id)? {
                Some(edge) => out.push(edge),
                None => return Err(Error::corrupt("edge_words", format!("dangling edge {edge_id}"))),
            }
        }
        Ok(out)
    }

    /// Every edge, read while edge writers are held off.
    pub fn edge_snapshot(&self) -> Result<Vec<Edge>> {
        let _gate = self.graph_gate.write();
        self.edges
            .iter()
            .values()
            .map(|raw| -> Result<Edge> { Ok(bincode::deserialize(&raw?)?) })
            .collect()
    }

    // --- rank scores ---

    pub fn rank(&self, doc: DocId) -> Result<Option<f64>> {
        self.ranks.get(doc.to_be_bytes())?.map(|v| read_f64("ranks", &v)).transpose()
    }

    /// Replace every stored score with `scores` in one atomic batch.
    pub fn replace_ranks(&self, scores: &HashMap<DocId, f64>) -> Result<()> {
        let mut batch = Batch::default();
        for key in self.ranks.iter().keys() {
            let key = key?;
            if !scores.contains_key(&read_u64("ranks", &key, 0)?) {
                batch.remove(key);
            }
        }
        for (doc, score) in scores {
            batch.insert(&doc.to_be_bytes()[..], &score.to_be_bytes()[..]);
        }
        self.ranks.apply_batch(batch)?;
        Ok(())
    }

    // --- feedback network ---

    pub fn hidden_node(&self, key: &str) -> Result<Option<HiddenId>> {
        self.hidden_nodes.get(key.as_bytes())?.map(|v| read_u64("hidden_nodes", &v, 0)).transpose()
    }

    /// Returns the node for `key` and whether this call created it. A new node and its
    /// `initial` weights are written in one transaction.
    pub fn create_hidden_node(
        &self,
        key: &str,
        initial: impl FnOnce(HiddenId) -> Vec<(Layer, u64, u64, f64)>,
    ) -> Result<(HiddenId, bool)> {
        if let Some(id) = self.hidden_node(key)? {
            return Ok((id, false));
        }
        let id = self.db.generate_id()?;
        let (word_hidden, hidden_url, hidden_by_url) = weight_batches(&initial(id));
        let outcome = (&self.hidden_nodes, &self.word_hidden, &self.hidden_url, &self.hidden_by_url).transaction(
            |(nodes, wh, hu, hbu)| -> TxResult<(HiddenId, bool)> {
                if let Some(existing) = nodes.get(key.as_bytes())? {
                    return Ok((read_u64("hidden_nodes", &existing, 0).map_err(abort)?, false));
                }
                nodes.insert(key.as_bytes(), &id.to_be_bytes()[..])?;
                wh.apply_batch(&word_hidden)?;
                hu.apply_batch(&hidden_url)?;
                hbu.apply_batch(&hidden_by_url)?;
                Ok((id, true))
            },
        )?;
        Ok(outcome)
    }

    pub fn weight(&self, layer: Layer, from: u64, to: u64) -> Result<Option<f64>> {
        let tree = match layer {
            Layer::WordHidden => &self.word_hidden,
            Layer::HiddenUrl => &self.hidden_url,
        };
        tree.get(pair_key(from, to))?.map(|v| read_f64(layer.tree_name(), &v)).transpose()
    }

    /// Hidden nodes wired to any of `terms` or any of `urls`, ascending.
    pub fn hidden_ids_for(&self, terms: &[TermId], urls: &[DocId]) -> Result<Vec<HiddenId>> {
        let mut ids = BTreeSet::new();
        for &term in terms {
            for res in scan_pairs(&self.word_hidden, "word_hidden", term) {
                ids.insert(res?.0);
            }
        }
        for &url in urls {
            for res in scan_pairs(&self.hidden_by_url, "hidden_by_url", url) {
                ids.insert(res?.0);
            }
        }
        Ok(ids.into_iter().collect())
    }

    /// Persist a set of (layer, from, to, strength) updates in one transaction.
    pub fn write_weights(&self, updates: &[(Layer, u64, u64, f64)]) -> Result<()> {
        self.write_weights_checked(&[], updates).map(|_| ())
    }

    /// Persist `updates` only if every `expected` strength (None: never written) is still
    /// what is stored. Returns false, writing nothing, when another writer changed one.
    pub fn write_weights_checked(
        &self,
        expected: &[(Layer, u64, u64, Option<f64>)],
        updates: &[(Layer, u64, u64, f64)],
    ) -> Result<bool> {
        let (word_hidden, hidden_url, hidden_by_url) = weight_batches(updates);
        let written = (&self.word_hidden, &self.hidden_url, &self.hidden_by_url).transaction(|(wh, hu, hbu)| -> TxResult<bool> {
            for &(layer, from, to, seen) in expected {
                let tree = match layer {
                    Layer::WordHidden => wh,
                    Layer::HiddenUrl => hu,
                };
                let current = match tree.get(pair_key(from, to))? {
                    Some(raw) => Some(read_f64(layer.tree_name(), &raw).map_err(abort)?),
                    None => None,
                };
                if current.map(f64::to_bits) != seen.map(f64::to_bits) {
                    return Ok(false);
                }
            }
            wh.apply_batch(&word_hidden)?;
            hu.apply_batch(&hidden_url)?;
            hbu.apply_batch(&hidden_by_url)?;
            Ok(true)
        })?;
        Ok(written)
    }

    // --- operational records ---

    pub fn put_meta<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        self.meta.insert(name.as_bytes(), serde_json::to_vec(value)?)?;
        Ok(())
    }

    pub fn get_meta<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.meta.get(name.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn stats(&self) -> Result<Stats> {
        let mut indexed = 0;
        for doc in self.documents()? {
            if doc.indexed {
                indexed += 1;
            }
        }
        Ok(Stats {
            documents: self.docs.len(),
            indexed,
            terms: self.terms.len(),
            edges: self.edges.len(),
            hidden_nodes: self.hidden_nodes.len(),
        })
    }
}

fn abort<E: Into<Error>>(err: E) -> ConflictableTransactionError<Error> {
    ConflictableTransactionError::Abort(err.into())
}

/// Batches for the word->hidden, hidden->url and url->hidden trees.
fn weight_batches(updates: &[(Layer, u64, u64, f64)]) -> (Batch, Batch, Batch) {
    let mut word_hidden = Batch::default();
    let mut hidden_url = Batch::default();
    let mut hidden_by_url = Batch::default();
    for &(layer, from, to, strength) in updates {
        match layer {
            Layer::WordHidden => word_hidden.insert(pair_key(from, to), &strength.to_be_bytes()[..]),
            Layer::HiddenUrl => {
                hidden_url.insert(pair_key(from, to), &strength.to_be_bytes()[..]);
                hidden_by_url.insert(pair_key(to, from), EMPTY);
            }
        }
    }
    (word_hidden, hidden_url, hidden_by_url)
}

fn pair_key(a: u64, b: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&a.to_be_bytes());
    key.extend_from_slice(&b.to_be_bytes());
    key
}

fn occurrence_key(term: TermId, doc: DocId, pos: Position) -> Vec<u8> {
    let mut key = pair_key(term, doc);
    key.extend_from_slice(&pos.to_be_bytes());
    key
}

/// Scan `prefix‖id` keys, yielding the trailing id and the value.
fn scan_pairs<'a>(tree: &'a Tree, name: &'static str, prefix: u64) -> impl Iterator<Item = Result<(u64, IVec)>> + 'a {
    tree.scan_prefix(prefix.to_be_bytes()).map(move |res| -> Result<(u64, IVec)> {
        let (key, value) = res?;
        Ok((read_u64(name, &key, 8)?, value))
    })
}

fn read_u64(tree: &'static str, bytes: &[u8], offset: usize) -> Result<u64> {
    bytes
        .get(offset..offset + 8)
        .and_then(|s| s.try_into().ok())
        .map(u64::from_be_bytes)
        .ok_or_else(|| Error::corrupt(tree, format!("expected u64 at offset {offset}, found {} bytes", bytes.len())))
}

fn read_u32(tree: &'static str, bytes: &[u8], offset: usize) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .map(u32::from_be_bytes)
        .ok_or_else(|| Error::corrupt(tree, format!("expected u32 at offset {offset}, found {} bytes", bytes.len())))
}

fn read_f64(tree: &'static str, bytes: &[u8]) -> Result<f64> {
    bytes
        .get(..8)
        .and_then(|s| s.try_into().ok())
        .map(f64::from_be_bytes)
        .ok_or_else(|| Error::corrupt(tree, format!("expected f64, found {} bytes", bytes.len())))
}

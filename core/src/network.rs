//! Query-keyed feedback network.
//!
//! Three layers: one input per query term, hidden nodes created on demand for each
//! distinct set of query terms, one output per candidate document. Trained online by
//! back-propagation from the candidate a user selected.

use crate::config::NetworkConfig;
use crate::locks::KeyedLocks;
use crate::store::Store;
use crate::{DocId, Error, HiddenId, Result, TermId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layer {
    WordHidden,
    HiddenUrl,
}

impl Layer {
    /// Strength of a connection that was never written.
    pub fn default_strength(self) -> f64 {
        match self {
            Layer::WordHidden => -0.2,
            Layer::HiddenUrl => 0.0,
        }
    }

    pub(crate) fn tree_name(self) -> &'static str {
        match self {
            Layer::WordHidden => "word_hidden",
            Layer::HiddenUrl => "hidden_url",
        }
    }
}

const MAX_TRAIN_ATTEMPTS: usize = 16;

pub trait FeedbackNetwork: Send + Sync {
    /// One activation per url, in tanh range.
    fn activate(&self, term_ids: &[TermId], url_ids: &[DocId]) -> Result<Vec<f64>>;

    /// One step of back-propagation towards `selected`.
    fn train(&self, term_ids: &[TermId], url_ids: &[DocId], selected: DocId) -> Result<()>;
}

/// Canonical hidden-node key: sorted distinct term ids joined by `_`.
/// None when there are no terms or more than `max_terms`.
pub fn hidden_key(term_ids: &[TermId], max_terms: usize) -> Option<String> {
    let terms = sorted_distinct(term_ids);
    if terms.is_empty() || terms.len() > max_terms {
        return None;
    }
    Some(terms.iter().map(|t| t.to_string()).collect::<Vec<_>>().join("_"))
}

pub struct SearchNet {
    store: Store,
    config: NetworkConfig,
    locks: KeyedLocks<String>,
}

impl SearchNet {
    pub fn new(store: Store, config: NetworkConfig) -> Self {
        Self { store, config, locks: KeyedLocks::new() }
    }

    /// Create the hidden node for this term set if it does not exist yet.
    pub fn ensure_hidden_node(&self, term_ids: &[TermId], url_ids: &[DocId]) -> Result<Option<HiddenId>> {
        let Some(key) = hidden_key(term_ids, self.config.max_key_terms) else {
            return Ok(None);
        };
        self.locks.with(&key, || self.create_node(&key, &sorted_distinct(term_ids), &distinct(url_ids)).map(Some))
    }

    fn create_node(&self, key: &str, terms: &[TermId], urls: &[DocId]) -> Result<HiddenId> {
        let input = 1.0 / terms.len() as f64;
        let output = self.config.initial_output_weight;
        let (hidden, created) = self.store.create_hidden_node(key, |hidden| {
            terms
                .iter()
                .map(|&t| (Layer::WordHidden, t, hidden, input))
                .chain(urls.iter().map(|&u| (Layer::HiddenUrl, hidden, u, output)))
                .collect()
        })?;
        if created {
            tracing::debug!(key, hidden, "created hidden node");
        }
        Ok(hidden)
    }

    /// Load the current weights for every hidden node wired to these terms or urls.
    fn setup(&self, terms: &[TermId], urls: &[DocId]) -> Result<Network> {
        let hidden = self.store.hidden_ids_for(terms, urls)?;
        let mut read = Vec::with_capacity(hidden.len() * (terms.len() + urls.len()));
        let mut strength = |layer: Layer, from: u64, to: u64| -> Result<f64> {
            let stored = self.store.weight(layer, from, to)?;
            read.push((layer, from, to, stored));
            Ok(stored.unwrap_or_else(|| layer.default_strength()))
        };
        let mut weight_in = Vec::with_capacity(terms.len());
        for &term in terms {
            let row = hidden.iter().map(|&h| strength(Layer::WordHidden, term, h)).collect::<Result<Vec<_>>>()?;
            weight_in.push(row);
        }
        let mut weight_out = Vec::with_capacity(hidden.len());
        for &h in &hidden {
            let row = urls.iter().map(|&u| strength(Layer::HiddenUrl, h, u)).collect::<Result<Vec<_>>>()?;
            weight_out.push(row);
        }
        Ok(Network {
            input: vec![1.0; terms.len()],
            hidden_out: vec![0.0; hidden.len()],
            output: vec![0.0; urls.len()],
            terms: terms.to_vec(),
            hidden,
            urls: urls.to_vec(),
            weight_in,
            weight_out,
            read,
        })
    }
}

impl FeedbackNetwork for SearchNet {
    fn activate(&self, term_ids: &[TermId], url_ids: &[DocId]) -> Result<Vec<f64>> {
        let mut net = self.setup(&sorted_distinct(term_ids), url_ids)?;
        Ok(net.feed_forward())
    }

    fn train(&self, term_ids: &[TermId], url_ids: &[DocId], selected: DocId) -> Result<()> {
        let terms = sorted_distinct(term_ids);
        let Some(key) = hidden_key(&terms, self.config.max_key_terms) else {
            tracing::debug!(terms = terms.len(), "no hidden node for this query, skipping training");
            return Ok(());
        };
        let urls = distinct(url_ids);
        let target = urls
            .iter()
            .position(|&u| u == selected)
            .ok_or_else(|| Error::SelectionNotCandidate { url: selected.to_string() })?;

        // The key lock serializes identical queries. Overlapping queries share hidden nodes
        // under different keys, so the write also checks nothing it read has moved.
        self.locks.with(&key, || {
            self.create_node(&key, &terms, &urls)?;
            let mut targets = vec![0.0; urls.len()];
            targets[target] = 1.0;
            for attempt in 1..=MAX_TRAIN_ATTEMPTS {
                let mut net = self.setup(&terms, &urls)?;
                net.feed_forward();
                net.back_propagate(&targets, self.config.learning_rate);
                if self.store.write_weights_checked(&net.read, &net.updates())? {
                    tracing::debug!(key, selected, hidden = net.hidden.len(), attempt, "trained feedback network");
                    return Ok(());
                }
                tracing::debug!(key, attempt, "weights moved during training, retrying");
            }
            Err(Error::TrainingContended { key: key.clone(), attempts: MAX_TRAIN_ATTEMPTS })
        })
    }
}

struct Network {
    terms: Vec<TermId>,
    hidden: Vec<HiddenId>,
    urls: Vec<DocId>,
    input: Vec<f64>,
    hidden_out: Vec<f64>,
    output: Vec<f64>,
    /// [term][hidden]
    weight_in: Vec<Vec<f64>>,
    /// [hidden][url]
    weight_out: Vec<Vec<f64>>,
    /// Every stored strength the weights above came from, None where the default applied
    read: Vec<(Layer, u64, u64, Option<f64>)>,
}

impl Network {
    fn feed_forward(&mut self) -> Vec<f64> {
        self.input.fill(1.0);
        for j in 0..self.hidden.len() {
            let sum: f64 = (0..self.terms.len()).map(|i| self.input[i] * self.weight_in[i][j]).sum();
            self.hidden_out[j] = sum.tanh();
        }
        for k in 0..self.urls.len() {
            let sum: f64 = (0..self.hidden.len()).map(|j| self.hidden_out[j] * self.weight_out[j][k]).sum();
            self.output[k] = sum.tanh();
        }
        self.output.clone()
    }

    fn back_propagate(&mut self, targets: &[f64], rate: f64) {
        let output_deltas: Vec<f64> = self
            .output
            .iter()
            .zip(targets)
            .map(|(&out, &target)| dtanh(out) * (target - out))
            .collect();

        let hidden_deltas: Vec<f64> = (0..self.hidden.len())
            .map(|j| {
                let error: f64 = output_deltas.iter().enumerate().map(|(k, d)| d * self.weight_out[j][k]).sum();
                dtanh(self.hidden_out[j]) * error
            })
            .collect();

        for j in 0..self.hidden.len() {
            for (k, delta) in output_deltas.iter().enumerate() {
                self.weight_out[j][k] += rate * self.hidden_out[j] * delta;
            }
        }
        for i in 0..self.terms.len() {
            for (j, delta) in hidden_deltas.iter().enumerate() {
                self.weight_in[i][j] += rate * self.input[i] * delta;
            }
        }
    }

    fn updates(&self) -> Vec<(Layer, u64, u64, f64)> {
        let mut out = Vec::with_capacity(self.hidden.len() * (self.terms.len() + self.urls.len()));
        for (i, &term) in self.terms.iter().enumerate() {
            for (j, &h) in self.hidden.iter().enumerate() {
                out.push((Layer::WordHidden, term, h, self.weight_in[i][j]));
            }
        }
        for (j, &h) in self.hidden.iter().enumerate() {
            for (k, &url) in self.urls.iter().enumerate() {
                out.push((Layer::HiddenUrl, h, url, self.weight_out[j][k]));
            }
        }
        out
    }
}

fn dtanh(y: f64) -> f64 { 1.0 - y * y }

fn sorted_distinct(ids: &[u64]) -> Vec<u64> {
    let mut out = ids.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}

fn distinct(ids: &[u64]) -> Vec<u64> {
    let mut out: Vec<u64> = Vec::with_capacity(ids.len());
    for &id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

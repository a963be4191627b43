//! Batch PageRank over the link graph.
//!
//! `score(d) = base + damping * Σ score(s) / out_degree(s)` over the distinct sources
//! `s` linking to `d`. Out-degree counts every edge row, duplicates included. Each
//! round is computed entirely from the previous round's scores.

use crate::config::RankConfig;
use crate::store::Store;
use crate::{DocId, Edge, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankSummary {
    pub documents: usize,
    pub edges: usize,
    pub iterations: usize,
    /// Largest score change in the final round
    pub max_delta: f64,
}

pub trait RankEngine: Send + Sync {
    /// Recompute every document's score and overwrite the stored scores.
    fn rebuild(&self, config: &RankConfig) -> Result<RankSummary>;
}

pub struct PageRank {
    store: Store,
}

impl PageRank {
    pub fn new(store: Store) -> Self { Self { store } }
}

impl RankEngine for PageRank {
    fn rebuild(&self, config: &RankConfig) -> Result<RankSummary> {
        config.validate()?;
        let docs: Vec<DocId> = self.store.documents()?.into_iter().map(|d| d.id).collect();
        let edges = self.store.edge_snapshot()?;
        tracing::info!(documents = docs.len(), edges = edges.len(), iterations = config.iterations, "computing pagerank");
        let (scores, max_delta) = compute(&docs, &edges, config);
        self.store.replace_ranks(&scores)?;
        Ok(RankSummary { documents: docs.len(), edges: edges.len(), iterations: config.iterations, max_delta })
    }
}

/// Pure iteration over a frozen edge set. Returns the scores and the last round's largest change.
pub fn compute(docs: &[DocId], edges: &[Edge], config: &RankConfig) -> (HashMap<DocId, f64>, f64) {
    let index: HashMap<DocId, usize> = docs.iter().enumerate().map(|(i, &d)| (d, i)).collect();
    let mut out_degree = vec![0usize; docs.len()];
    let mut sources: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); docs.len()];
    for edge in edges {
        let (Some(&from), Some(&to)) = (index.get(&edge.from), index.get(&edge.to)) else {
            continue;
        };
        out_degree[from] += 1;
        sources[to].insert(from);
    }

    let mut scores = vec![1.0f64; docs.len()];
    let mut max_delta = 0.0f64;
    for round in 0..config.iterations {
        let next: Vec<f64> = sources
            .iter()
            .map(|linkers| {
                let inbound: f64 = linkers.iter().map(|&s| scores[s] / out_degree[s] as f64).sum();
                config.base + config.damping * inbound
            })
            .collect();
        max_delta = next.iter().zip(&scores).map(|(a, b)| (a - b).abs()).fold(0.0, f64::max);
        scores = next;
        tracing::debug!(round, max_delta, "pagerank round");
    }

    let scores = docs.iter().copied().zip(scores).collect();
    (scores, max_delta)
}

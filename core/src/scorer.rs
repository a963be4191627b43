//! Ranking signals over a match set.
//!
//! Every signal is mapped into [0, 1] by [`normalize`] before it is weighted and summed.

use crate::config::ScoreWeights;
use crate::matcher::{MatchRow, MatchSet};
use crate::store::Store;
use crate::{DocId, Result, TermId};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Floor used wherever a divisor could be zero.
pub const EPSILON: f64 = 1e-5;

/// Scale values into [0, 1] relative to the best one.
///
/// Direct: `v / max`, with `max` replaced by [`EPSILON`] when it is zero.
/// Inverted (smaller is better): `max(EPSILON, min) / max(EPSILON, v)`, so the best value maps to 1.0
/// even when it is zero.
pub fn normalize(values: &HashMap<DocId, f64>, invert: bool) -> HashMap<DocId, f64> {
    if values.is_empty() {
        return HashMap::new();
    }
    if invert {
        let min = values.values().copied().fold(f64::INFINITY, f64::min).max(EPSILON);
        values.iter().map(|(&d, &v)| (d, min / v.max(EPSILON))).collect()
    } else {
        let mut max = values.values().copied().fold(f64::NEG_INFINITY, f64::max);
        if max == 0.0 {
            max = EPSILON;
        }
        values.iter().map(|(&d, &v)| (d, v / max)).collect()
    }
}

/// Order by descending score; equal scores fall back to ascending document id.
pub fn rank(scores: &HashMap<DocId, f64>) -> Vec<(f64, DocId)> {
    let mut ranked: Vec<(f64, DocId)> = scores.iter().map(|(&d, &s)| (s, d)).collect();
    ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal).then(a.1.cmp(&b.1)));
    ranked
}

pub trait Scorer: Send + Sync {
    fn score(&self, matches: &MatchSet) -> Result<HashMap<DocId, f64>>;
}

pub struct SignalScorer {
    store: Store,
    weights: ScoreWeights,
}

impl SignalScorer {
    pub fn new(store: Store, weights: ScoreWeights) -> Self { Self { store, weights } }

    pub fn weights(&self) -> &ScoreWeights { &self.weights }

    /// Stored PageRank of each candidate, normalized against the candidates only.
    pub fn pagerank_score(&self, docs: &[DocId]) -> Result<HashMap<DocId, f64>> {
        let mut ranks = HashMap::with_capacity(docs.len());
        for &doc in docs {
            ranks.insert(doc, self.store.rank(doc)?.unwrap_or(0.0));
        }
        Ok(normalize(&ranks, false))
    }

    /// Sum of the PageRank of every linker whose anchor text carries a query term.
    pub fn link_text_score(&self, docs: &[DocId], term_ids: &[TermId]) -> Result<HashMap<DocId, f64>> {
        let mut scores: HashMap<DocId, f64> = docs.iter().map(|&d| (d, 0.0)).collect();
        for &term in term_ids {
            for edge in self.store.edges_with_term(term)? {
                if let Some(score) = scores.get_mut(&edge.to) {
                    *score += self.store.rank(edge.from)?.unwrap_or(0.0);
                }
            }
        }
        Ok(normalize(&scores, false))
    }

    /// Number of edges pointing at each candidate.
    pub fn inbound_score(&self, docs: &[DocId]) -> Result<HashMap<DocId, f64>> {
        let mut counts = HashMap::with_capacity(docs.len());
        for &doc in docs {
            counts.insert(doc, self.store.inbound_count(doc)? as f64);
        }
        Ok(normalize(&counts, false))
    }
}

impl Scorer for SignalScorer {
    fn score(&self, matches: &MatchSet) -> Result<HashMap<DocId, f64>> {
        let docs = matches.documents();
        let mut total: HashMap<DocId, f64> = docs.iter().map(|&d| (d, 0.0)).collect();
        if docs.is_empty() {
            return Ok(total);
        }

        let w = &self.weights;
        let mut signals: Vec<(f64, HashMap<DocId, f64>)> = Vec::new();
        if w.frequency != 0.0 {
            signals.push((w.frequency, frequency_score(&matches.rows)));
        }
        if w.location != 0.0 {
            signals.push((w.location, location_score(&matches.rows)));
        }
        if w.distance != 0.0 {
            signals.push((w.distance, distance_score(&matches.rows)));
        }
        if w.pagerank != 0.0 {
            signals.push((w.pagerank, self.pagerank_score(&docs)?));
        }
        if w.link_text != 0.0 {
            signals.push((w.link_text, self.link_text_score(&docs, &matches.term_ids)?));
        }
        if w.inbound != 0.0 {
            signals.push((w.inbound, self.inbound_score(&docs)?));
        }

        for (weight, scores) in signals {
            for (doc, value) in total.iter_mut() {
                *value += weight * scores.get(doc).copied().unwrap_or(0.0);
            }
        }
        Ok(total)
    }
}

/// Matching rows per document, more is better.
pub fn frequency_score(rows: &[MatchRow]) -> HashMap<DocId, f64> {
    let mut counts: HashMap<DocId, f64> = HashMap::new();
    for row in rows {
        *counts.entry(row.doc).or_insert(0.0) += 1.0;
    }
    normalize(&counts, false)
}

/// Smallest sum of term positions in any row, earlier is better.
pub fn location_score(rows: &[MatchRow]) -> HashMap<DocId, f64> {
    let mut best: HashMap<DocId, f64> = HashMap::new();
    for row in rows {
        let sum: f64 = row.positions.iter().map(|&p| p as f64).sum();
        best.entry(row.doc).and_modify(|b| *b = b.min(sum)).or_insert(sum);
    }
    normalize(&best, true)
}

/// Smallest total gap between consecutive query terms in any row, tighter is better.
/// Single-term queries score every document 1.0.
pub fn distance_score(rows: &[MatchRow]) -> HashMap<DocId, f64> {
    if rows.first().map_or(true, |r| r.positions.len() <= 1) {
        return rows.iter().map(|r| (r.doc, 1.0)).collect();
    }
    let mut best: HashMap<DocId, f64> = HashMap::new();
    for row in rows {
        let gap: f64 = row.positions.windows(2).map(|w| (w[1] as f64 - w[0] as f64).abs()).sum();
        best.entry(row.doc).and_modify(|b| *b = b.min(gap)).or_insert(gap);
    }
    normalize(&best, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(doc: DocId, positions: &[u32]) -> MatchRow { MatchRow { doc, positions: positions.to_vec() } }

    #[test]
    fn normalize_direct_bounds() {
        let out = normalize(&HashMap::from([(1, 2.0), (2, 8.0), (3, 0.0)]), false);
        assert_eq!(out[&2], 1.0);
        assert_eq!(out[&1], 0.25);
        assert_eq!(out[&3], 0.0);
    }

    #[test]
    fn normalize_inverted_prefers_small() {
        let out = normalize(&HashMap::from([(1, 2.0), (2, 8.0)]), true);
        assert_eq!(out[&1], 1.0);
        assert_eq!(out[&2], 0.25);
    }

    #[test]
    fn normalize_all_zero_is_guarded() {
        let direct = normalize(&HashMap::from([(1, 0.0), (2, 0.0)]), false);
        assert!(direct.values().all(|&v| v == 0.0));
        let inverted = normalize(&HashMap::from([(1, 0.0), (2, 0.0)]), true);
        assert!(inverted.values().all(|&v| v == 1.0));
        assert!(normalize(&HashMap::new(), false).is_empty());
    }

    #[test]
    fn normalize_inverted_zero_is_best() {
        let out = normalize(&HashMap::from([(1, 0.0), (2, 5.0)]), true);
        assert_eq!(out[&1], 1.0);
        assert!(out[&2] > 0.0 && out[&2] < 1e-5);
        let location = location_score(&[row(1, &[0]), row(2, &[7])]);
        assert_eq!(location[&1], 1.0);
        assert!(location[&2] < 1.0);
    }

    #[test]
    fn normalize_equal_values_share_the_same_score() {
        let direct = normalize(&HashMap::from([(1, 3.0), (2, 3.0)]), false);
        assert!(direct.values().all(|&v| v == 1.0));
        let inverted = normalize(&HashMap::from([(1, 3.0), (2, 3.0)]), true);
        assert!(inverted.values().all(|&v| v == 1.0));
    }

    #[test]
    fn frequency_counts_rows() {
        let rows = [row(1, &[0]), row(1, &[4]), row(2, &[1])];
        let out = frequency_score(&rows);
        assert_eq!(out[&1], 1.0);
        assert_eq!(out[&2], 0.5);
    }

    #[test]
    fn location_uses_best_row() {
        let rows = [row(1, &[10, 12]), row(1, &[1, 3]), row(2, &[8, 8])];
        let out = location_score(&rows);
        assert_eq!(out[&1], 1.0);
        assert_eq!(out[&2], 0.25);
    }

    #[test]
    fn distance_checks_every_row() {
        let rows = [row(1, &[0, 9]), row(1, &[5, 6]), row(2, &[0, 4])];
        let out = distance_score(&rows);
        assert_eq!(out[&1], 1.0);
        assert_eq!(out[&2], 0.25);
        let single = distance_score(&[row(3, &[7])]);
        assert_eq!(single[&3], 1.0);
    }

    #[test]
    fn rank_breaks_ties_by_document() {
        let ranked = rank(&HashMap::from([(5, 1.0), (2, 1.0), (9, 2.0)]));
        assert_eq!(ranked, vec![(2.0, 9), (1.0, 2), (1.0, 5)]);
    }
}

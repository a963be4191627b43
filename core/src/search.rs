use crate::config::{EngineConfig, RankConfig};
use crate::matcher::{Matcher, StoreMatcher};
use crate::network::{FeedbackNetwork, SearchNet};
use crate::pagerank::{PageRank, RankEngine, RankSummary};
use crate::scorer::{normalize, rank, Scorer, SignalScorer};
use crate::store::Store;
use crate::{DocId, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
    pub url: String,
}

/// Composes the matcher, scorer, rank engine and feedback network over one store.
pub struct SearchEngine {
    store: Store,
    config: EngineConfig,
    matcher: StoreMatcher,
    scorer: SignalScorer,
    ranker: PageRank,
    network: SearchNet,
}

impl SearchEngine {
    pub fn new(store: Store, config: EngineConfig) -> Self {
        Self {
            matcher: StoreMatcher::new(store.clone()),
            scorer: SignalScorer::new(store.clone(), config.weights),
            ranker: PageRank::new(store.clone()),
            network: SearchNet::new(store.clone(), config.network),
            store,
            config,
        }
    }

    pub fn store(&self) -> &Store { &self.store }

    pub fn config(&self) -> &EngineConfig { &self.config }

    /// Recompute and overwrite every stored PageRank score.
    pub fn rebuild_rank(&self, config: &RankConfig) -> Result<RankSummary> {
        let summary = self.ranker.rebuild(config)?;
        self.store.put_meta("last_rank", &summary)?;
        tracing::info!(documents = summary.documents, edges = summary.edges, max_delta = summary.max_delta, "rank rebuilt");
        Ok(summary)
    }

    /// Ranked hits for `text`, at most `top_n`.
    pub fn query(&self, text: &str, top_n: usize) -> Result<Vec<SearchHit>> {
        Ok(self.search(text, top_n)?.0)
    }

    /// Like [`SearchEngine::query`], also returning how many documents matched before truncation.
    pub fn search(&self, text: &str, top_n: usize) -> Result<(Vec<SearchHit>, usize)> {
        let matches = self.matcher.match_query(text)?;
        let mut scores = self.scorer.score(&matches)?;
        let feedback = self.config.weights.feedback;
        if feedback != 0.0 && !scores.is_empty() {
            let docs = matches.documents();
            let activations = self.network.activate(&matches.term_ids, &docs)?;
            // tanh range onto [0, 1] before normalizing
            let shifted: HashMap<DocId, f64> = docs.iter().copied().zip(activations.iter().map(|a| (a + 1.0) / 2.0)).collect();
            for (doc, value) in normalize(&shifted, false) {
                if let Some(score) = scores.get_mut(&doc) {
                    *score += feedback * value;
                }
            }
        }

        let mut hits = Vec::with_capacity(top_n.min(scores.len()));
        for (score, doc_id) in rank(&scores).into_iter().take(top_n) {
            let url = self
                .store
                .url(doc_id)?
                .ok_or_else(|| Error::corrupt("docs", format!("matched document {doc_id} has no record")))?;
            hits.push(SearchHit { doc_id, score, url });
        }
        tracing::debug!(query = text, total = scores.len(), returned = hits.len(), "query served");
        Ok((hits, scores.len()))
    }

    /// Train the network: for `query_text`, the user picked `selected_url` among `candidate_urls`.
    ///
    /// Unknown query terms and unknown candidates are dropped; the selection itself must be known.
    pub fn submit_feedback(&self, query_text: &str, candidate_urls: &[String], selected_url: &str) -> Result<()> {
        let term_ids = self.matcher.resolve_terms(query_text)?;
        let selected = self
            .store
            .lookup_document(selected_url)?
            .ok_or_else(|| Error::UnknownDocument { url: selected_url.to_string() })?;
        let candidates = self.resolve_urls(candidate_urls)?;
        if !candidates.contains(&selected) {
            return Err(Error::SelectionNotCandidate { url: selected_url.to_string() });
        }
        self.network.train(&term_ids, &candidates, selected)?;
        tracing::info!(query = query_text, selected = selected_url, candidates = candidates.len(), "feedback recorded");
        Ok(())
    }

    /// Raw network activation for each candidate url, in the given order.
    pub fn personalized_query(&self, text: &str, candidate_urls: &[String]) -> Result<Vec<(String, f64)>> {
        let term_ids = self.matcher.resolve_terms(text)?;
        let mut known = Vec::with_capacity(candidate_urls.len());
        let mut ids = Vec::with_capacity(candidate_urls.len());
        for url in candidate_urls {
            if let Some(id) = self.store.lookup_document(url)? {
                known.push(url.clone());
                ids.push(id);
            }
        }
        let activations = self.network.activate(&term_ids, &ids)?;
        Ok(known.into_iter().zip(activations).collect())
    }

    fn resolve_urls(&self, urls: &[String]) -> Result<Vec<DocId>> {
        let mut ids = Vec::with_capacity(urls.len());
        for url in urls {
            match self.store.lookup_document(url)? {
                Some(id) if !ids.contains(&id) => ids.push(id),
                Some(_) => {}
                None => tracing::debug!(url = %url, "dropping unknown candidate"),
            }
        }
        Ok(ids)
    }
}

pub mod config;
pub mod error;
pub mod index;
pub mod locks;
pub mod matcher;
pub mod network;
pub mod pagerank;
pub mod scorer;
pub mod search;
pub mod store;
pub mod tokenizer;

use serde::{Deserialize, Serialize};

pub type DocId = u64;
pub type TermId = u64;
pub type EdgeId = u64;
pub type HiddenId = u64;
/// Token index within a document's extracted text.
pub type Position = u32;

pub use config::{CrawlConfig, EngineConfig, NetworkConfig, RankConfig, ScoreWeights};
pub use error::{Error, Result};
pub use index::{Indexer, StoreIndexer};
pub use matcher::{MatchRow, MatchSet, Matcher, StoreMatcher};
pub use network::{FeedbackNetwork, Layer, SearchNet};
pub use pagerank::{PageRank, RankEngine, RankSummary};
pub use scorer::{normalize, rank, Scorer, SignalScorer};
pub use search::{SearchEngine, SearchHit};
pub use store::{Stats, Store};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub url: String,
    /// True once the document's text contributed at least one occurrence.
    pub indexed: bool,
    pub word_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub from: DocId,
    pub to: DocId,
}

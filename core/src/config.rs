use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Parameters of one PageRank pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankConfig {
    pub iterations: usize,
    pub damping: f64,
    /// Flat per-document term, not divided by the document count.
    pub base: f64,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self { iterations: 20, damping: 0.85, base: 0.15 }
    }
}

impl RankConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.damping) {
            return Err(Error::Config(format!("damping must be in [0, 1], got {}", self.damping)));
        }
        if !self.base.is_finite() || self.base < 0.0 {
            return Err(Error::Config(format!("base must be a non-negative number, got {}", self.base)));
        }
        Ok(())
    }
}

/// Weight of each signal in the final score. Signals with weight 0 are not computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub frequency: f64,
    pub location: f64,
    pub pagerank: f64,
    pub link_text: f64,
    pub distance: f64,
    pub inbound: f64,
    pub feedback: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            frequency: 1.0,
            location: 1.0,
            pagerank: 1.0,
            link_text: 1.0,
            distance: 0.0,
            inbound: 0.0,
            feedback: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub learning_rate: f64,
    /// Queries with more distinct terms than this never get a hidden node.
    pub max_key_terms: usize,
    /// hidden→url strength given to candidates when a hidden node is created
    pub initial_output_weight: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { learning_rate: 0.5, max_key_terms: 3, initial_output_weight: 0.1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub max_depth: usize,
    /// Fetches in flight within one depth level
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub same_host_only: bool,
    pub respect_robots: bool,
    pub max_body_bytes: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            concurrency: 8,
            timeout_secs: 12,
            user_agent: "linkrank-bot/0.1 (+https://example.com/bot)".to_string(),
            same_host_only: false,
            respect_robots: true,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

impl CrawlConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".into()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rank: RankConfig,
    pub weights: ScoreWeights,
    pub network: NetworkConfig,
    pub top_n: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rank: RankConfig::default(),
            weights: ScoreWeights::default(),
            network: NetworkConfig::default(),
            top_n: 10,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: EngineConfig = serde_json::from_reader(reader)?;
        config.rank.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"rank": {"iterations": 5}, "weights": {"distance": 0.5}}"#).unwrap();
        assert_eq!(cfg.rank.iterations, 5);
        assert_eq!(cfg.rank.damping, 0.85);
        assert_eq!(cfg.weights.distance, 0.5);
        assert_eq!(cfg.weights.frequency, 1.0);
        assert_eq!(cfg.network.max_key_terms, 3);
        assert_eq!(cfg.top_n, 10);
    }

    #[test]
    fn rejects_out_of_range_damping() {
        let cfg = RankConfig { damping: 1.5, ..RankConfig::default() };
        assert!(cfg.validate().is_err());
        assert!(RankConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let cfg = CrawlConfig { concurrency: 0, ..CrawlConfig::default() };
        assert!(cfg.validate().is_err());
    }
}

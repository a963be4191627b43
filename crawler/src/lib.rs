//! Breadth-first crawler feeding pages and links into a linkrank store.

pub mod extract;
pub mod robots;

use anyhow::{bail, Result};
use linkrank_core::{CrawlConfig, Indexer, Store, StoreIndexer};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use url::Url;

use crate::extract::{parse_page, Page};
use crate::robots::RobotsCache;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlSummary {
    /// Depth levels that had a non-empty frontier.
    pub levels: usize,
    pub fetched: usize,
    /// Pages whose text was written by this crawl.
    pub indexed: usize,
    /// Frontier urls skipped because they were indexed by an earlier crawl.
    pub skipped: usize,
    pub failed: usize,
    pub edges: usize,
    pub finished_at: String,
}

/// Everything one fetch task needs, cheap to clone into a spawned task.
#[derive(Clone)]
struct Fetcher {
    client: Client,
    robots: Arc<RobotsCache>,
    respect_robots: bool,
    /// Longer robots.txt delays fail the fetch instead of stalling the level.
    max_crawl_delay: Duration,
    max_body_bytes: usize,
}

impl Fetcher {
    async fn fetch(&self, url: &Url) -> Result<Page> {
        if self.respect_robots {
            let rules = self.robots.rules_for(&self.client, url).await;
            if !rules.allows(url.path()) {
                bail!("disallowed by robots.txt");
            }
            if let Some(delay) = rules.crawl_delay() {
                if delay > self.max_crawl_delay {
                    bail!("crawl delay {delay:?} exceeds {:?}", self.max_crawl_delay);
                }
                sleep(delay).await;
            }
        }

        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            bail!("status {status}");
        }
        if let Some(ct) = resp.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
            if !ct.starts_with("text/html") {
                bail!("content type {ct}");
            }
        }
        if resp.content_length().is_some_and(|len| len > self.max_body_bytes as u64) {
            bail!("declared body exceeds {} bytes", self.max_body_bytes);
        }
        // links resolve against where redirects landed
        let base = resp.url().clone();
        let bytes = resp.bytes().await?;
        if bytes.len() > self.max_body_bytes {
            bail!("body exceeds {} bytes", self.max_body_bytes);
        }
        Ok(parse_page(&String::from_utf8_lossy(&bytes), &base))
    }
}

pub struct Crawler {
    fetcher: Fetcher,
    config: CrawlConfig,
    store: Store,
    indexer: Arc<dyn Indexer>,
}

impl Crawler {
    pub fn new(store: Store, config: CrawlConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let fetcher = Fetcher {
            client,
            robots: Arc::new(RobotsCache::new()),
            respect_robots: config.respect_robots,
            max_crawl_delay: Duration::from_secs(config.timeout_secs),
            max_body_bytes: config.max_body_bytes,
        };
        let indexer = Arc::new(StoreIndexer::new(store.clone()));
        Ok(Self { fetcher, config, store, indexer })
    }

    /// Replace the default store-backed indexer.
    pub fn with_indexer(mut self, indexer: Arc<dyn Indexer>) -> Self {
        self.indexer = indexer;
        self
    }

    pub fn config(&self) -> &CrawlConfig { &self.config }

    /// Crawl breadth-first from `seeds` for at most `max_depth` levels.
    ///
    /// Fetch failures are logged and skipped. Store failures abort the crawl; levels already
    /// flushed stay committed.
    pub async fn crawl(&self, seeds: &[Url], max_depth: usize) -> Result<CrawlSummary> {
        let mut summary = CrawlSummary::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut frontier: Vec<Url> = Vec::new();
        for seed in seeds {
            let mut seed = seed.clone();
            seed.set_fragment(None);
            if seen.insert(seed.to_string()) {
                frontier.push(seed);
            }
        }

        for depth in 0..max_depth {
            if frontier.is_empty() {
                break;
            }
            let mut pending = Vec::with_capacity(frontier.len());
            for url in frontier.drain(..) {
                match self.store.lookup_document(url.as_str())? {
                    Some(doc) if self.store.is_indexed(doc)? => summary.skipped += 1,
                    _ => pending.push(url),
                }
            }

            let mut next = Vec::new();
            for (url, fetched) in self.fetch_level(pending).await {
                let page = match fetched {
                    Ok(page) => page,
                    Err(e) => {
                        tracing::warn!(url = %url, error = %e, "fetch failed");
                        summary.failed += 1;
                        continue;
                    }
                };
                summary.fetched += 1;
                let doc = self.store.document_id(url.as_str())?;
                if self.indexer.index_document(doc, &page.text)? {
                    summary.indexed += 1;
                }
                for link in &page.links {
                    let target = self.store.document_id(link.url.as_str())?;
                    if self.indexer.add_link(doc, target, &link.text)?.is_some() {
                        summary.edges += 1;
                    }
                    if self.config.same_host_only && link.url.host_str() != url.host_str() {
                        continue;
                    }
                    if seen.insert(link.url.to_string()) {
                        next.push(link.url.clone());
                    }
                }
            }

            self.store.flush()?;
            summary.levels += 1;
            tracing::info!(depth, fetched = summary.fetched, failed = summary.failed, next = next.len(), "crawl level committed");
            frontier = next;
        }

        summary.finished_at = time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
        self.store.put_meta("last_crawl", &summary)?;
        Ok(summary)
    }

    /// Fetch one level with bounded concurrency; results come back in frontier order.
    async fn fetch_level(&self, urls: Vec<Url>) -> Vec<(Url, Result<Page>)> {
        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks = JoinSet::new();
        for (slot, url) in urls.into_iter().enumerate() {
            let fetcher = self.fetcher.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let fetched = fetcher.fetch(&url).await;
                (slot, url, fetched)
            });
        }

        let mut done = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => done.push(result),
                Err(e) => tracing::warn!(error = %e, "fetch task aborted"),
            }
        }
        done.sort_by_key(|(slot, _, _)| *slot);
        done.into_iter().map(|(_, url, fetched)| (url, fetched)).collect()
    }
}

//! robots.txt rules for the `*` user-agent group, cached per origin.

use parking_lot::RwLock;
use reqwest::{header, Client};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rules {
    allows: Vec<String>,
    disallows: Vec<String>,
    crawl_delay_ms: Option<u64>,
}

impl Rules {
    /// Longest matching Allow or Disallow prefix wins; ties go to Allow.
    pub fn allows(&self, path: &str) -> bool {
        let longest = |rules: &[String]| rules.iter().filter(|r| path.starts_with(r.as_str())).map(|r| r.len()).max();
        match (longest(&self.allows), longest(&self.disallows)) {
            (Some(a), Some(d)) => a >= d,
            (_, None) => true,
            (None, Some(_)) => false,
        }
    }

    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay_ms.map(Duration::from_millis)
    }
}

pub fn parse_robots(txt: &str) -> Rules {
    let mut active = false;
    let mut rules = Rules::default();
    for line in txt.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        let Some((key, value)) = line.split_once(':') else { continue };
        let value = value.trim();
        match key.trim().to_lowercase().as_str() {
            "user-agent" => active = value == "*",
            // an empty Disallow allows everything
            "allow" if active && !value.is_empty() => rules.allows.push(value.to_string()),
            "disallow" if active && !value.is_empty() => rules.disallows.push(value.to_string()),
            "crawl-delay" if active => {
                if let Ok(secs) = value.parse::<f64>() {
                    rules.crawl_delay_ms = Some((secs * 1000.0) as u64);
                }
            }
            _ => {}
        }
    }
    rules
}

#[derive(Default)]
pub struct RobotsCache {
    by_origin: RwLock<HashMap<String, Rules>>,
}

impl RobotsCache {
    pub fn new() -> Self { Self::default() }

    /// Rules for the origin of `url`, fetched once. An unreachable robots.txt allows everything.
    pub async fn rules_for(&self, client: &Client, url: &Url) -> Rules {
        let origin = url.origin().ascii_serialization();
        let cached = self.by_origin.read().get(&origin).cloned();
        if let Some(rules) = cached {
            return rules;
        }
        let robots_url = format!("{origin}/robots.txt");
        let txt = match client.get(&robots_url).header(header::ACCEPT, "text/plain").send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            _ => String::new(),
        };
        let rules = parse_robots(&txt);
        tracing::debug!(%origin, disallows = rules.disallows.len(), "loaded robots.txt");
        self.by_origin.write().insert(origin, rules.clone());
        rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_match_wins() {
        let rules = parse_robots(
            "User-agent: googlebot\nDisallow: /\n\nUser-agent: *\nDisallow: /private\nAllow: /private/open\nCrawl-delay: 0.5\n",
        );
        assert!(rules.allows("/"));
        assert!(!rules.allows("/private/x"));
        assert!(rules.allows("/private/open/page"));
        assert_eq!(rules.crawl_delay(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn empty_disallow_allows_all() {
        let rules = parse_robots("User-agent: *\nDisallow:\n");
        assert!(rules.allows("/anything"));
    }

    #[test]
    fn root_disallow_blocks_everything() {
        let rules = parse_robots("User-agent: * # everyone\nDisallow: /\n");
        assert!(!rules.allows("/"));
        assert!(!rules.allows("/page"));
    }
}

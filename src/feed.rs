//! Materializes provider match payloads into the season source tree.
//!
//! Round list files (`round_lists/{round}.txt`) hold one match identifier per line. Each line
//! becomes `match_data/{round}/{n}.json`, numbered from 1 in line order.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::http_cache::HttpCache;
use crate::http_client::http_client;
use crate::scanner::{EntryKind, SeasonPaths, numbered_entries};

pub trait MatchFeed {
    fn fetch_match(&self, identifier: &str) -> Result<Value>;

    /// Name/jersey directory for the match; empty when the provider has none.
    fn fetch_player_roster(&self, identifier: &str) -> Result<Vec<Value>>;
}

/// Match identifiers are either bare ids or provider URLs ending in `id=<n>` / `/<n>`.
pub fn match_id_from_identifier(identifier: &str) -> Option<String> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Some(trimmed.to_string());
    }
    let digits = trimmed
        .chars()
        .rev()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>();
    if digits.is_empty() {
        return None;
    }
    Some(digits.chars().rev().collect())
}

pub struct HttpMatchFeed {
    match_url_template: Option<String>,
    roster_url_template: Option<String>,
    cache: Option<HttpCache>,
}

impl HttpMatchFeed {
    pub fn new(config: &FeedConfig) -> Self {
        let cache = if config.use_http_cache {
            HttpCache::default_location()
        } else {
            None
        };
        Self {
            match_url_template: config.match_url_template.clone(),
            roster_url_template: config.roster_url_template.clone(),
            cache,
        }
    }

    pub fn with_cache(mut self, cache: HttpCache) -> Self {
        self.cache = Some(cache);
        self
    }

    fn url_for(&self, template: Option<&str>, identifier: &str) -> Result<String> {
        let identifier = identifier.trim();
        match template {
            Some(template) => {
                let id = match_id_from_identifier(identifier)
                    .ok_or_else(|| anyhow!("no match id in identifier {identifier:?}"))?;
                Ok(template.replace("{id}", &id))
            }
            None if identifier.starts_with("http://") || identifier.starts_with("https://") => {
                Ok(identifier.to_string())
            }
            None => Err(anyhow!(
                "identifier {identifier:?} is not a URL and MATCH_URL_TEMPLATE is unset"
            )),
        }
    }

    fn get_json(&self, url: &str) -> Result<Value> {
        let client = http_client()?;
        let body = match self.cache.as_ref() {
            Some(cache) => cache.fetch_text(client, url, &[])?,
            None => {
                let resp = client
                    .get(url)
                    .send()
                    .with_context(|| format!("request {url}"))?;
                let status = resp.status();
                let body = resp.text().context("failed reading body")?;
                if !status.is_success() {
                    return Err(anyhow!("http {status}: {body}"));
                }
                body
            }
        };
        serde_json::from_str(&body).with_context(|| format!("invalid json from {url}"))
    }
}

impl MatchFeed for HttpMatchFeed {
    fn fetch_match(&self, identifier: &str) -> Result<Value> {
        let url = self.url_for(self.match_url_template.as_deref(), identifier)?;
        let payload = self.get_json(&url)?;
        // Some endpoints wrap the record in {"game": {...}}.
        Ok(match payload {
            Value::Object(mut map) if map.get("game").is_some_and(Value::is_object) => {
                map.remove("game").unwrap_or_default()
            }
            other => other,
        })
    }

    fn fetch_player_roster(&self, identifier: &str) -> Result<Vec<Value>> {
        let Some(template) = self.roster_url_template.as_deref() else {
            return Ok(Vec::new());
        };
        let url = self.url_for(Some(template), identifier)?;
        Ok(roster_members(self.get_json(&url)?))
    }
}

fn roster_members(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("members") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub rounds: Vec<u32>,
    pub written: usize,
    pub skipped_existing: usize,
    /// (round, identifier, error)
    pub failures: Vec<(u32, String, String)>,
}

/// Downloads every listed match of the rounds above `watermark`. Files already on disk are kept.
pub fn fetch_pending_rounds<F: MatchFeed + ?Sized>(
    feed: &F,
    paths: &SeasonPaths,
    watermark: u32,
) -> Result<FetchSummary> {
    let lists_dir = paths.round_lists_dir();
    let mut summary = FetchSummary::default();
    if !lists_dir.is_dir() {
        warn!(dir = %lists_dir.display(), "round list dir missing, nothing to fetch");
        return Ok(summary);
    }
    let lists = numbered_entries(&lists_dir, EntryKind::File { extension: "txt" })
        .with_context(|| format!("list round files in {}", lists_dir.display()))?;

    for (round, list_path) in lists {
        if round <= watermark {
            continue;
        }
        let raw = fs::read_to_string(&list_path)
            .with_context(|| format!("read round list {}", list_path.display()))?;
        let identifiers = raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>();
        let out_dir = paths.round_dir(round);
        fs::create_dir_all(&out_dir)
            .with_context(|| format!("create round dir {}", out_dir.display()))?;

        for (idx, identifier) in identifiers.iter().enumerate() {
            let out_path = out_dir.join(format!("{}.json", idx + 1));
            if out_path.exists() {
                summary.skipped_existing += 1;
                continue;
            }
            match fetch_one(feed, identifier, &out_path) {
                Ok(()) => summary.written += 1,
                Err(err) => {
                    warn!(round, identifier, error = %format!("{err:#}"), "match fetch failed");
                    summary
                        .failures
                        .push((round, identifier.to_string(), format!("{err:#}")));
                }
            }
        }
        info!(round, listed = identifiers.len(), "round materialized");
        summary.rounds.push(round);
    }
    Ok(summary)
}

fn fetch_one<F: MatchFeed + ?Sized>(feed: &F, identifier: &str, out_path: &Path) -> Result<()> {
    let mut record = feed.fetch_match(identifier)?;
    let has_members = record
        .get("members")
        .and_then(Value::as_array)
        .is_some_and(|m| !m.is_empty());
    if !has_members {
        let roster = feed.fetch_player_roster(identifier)?;
        if let (false, Some(map)) = (roster.is_empty(), record.as_object_mut()) {
            debug!(identifier, members = roster.len(), "merged roster into match");
            map.insert("members".to_string(), Value::Array(roster));
        }
    }
    let json = serde_json::to_string_pretty(&record).context("serialize match")?;
    let tmp = out_path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, out_path).with_context(|| format!("write {}", out_path.display()))?;
    Ok(())
}

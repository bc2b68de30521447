//! Team city/stadium lookup against football-data.org.
//!
//! Lookups run on a small rayon pool and every outgoing request waits on a shared sliding-window
//! limiter, so the pool size never pushes the request rate past the provider's quota. A failed
//! lookup only costs that team its metadata.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::EnrichConfig;
use crate::error::SyncError;
use crate::http_client::http_client;
use crate::json_value::{as_u64_any, str_at};
use crate::model::{Team, TeamMetadata};
use crate::stat_normalizer::fold_accent;

pub const MATCH_THRESHOLD: f64 = 0.5;
const UNKNOWN: &str = "Unknown";

pub trait TeamMetadataSource: Sync {
    fn lookup_team_metadata(
        &self,
        competition: &str,
        team_name: &str,
    ) -> Result<TeamMetadata, SyncError>;
}

/// At most `max_requests` admissions in any rolling `window`.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    sent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            sent: Mutex::new(VecDeque::new()),
        }
    }

    /// Blocks the calling thread until a slot is free. Returns how long it waited.
    pub fn acquire(&self) -> Duration {
        let started = Instant::now();
        loop {
            match self.try_admit(Instant::now()) {
                None => return started.elapsed(),
                Some(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
                    thread::sleep(wait);
                }
            }
        }
    }

    /// Admits at `now` or returns how long until the oldest admission leaves the window.
    pub fn try_admit(&self, now: Instant) -> Option<Duration> {
        let mut sent = match self.sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while let Some(front) = sent.front() {
            if now.saturating_duration_since(*front) >= self.window {
                sent.pop_front();
            } else {
                break;
            }
        }
        if sent.len() < self.max_requests {
            sent.push_back(now);
            return None;
        }
        let oldest = sent.front().copied().unwrap_or(now);
        Some(
            self.window
                .saturating_sub(now.saturating_duration_since(oldest))
                .max(Duration::from_millis(1)),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTeam {
    pub id: u64,
    pub name: String,
    pub short_name: Option<String>,
}

pub struct FootballDataClient {
    base_url: String,
    token: String,
    limiter: RateLimiter,
    catalogs: Mutex<HashMap<String, Vec<RemoteTeam>>>,
}

impl FootballDataClient {
    pub fn new(config: &EnrichConfig) -> Self {
        Self {
            base_url: config.api_base.clone(),
            token: config.api_token.clone(),
            limiter: RateLimiter::new(config.max_requests, config.period),
            catalogs: Mutex::new(HashMap::new()),
        }
    }

    fn get_json(&self, path: &str) -> Result<Value> {
        self.limiter.acquire();
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let resp = http_client()?
            .get(&url)
            .header("X-Auth-Token", self.token.as_str())
            .send()
            .with_context(|| format!("request {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("http {status} from {url}"));
        }
        resp.json::<Value>()
            .with_context(|| format!("invalid json from {url}"))
    }

    fn competition_id(&self, competition: &str) -> Result<u64> {
        let payload = self.get_json("competitions/")?;
        let wanted = name_key(competition);
        payload
            .get("competitions")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .find(|c| str_at(c, "name").is_some_and(|n| name_key(n) == wanted))
            .and_then(|c| c.get("id").and_then(as_u64_any))
            .ok_or_else(|| anyhow!("competition {competition:?} not offered by provider"))
    }

    /// Team list of the competition, fetched once per client.
    fn catalog(&self, competition: &str) -> Result<Vec<RemoteTeam>> {
        let mut catalogs = self
            .catalogs
            .lock()
            .map_err(|_| anyhow!("catalog cache lock poisoned"))?;
        if let Some(teams) = catalogs.get(competition) {
            return Ok(teams.clone());
        }
        let id = self.competition_id(competition)?;
        let payload = self.get_json(&format!("competitions/{id}/teams"))?;
        let teams = parse_remote_teams(&payload);
        info!(competition, teams = teams.len(), "provider team catalog loaded");
        catalogs.insert(competition.to_string(), teams.clone());
        Ok(teams)
    }

    fn team_details(&self, team_id: u64) -> Result<TeamMetadata> {
        let payload = self.get_json(&format!("teams/{team_id}"))?;
        Ok(TeamMetadata {
            city: city_from_address(str_at(&payload, "address").unwrap_or_default()),
            stadium: str_at(&payload, "venue")
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(UNKNOWN)
                .to_string(),
        })
    }
}

impl TeamMetadataSource for FootballDataClient {
    fn lookup_team_metadata(
        &self,
        competition: &str,
        team_name: &str,
    ) -> Result<TeamMetadata, SyncError> {
        let upstream = |err: anyhow::Error| SyncError::upstream(team_name, format!("{err:#}"));
        let catalog = self.catalog(competition).map_err(upstream)?;
        let remote = best_match(team_name, &catalog).ok_or_else(|| {
            SyncError::upstream(team_name, "no provider team is similar enough")
        })?;
        debug!(team_name, remote = %remote.name, "provider team matched");
        self.team_details(remote.id).map_err(upstream)
    }
}

fn parse_remote_teams(payload: &Value) -> Vec<RemoteTeam> {
    payload
        .get("teams")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|t| {
            Some(RemoteTeam {
                id: t.get("id").and_then(as_u64_any)?,
                name: str_at(t, "name")?.to_string(),
                short_name: str_at(t, "shortName").map(str::to_string),
            })
        })
        .collect()
}

/// Lowercased, accent-folded words in sorted order.
pub fn name_key(raw: &str) -> String {
    let cleaned = raw
        .chars()
        .flat_map(char::to_lowercase)
        .map(fold_accent)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect::<String>();
    let mut words = cleaned.split_whitespace().collect::<Vec<_>>();
    words.sort_unstable();
    words.join(" ")
}

pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&name_key(a), &name_key(b))
}

/// Closest provider team by full or short name, if it clears `MATCH_THRESHOLD`.
pub fn best_match<'a>(team_name: &str, candidates: &'a [RemoteTeam]) -> Option<&'a RemoteTeam> {
    candidates
        .iter()
        .map(|c| {
            let by_short = c
                .short_name
                .as_deref()
                .map(|s| similarity(team_name, s))
                .unwrap_or(0.0);
            (c, similarity(team_name, &c.name).max(by_short))
        })
        .filter(|(_, score)| *score >= MATCH_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(c, _)| c)
}

/// Second-to-last word of a postal address; `"Unknown"` when there is none.
pub fn city_from_address(address: &str) -> String {
    let words = address.split_whitespace().collect::<Vec<_>>();
    if words.len() < 2 {
        return UNKNOWN.to_string();
    }
    words[words.len() - 2]
        .trim_matches(|c: char| c == ',' || c == '.')
        .to_string()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichOutcome {
    pub found: Vec<(u64, TeamMetadata)>,
    pub errors: Vec<SyncError>,
}

pub fn enrich_teams<S: TeamMetadataSource + ?Sized>(
    source: &S,
    competition: &str,
    teams: &[Team],
    workers: usize,
) -> EnrichOutcome {
    if teams.is_empty() {
        return EnrichOutcome::default();
    }
    let lookup = || {
        teams
            .par_iter()
            .map(|t| (t.team_id, source.lookup_team_metadata(competition, &t.team_name)))
            .collect::<Vec<_>>()
    };
    let results = match rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
    {
        Ok(pool) => pool.install(lookup),
        Err(err) => {
            warn!(error = %err, "enrichment pool unavailable, using global pool");
            lookup()
        }
    };

    let mut outcome = EnrichOutcome::default();
    for (team_id, result) in results {
        match result {
            Ok(metadata) => outcome.found.push((team_id, metadata)),
            Err(err) => {
                warn!(team_id, error = %err, "team metadata lookup failed");
                outcome.errors.push(err);
            }
        }
    }
    outcome.found.sort_by_key(|(id, _)| *id);
    outcome
}

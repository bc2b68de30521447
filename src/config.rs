use std::env;
use std::path::PathBuf;
use std::time::Duration;

const APP_DIR: &str = "matchday_sync";
const DEFAULT_ENRICH_BASE: &str = "https://api.football-data.org/v4";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub data_root: PathBuf,
    pub db_path: Option<PathBuf>,
    pub feed: FeedConfig,
    pub enrich: Option<EnrichConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// `{id}` is replaced by the match identifier.
    pub match_url_template: Option<String>,
    pub roster_url_template: Option<String>,
    pub use_http_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichConfig {
    pub api_token: String,
    pub api_base: String,
    pub max_requests: usize,
    pub period: Duration,
    pub workers: usize,
}

impl SyncConfig {
    /// Loads `.env.local` then `.env` before reading the process environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let parsed = |key: &str, default: u64| {
            non_empty(key)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };

        let data_root = non_empty("SYNC_DATA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));
        let db_path = non_empty("SYNC_DB_PATH").map(PathBuf::from);

        let feed = FeedConfig {
            match_url_template: non_empty("MATCH_URL_TEMPLATE"),
            roster_url_template: non_empty("ROSTER_URL_TEMPLATE"),
            use_http_cache: non_empty("SYNC_HTTP_CACHE")
                .map(|v| flag_value(&v))
                .unwrap_or(true),
        };

        let enrich = non_empty("ENRICH_API_TOKEN").map(|api_token| EnrichConfig {
            api_token,
            api_base: non_empty("ENRICH_API_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_ENRICH_BASE.to_string()),
            max_requests: parsed("ENRICH_MAX_REQUESTS", 6).clamp(1, 600) as usize,
            period: Duration::from_secs(parsed("ENRICH_PERIOD_SECS", 60).clamp(1, 3600)),
            workers: parsed("ENRICH_WORKERS", 5).clamp(1, 32) as usize,
        });

        Self {
            data_root,
            db_path,
            feed,
            enrich,
        }
    }
}

fn flag_value(raw: &str) -> bool {
    let t = raw.trim().to_ascii_lowercase();
    !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
}

/// Per-user data directory for the database and the HTTP cache.
pub fn app_data_dir() -> Option<PathBuf> {
    if let Ok(base) = env::var("XDG_DATA_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR),
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> SyncConfig {
        let vars = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        SyncConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn enrichment_needs_a_token() {
        let cfg = config(&[("ENRICH_WORKERS", "3")]);
        assert!(cfg.enrich.is_none());
        assert_eq!(cfg.data_root, PathBuf::from("data"));
        assert!(cfg.feed.use_http_cache);
    }

    #[test]
    fn enrichment_defaults_and_clamps() {
        let cfg = config(&[
            ("ENRICH_API_TOKEN", "secret"),
            ("ENRICH_WORKERS", "500"),
            ("ENRICH_PERIOD_SECS", "nope"),
            ("ENRICH_API_BASE", "http://localhost:9000/"),
            ("SYNC_HTTP_CACHE", "off"),
        ]);
        let enrich = cfg.enrich.expect("enrich config");
        assert_eq!(enrich.max_requests, 6);
        assert_eq!(enrich.period, Duration::from_secs(60));
        assert_eq!(enrich.workers, 32);
        assert_eq!(enrich.api_base, "http://localhost:9000");
        assert!(!cfg.feed.use_http_cache);
    }
}

//! On-disk conditional request cache keyed by URL.
//!
//! A cached body is revalidated with `If-None-Match` / `If-Modified-Since`; a `304` answer serves
//! the stored body. The cache file is rewritten through a temp file and a rename.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ETAG, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use serde::{Deserialize, Serialize};
use tracing::debug;

const CACHE_VERSION: u32 = 1;
const CACHE_FILE: &str = "http_cache.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct HttpCacheFile {
    version: u32,
    entries: HashMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    body: String,
    etag: Option<String>,
    last_modified: Option<String>,
    fetched_at: String,
}

pub struct HttpCache {
    path: PathBuf,
    file: Mutex<HttpCacheFile>,
}

impl HttpCache {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = load_cache_file(&path);
        Self {
            path,
            file: Mutex::new(file),
        }
    }

    /// Cache under the per-user data directory, when one can be determined.
    pub fn default_location() -> Option<Self> {
        crate::config::app_data_dir().map(|dir| Self::open(dir.join(CACHE_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.file.lock().map(|f| f.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fetch_text(
        &self,
        client: &Client,
        url: &str,
        extra_headers: &[(&str, &str)],
    ) -> Result<String> {
        let cached = self.entry(url);

        let mut req = client.get(url);
        for (name, value) in extra_headers {
            req = req.header(*name, *value);
        }
        if let Some(entry) = cached.as_ref() {
            if let Some(etag) = entry.etag.as_ref() {
                req = req.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = entry.last_modified.as_ref() {
                req = req.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        let resp = req.send().with_context(|| format!("request {url}"))?;
        let status = resp.status();
        let headers = resp.headers().clone();
        if status == StatusCode::NOT_MODIFIED {
            let entry = cached.ok_or_else(|| anyhow!("received 304 without cache body"))?;
            debug!(url, "served from http cache");
            return Ok(entry.body);
        }

        let body = resp.text().context("failed reading body")?;
        if !status.is_success() {
            return Err(anyhow!("http {status}: {body}"));
        }

        let header_text = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };
        let entry = CacheEntry {
            body: body.clone(),
            etag: header_text(ETAG),
            last_modified: header_text(LAST_MODIFIED),
            fetched_at: Utc::now().to_rfc3339(),
        };
        if entry.etag.is_some() || entry.last_modified.is_some() {
            self.store(url, entry)?;
        }
        Ok(body)
    }

    fn entry(&self, url: &str) -> Option<CacheEntry> {
        self.file
            .lock()
            .ok()
            .and_then(|f| f.entries.get(url).cloned())
    }

    fn store(&self, url: &str, entry: CacheEntry) -> Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow!("http cache lock poisoned"))?;
        file.version = CACHE_VERSION;
        file.entries.insert(url.to_string(), entry);
        save_cache_file(&self.path, &file)
    }
}

fn load_cache_file(path: &Path) -> HttpCacheFile {
    let Ok(raw) = fs::read_to_string(path) else {
        return HttpCacheFile::default();
    };
    let cache = serde_json::from_str::<HttpCacheFile>(&raw).unwrap_or_default();
    if cache.version != CACHE_VERSION {
        return HttpCacheFile::default();
    }
    cache
}

fn save_cache_file(path: &Path, cache: &HttpCacheFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).ok();
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(cache).context("serialize http cache")?;
    fs::write(&tmp, json).context("write http cache")?;
    fs::rename(&tmp, path).context("swap http cache")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_versions_load_empty() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join(CACHE_FILE);
        fs::write(&path, r#"{"version":0,"entries":{"u":{"body":"b","etag":null,"last_modified":null,"fetched_at":"t"}}}"#)
            .expect("write");
        assert!(HttpCache::open(&path).is_empty());
    }

    #[test]
    fn stored_entries_survive_reopen() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("nested").join(CACHE_FILE);
        let cache = HttpCache::open(&path);
        cache
            .store(
                "http://example.test/match/1",
                CacheEntry {
                    body: "{}".to_string(),
                    etag: Some("\"abc\"".to_string()),
                    last_modified: None,
                    fetched_at: Utc::now().to_rfc3339(),
                },
            )
            .expect("store");

        let reopened = HttpCache::open(&path);
        assert_eq!(reopened.len(), 1);
        let entry = reopened
            .entry("http://example.test/match/1")
            .expect("entry");
        assert_eq!(entry.etag.as_deref(), Some("\"abc\""));
    }
}

//! Source tree layout and the watermark-bounded scan over it.
//!
//! ```text
//! {data_root}/{competition}/{season}/round_lists/{round}.txt
//! {data_root}/{competition}/{season}/match_data/{round}/{n}.json
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

const MATCH_DATA_DIR: &str = "match_data";
const ROUND_LISTS_DIR: &str = "round_lists";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonPaths {
    root: PathBuf,
}

impl SeasonPaths {
    pub fn new(data_root: &Path, competition_name: &str, season_name: &str) -> Self {
        Self {
            root: data_root.join(competition_name).join(season_name),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn match_data_dir(&self) -> PathBuf {
        self.root.join(MATCH_DATA_DIR)
    }

    pub fn round_dir(&self, round: u32) -> PathBuf {
        self.match_data_dir().join(round.to_string())
    }

    pub fn round_lists_dir(&self) -> PathBuf {
        self.root.join(ROUND_LISTS_DIR)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.match_data_dir(), self.round_lists_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("create source dir {}", dir.display()))?;
        }
        Ok(())
    }
}

/// One round folder that still needs syncing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSource {
    pub round: u32,
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind<'a> {
    Dir,
    File { extension: &'a str },
}

/// Entries of `dir` whose name (or file stem) is a positive integer, sorted by that number.
/// Anything else is ignored.
pub fn numbered_entries(dir: &Path, kind: EntryKind<'_>) -> io::Result<Vec<(u32, PathBuf)>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let name = match kind {
            EntryKind::Dir if path.is_dir() => path.file_name(),
            EntryKind::File { extension }
                if path.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some(extension) =>
            {
                path.file_stem()
            }
            _ => continue,
        };
        let Some(number) = name
            .and_then(|n| n.to_str())
            .and_then(|n| n.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
        else {
            continue;
        };
        out.push((number, path));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    Ok(out)
}

/// Sorted `*.json` files directly inside a round folder.
pub fn round_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect::<Vec<_>>();
    files.sort_by(|a, b| file_order_key(a).cmp(&file_order_key(b)));
    Ok(files)
}

// Numeric stems first in numeric order ("2.json" before "10.json"), then by name.
fn file_order_key(path: &Path) -> (u64, String) {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    (stem.parse::<u64>().unwrap_or(u64::MAX), stem)
}

/// Rounds strictly above `watermark`, in ascending order.
pub fn pending_rounds(match_data_dir: &Path, watermark: u32) -> Result<Vec<RoundSource>> {
    if !match_data_dir.is_dir() {
        warn!(dir = %match_data_dir.display(), "match data dir missing, nothing to scan");
        return Ok(Vec::new());
    }
    let folders = numbered_entries(match_data_dir, EntryKind::Dir)
        .with_context(|| format!("list rounds in {}", match_data_dir.display()))?;

    let mut out = Vec::new();
    for (round, dir) in folders {
        if round <= watermark {
            continue;
        }
        let files =
            round_files(&dir).with_context(|| format!("list matches in {}", dir.display()))?;
        debug!(round, files = files.len(), "pending round");
        out.push(RoundSource { round, dir, files });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_numeric_and_zero_rounds_are_skipped() {
        let tmp = tempfile::tempdir().expect("tempdir");
        for name in ["1", "2", "10", "0", "notes", "3b"] {
            fs::create_dir_all(tmp.path().join(name)).expect("mkdir");
        }
        fs::write(tmp.path().join("4"), "not a dir").expect("write");

        let rounds = numbered_entries(tmp.path(), EntryKind::Dir)
            .expect("scan")
            .into_iter()
            .map(|(n, _)| n)
            .collect::<Vec<_>>();
        assert_eq!(rounds, vec![1, 2, 10]);
    }

    #[test]
    fn round_files_sort_numerically() {
        let tmp = tempfile::tempdir().expect("tempdir");
        for name in ["10.json", "2.json", "1.json", "skip.txt"] {
            fs::write(tmp.path().join(name), "{}").expect("write");
        }
        let names = round_files(tmp.path())
            .expect("list")
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["1.json", "2.json", "10.json"]);
    }

    #[test]
    fn missing_dir_scans_as_empty() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let rounds = pending_rounds(&tmp.path().join("absent"), 0).expect("scan");
        assert!(rounds.is_empty());
    }
}

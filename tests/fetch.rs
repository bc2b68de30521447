mod common;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use matchday_sync::feed::{MatchFeed, fetch_pending_rounds};
use matchday_sync::model::Table;
use matchday_sync::pipeline::{SyncPhase, SyncPipeline};

use common::{match_json, season_paths, seeded_store, side};

/// Serves canned matches by id; rosters are kept apart so merging can be observed.
struct CannedFeed {
    matches: HashMap<String, Value>,
    rosters: HashMap<String, Vec<Value>>,
    requests: RefCell<Vec<String>>,
}

impl CannedFeed {
    fn new() -> Self {
        Self {
            matches: HashMap::new(),
            rosters: HashMap::new(),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Stores the record without its `members` directory and serves that as the roster.
    fn add_split(&mut self, id: &str, mut record: Value) {
        let roster = record
            .as_object_mut()
            .and_then(|m| m.remove("members"))
            .and_then(|m| m.as_array().cloned())
            .unwrap_or_default();
        self.matches.insert(id.to_string(), record);
        self.rosters.insert(id.to_string(), roster);
    }
}

impl MatchFeed for CannedFeed {
    fn fetch_match(&self, identifier: &str) -> Result<Value> {
        self.requests.borrow_mut().push(identifier.to_string());
        self.matches
            .get(identifier)
            .cloned()
            .ok_or_else(|| anyhow!("http 404 Not Found"))
    }

    fn fetch_player_roster(&self, identifier: &str) -> Result<Vec<Value>> {
        Ok(self.rosters.get(identifier).cloned().unwrap_or_default())
    }
}

fn round_match(match_id: u64, round: u32) -> Value {
    match_json(
        match_id,
        round,
        side(10, "Real Betis", 1, &[101, 102]),
        side(20, "Sevilla", 0, &[201]),
        &[],
    )
}

#[test]
fn pending_round_lists_become_match_files() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (store, season) = seeded_store();
    let paths = season_paths(tmp.path(), &season);
    paths.ensure_dirs().expect("dirs");

    let mut feed = CannedFeed::new();
    for (id, round) in [("1001", 1), ("2001", 2), ("3001", 3), ("3002", 3)] {
        let match_id = id.parse::<u64>().expect("numeric id");
        feed.add_split(id, round_match(match_id, round));
    }
    let lists = paths.round_lists_dir();
    fs::write(lists.join("1.txt"), "1001\n").expect("list 1");
    fs::write(lists.join("2.txt"), "2001\n\n").expect("list 2");
    fs::write(lists.join("3.txt"), "3001\n9999\n3002\n").expect("list 3");
    fs::write(lists.join("notes.txt"), "ignored\n").expect("notes");

    let summary = fetch_pending_rounds(&feed, &paths, 1).expect("fetch");
    assert_eq!(summary.rounds, vec![2, 3]);
    assert_eq!(summary.written, 3);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].0, 3);
    assert_eq!(summary.failures[0].1, "9999");
    assert!(!paths.round_dir(1).exists());

    let written = fs::read_to_string(paths.round_dir(3).join("3.json")).expect("third file");
    let record = serde_json::from_str::<Value>(&written).expect("json");
    assert_eq!(record["id"], json!(3002));
    assert_eq!(
        record["members"].as_array().map(Vec::len),
        Some(3),
        "roster merged into the record"
    );
    assert!(!paths.round_dir(3).join("2.json").exists());

    feed.requests.borrow_mut().clear();
    let again = fetch_pending_rounds(&feed, &paths, 1).expect("refetch");
    assert_eq!(again.written, 0);
    assert_eq!(again.skipped_existing, 3);
    assert_eq!(*feed.requests.borrow(), vec!["9999".to_string()]);

    let mut pipeline = SyncPipeline::new(store, tmp.path());
    let report = pipeline.sync(season.season_id);
    assert_eq!(report.phase, SyncPhase::Synced);
    assert_eq!(report.rounds_processed, vec![2, 3]);
    assert_eq!(report.inserted(Table::FootballGame), 3);
    assert_eq!(report.inserted(Table::Player), 3);
    assert_eq!(report.inserted(Table::PlayerStats), 9);
}

#[test]
fn missing_round_list_dir_fetches_nothing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (_store, season) = seeded_store();
    let paths = season_paths(tmp.path(), &season);

    let summary = fetch_pending_rounds(&CannedFeed::new(), &paths, 0).expect("fetch");
    assert!(summary.rounds.is_empty());
    assert_eq!(summary.written, 0);
}

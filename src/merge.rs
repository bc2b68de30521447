//! Reconciles a freshly extracted batch against what is already stored.
//!
//! Every entity goes through the same three steps: drop duplicates inside the batch, drop rows
//! whose parents are not stored, drop rows whose full natural key is already stored. What is left
//! can be inserted without violating a key or a foreign key.

use std::collections::HashSet;
use std::hash::Hash;

use crate::error::SyncError;
use crate::model::{Match, Matchday, Player, PlayerStat, Table, Team};

pub trait NaturalKey {
    type Key: Eq + Hash + Clone;

    fn natural_key(&self) -> Self::Key;
}

impl NaturalKey for Matchday {
    type Key = u64;

    fn natural_key(&self) -> u64 {
        self.matchday_id
    }
}

impl NaturalKey for Team {
    type Key = u64;

    fn natural_key(&self) -> u64 {
        self.team_id
    }
}

impl NaturalKey for Player {
    type Key = u64;

    fn natural_key(&self) -> u64 {
        self.player_id
    }
}

impl NaturalKey for Match {
    type Key = u64;

    fn natural_key(&self) -> u64 {
        self.match_id
    }
}

impl NaturalKey for PlayerStat {
    type Key = (u64, u64, u64);

    fn natural_key(&self) -> (u64, u64, u64) {
        self.key()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome<T> {
    pub table: Table,
    pub rows: Vec<T>,
    pub duplicates_in_batch: usize,
    pub referential_gaps: usize,
    pub already_stored: usize,
}

impl<T> MergeOutcome<T> {
    pub fn is_noop(&self) -> bool {
        self.rows.is_empty()
    }

    /// Recovered conditions worth telling the caller about.
    pub fn notices(&self) -> Vec<SyncError> {
        let mut out = Vec::new();
        if self.already_stored > 0 {
            out.push(SyncError::DuplicateKey {
                table: self.table,
                count: self.already_stored,
            });
        }
        if self.referential_gaps > 0 {
            out.push(SyncError::ReferentialGap {
                table: self.table,
                count: self.referential_gaps,
            });
        }
        out
    }
}

/// Keeps the first row seen for each key.
pub fn dedup_batch<T: NaturalKey>(rows: Vec<T>) -> (Vec<T>, usize) {
    let mut seen = HashSet::with_capacity(rows.len());
    let before = rows.len();
    let kept = rows
        .into_iter()
        .filter(|row| seen.insert(row.natural_key()))
        .collect::<Vec<_>>();
    let dropped = before - kept.len();
    (kept, dropped)
}

pub fn merge<T, F>(
    table: Table,
    rows: Vec<T>,
    parents_stored: F,
    existing: &HashSet<T::Key>,
) -> MergeOutcome<T>
where
    T: NaturalKey,
    F: Fn(&T) -> bool,
{
    let (rows, duplicates_in_batch) = dedup_batch(rows);

    let before = rows.len();
    let rows = rows.into_iter().filter(|r| parents_stored(r)).collect::<Vec<_>>();
    let referential_gaps = before - rows.len();

    let before = rows.len();
    let rows = rows
        .into_iter()
        .filter(|r| !existing.contains(&r.natural_key()))
        .collect::<Vec<_>>();
    let already_stored = before - rows.len();

    MergeOutcome {
        table,
        rows,
        duplicates_in_batch,
        referential_gaps,
        already_stored,
    }
}

pub fn merge_matchdays(rows: Vec<Matchday>, existing: &HashSet<u64>) -> MergeOutcome<Matchday> {
    merge(Table::Matchday, rows, |_| true, existing)
}

/// `existing` holds the team ids already stored for the season.
pub fn merge_teams(rows: Vec<Team>, existing: &HashSet<u64>) -> MergeOutcome<Team> {
    merge(Table::Team, rows, |_| true, existing)
}

pub fn merge_players(
    rows: Vec<Player>,
    stored_teams: &HashSet<u64>,
    existing: &HashSet<u64>,
) -> MergeOutcome<Player> {
    merge(
        Table::Player,
        rows,
        |p| stored_teams.contains(&p.team_id),
        existing,
    )
}

pub fn merge_matches(
    rows: Vec<Match>,
    stored_teams: &HashSet<u64>,
    stored_matchdays: &HashSet<u64>,
    existing: &HashSet<u64>,
) -> MergeOutcome<Match> {
    merge(
        Table::FootballGame,
        rows,
        |m| {
            stored_teams.contains(&m.home_team_id)
                && stored_teams.contains(&m.away_team_id)
                && stored_matchdays.contains(&m.matchday_id)
        },
        existing,
    )
}

/// Stat rows for players not (yet) stored are dropped rather than queued.
pub fn merge_player_stats(
    rows: Vec<PlayerStat>,
    stored_players: &HashSet<(u64, u64)>,
    stored_matches: &HashSet<u64>,
    existing: &HashSet<(u64, u64, u64)>,
) -> MergeOutcome<PlayerStat> {
    merge(
        Table::PlayerStats,
        rows,
        |s| {
            stored_players.contains(&(s.player_id, s.team_id))
                && stored_matches.contains(&s.match_id)
        },
        existing,
    )
}

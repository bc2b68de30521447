//! The storage seam the sync pipeline writes through.
//!
//! A `Store` applies each insert batch as one transaction: either every row lands or none does.
//! The gateway maps store failures into `SyncError::Storage` so the pipeline can keep going with
//! the next entity type.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use anyhow::Result;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::model::{Match, Matchday, Player, PlayerStat, SeasonInfo, Table, Team, TeamMetadata};

/// Foreign-key order for one sync cycle.
pub const WRITE_ORDER: [Table; 5] = [
    Table::Matchday,
    Table::Team,
    Table::Player,
    Table::FootballGame,
    Table::PlayerStats,
];

/// Ledger entry for one sync cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRun {
    pub season_id: u64,
    pub started_at: String,
    pub finished_at: String,
    pub rounds: Vec<u32>,
    pub rows_inserted: BTreeMap<Table, usize>,
    pub errors: Vec<String>,
    pub outcome: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetCounts {
    pub player_stats: usize,
    pub matches: usize,
    pub players: usize,
}

pub trait Store {
    fn season(&self, season_id: u64) -> Result<Option<SeasonInfo>>;

    /// Highest round with at least one stored match.
    fn last_synced_round(&self, season_id: u64) -> Result<Option<u32>>;

    fn matchday_ids(&self, season_id: u64) -> Result<HashSet<u64>>;
    fn team_ids(&self, season_id: u64) -> Result<HashSet<u64>>;
    fn player_team_pairs(&self, season_id: u64) -> Result<HashSet<(u64, u64)>>;
    fn match_ids(&self) -> Result<HashSet<u64>>;
    /// Every stored `(player_id, team_id, match_id)`, across seasons like the primary key.
    fn player_stat_keys(&self) -> Result<HashSet<(u64, u64, u64)>>;

    fn insert_matchdays(&mut self, rows: &[Matchday]) -> Result<usize>;
    fn insert_teams(&mut self, rows: &[Team]) -> Result<usize>;
    fn insert_players(&mut self, rows: &[Player]) -> Result<usize>;
    fn insert_matches(&mut self, rows: &[Match]) -> Result<usize>;
    fn insert_player_stats(&mut self, rows: &[PlayerStat]) -> Result<usize>;

    fn categories(&self, competition_id: u64) -> Result<BTreeSet<String>>;

    /// Adds categories not yet known for the competition; returns how many were new.
    fn record_categories(&mut self, competition_id: u64, categories: &BTreeSet<String>)
    -> Result<usize>;

    fn update_team_metadata(
        &mut self,
        season_id: u64,
        metadata: &[(u64, TeamMetadata)],
    ) -> Result<usize>;

    /// Deletes stats, then matches, then players of the season in one transaction.
    fn delete_season_data(&mut self, season_id: u64) -> Result<ResetCounts>;

    fn record_sync_run(&mut self, run: &SyncRun) -> Result<()>;
}

/// Runs one batch write. Empty batches never reach the store.
pub fn commit<T, F>(table: Table, rows: &[T], write: F) -> Result<usize, SyncError>
where
    F: FnOnce(&[T]) -> Result<usize>,
{
    if rows.is_empty() {
        return Ok(0);
    }
    match write(rows) {
        Ok(inserted) => {
            info!(%table, inserted, "batch committed");
            Ok(inserted)
        }
        Err(err) => {
            warn!(%table, rows = rows.len(), error = %format!("{err:#}"), "batch rolled back");
            Err(SyncError::storage(table, &err))
        }
    }
}

pub fn reset_season<S: Store + ?Sized>(
    store: &mut S,
    season_id: u64,
) -> Result<ResetCounts, SyncError> {
    let counts = store
        .delete_season_data(season_id)
        .map_err(|err| SyncError::storage(Table::PlayerStats, &err))?;
    info!(
        season_id,
        player_stats = counts.player_stats,
        matches = counts.matches,
        players = counts.players,
        "season data reset"
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn empty_batches_skip_the_writer() {
        let rows: Vec<Team> = Vec::new();
        let result = commit(Table::Team, &rows, |_| -> Result<usize> {
            panic!("writer must not run for an empty batch")
        });
        assert_eq!(result, Ok(0));
    }

    #[test]
    fn writer_failures_become_storage_errors() {
        let rows = vec![Team {
            team_id: 1,
            team_name: "A".to_string(),
            season_id: 1,
        }];
        let result = commit(Table::Team, &rows, |_| Err(anyhow!("UNIQUE constraint failed")));
        match result {
            Err(SyncError::Storage { table, message }) => {
                assert_eq!(table, Table::Team);
                assert!(message.contains("UNIQUE"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

//! One incremental sync cycle per season.
//!
//! ```text
//! Unsynced -> Scanning -> Extracting -> Merging -> Persisting -> Synced
//!                 ^                                                 |
//!                 +------------------- next sync -------------------+
//! ```
//!
//! Rounds above the stored watermark are processed in ascending order. Within a round every
//! entity type is merged against the stored keys and written as its own transaction, parents
//! first. A failed batch is reported and the cycle moves on; the cycle then ends in `Failed`
//! but whatever was committed stays committed.
//!
//! The stat vocabulary is rebuilt from every source file on each cycle, synced rounds included.
//! A cycle with no pending round and no unseen category writes nothing, not even a run record.

use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::enrich::{TeamMetadataSource, enrich_teams};
use crate::error::SyncError;
use crate::extract::{MatchExtract, extract_match_file};
use crate::gateway::{self, ResetCounts, Store, SyncRun, commit};
use crate::merge::{
    MergeOutcome, merge_matchdays, merge_matches, merge_player_stats, merge_players, merge_teams,
};
use crate::model::{Match, Matchday, Player, PlayerStat, SeasonInfo, Table, Team};
use crate::scanner::{RoundSource, SeasonPaths, pending_rounds};
use crate::stat_normalizer::{Vocabulary, collect_vocabulary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Unsynced,
    Scanning,
    Extracting,
    Merging,
    Persisting,
    Synced,
    Failed,
}

impl SyncPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncPhase::Unsynced => "unsynced",
            SyncPhase::Scanning => "scanning",
            SyncPhase::Extracting => "extracting",
            SyncPhase::Merging => "merging",
            SyncPhase::Persisting => "persisting",
            SyncPhase::Synced => "synced",
            SyncPhase::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub season_id: u64,
    pub phase: SyncPhase,
    pub watermark: u32,
    pub rounds_processed: Vec<u32>,
    pub files_scanned: usize,
    pub rows_inserted: BTreeMap<Table, usize>,
    pub new_categories: usize,
    pub teams_enriched: usize,
    pub errors: Vec<SyncError>,
}

impl SyncReport {
    fn new(season_id: u64) -> Self {
        Self {
            season_id,
            phase: SyncPhase::Scanning,
            watermark: 0,
            rounds_processed: Vec::new(),
            files_scanned: 0,
            rows_inserted: gateway::WRITE_ORDER.iter().map(|t| (*t, 0)).collect(),
            new_categories: 0,
            teams_enriched: 0,
            errors: Vec::new(),
        }
    }

    pub fn inserted(&self, table: Table) -> usize {
        self.rows_inserted.get(&table).copied().unwrap_or(0)
    }

    pub fn total_inserted(&self) -> usize {
        self.rows_inserted.values().sum()
    }

    pub fn is_failed(&self) -> bool {
        self.phase == SyncPhase::Failed
    }
}

/// Metadata source plus the size of the pool that queries it.
pub struct Enricher {
    source: Box<dyn TeamMetadataSource + Send>,
    workers: usize,
}

impl Enricher {
    pub fn new(source: Box<dyn TeamMetadataSource + Send>, workers: usize) -> Self {
        Self {
            source,
            workers: workers.max(1),
        }
    }
}

#[derive(Debug, Default)]
struct RoundBatch {
    matchdays: Vec<Matchday>,
    teams: Vec<Team>,
    players: Vec<Player>,
    games: Vec<Match>,
    stats: Vec<PlayerStat>,
}

impl RoundBatch {
    fn push(&mut self, extract: MatchExtract) {
        self.matchdays.push(extract.matchday);
        self.teams.extend(extract.teams);
        self.players.extend(extract.players);
        self.games.push(extract.game);
        self.stats.extend(extract.stats);
    }
}

pub struct SyncPipeline<S: Store> {
    store: S,
    data_root: PathBuf,
    enricher: Option<Enricher>,
    phase: SyncPhase,
}

impl<S: Store> SyncPipeline<S> {
    pub fn new(store: S, data_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            data_root: data_root.into(),
            enricher: None,
            phase: SyncPhase::Unsynced,
        }
    }

    pub fn with_enricher(mut self, enricher: Enricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn season_paths(&self, season: &SeasonInfo) -> SeasonPaths {
        SeasonPaths::new(&self.data_root, &season.competition_name, &season.season_name)
    }

    fn enter(&mut self, phase: SyncPhase) {
        if self.phase != phase {
            debug!(from = self.phase.as_str(), to = phase.as_str(), "sync phase");
            self.phase = phase;
        }
    }

    /// Deletes the season's stats, matches and players so the next sync starts from round 1.
    pub fn reset_season(&mut self, season_id: u64) -> Result<ResetCounts, SyncError> {
        match self.store.season(season_id) {
            Ok(Some(_)) => {}
            Ok(None) => return Err(SyncError::UnknownSeason(season_id)),
            Err(err) => return Err(SyncError::storage(Table::PlayerStats, &err)),
        }
        let counts = gateway::reset_season(&mut self.store, season_id)?;
        self.phase = SyncPhase::Unsynced;
        Ok(counts)
    }

    pub fn sync(&mut self, season_id: u64) -> SyncReport {
        let started_at = Utc::now().to_rfc3339();
        let mut report = SyncReport::new(season_id);
        self.enter(SyncPhase::Scanning);

        let season = match self.store.season(season_id) {
            Ok(Some(season)) => season,
            Ok(None) => {
                report.errors.push(SyncError::UnknownSeason(season_id));
                return self.finish(report, None);
            }
            Err(err) => {
                report.errors.push(SyncError::storage(Table::Matchday, &err));
                return self.finish(report, None);
            }
        };

        report.watermark = match self.store.last_synced_round(season_id) {
            Ok(round) => round.unwrap_or(0),
            Err(err) => {
                warn!(season_id, error = %format!("{err:#}"), "watermark unreadable, rescanning from round 1");
                0
            }
        };

        let paths = self.season_paths(&season);
        let sources = match pending_rounds(&paths.match_data_dir(), 0) {
            Ok(sources) => sources,
            Err(err) => {
                report.errors.push(SyncError::parse(
                    paths.match_data_dir().display().to_string(),
                    format!("{err:#}"),
                ));
                Vec::new()
            }
        };
        let all_files = sources
            .iter()
            .flat_map(|s| s.files.iter().cloned())
            .collect::<Vec<_>>();
        let (vocabulary, unreadable) = collect_vocabulary(&all_files);
        let rounds = sources
            .into_iter()
            .filter(|s| s.round > report.watermark)
            .collect::<Vec<_>>();
        // Files of pending rounds are reported again by extraction.
        let pending_files = rounds
            .iter()
            .flat_map(|s| s.files.iter().map(|f| f.display().to_string()))
            .collect::<HashSet<_>>();
        report.errors.extend(unreadable.into_iter().filter(|err| {
            !matches!(err, SyncError::Parse { file, .. } if pending_files.contains(file))
        }));
        info!(
            season_id,
            watermark = report.watermark,
            pending = rounds.len(),
            files = all_files.len(),
            "scan complete"
        );

        let idle = rounds.is_empty()
            && (all_files.is_empty() || self.vocabulary_stored(&season, &vocabulary));
        if idle {
            debug!(season_id, "nothing to sync");
            return self.finish(report, None);
        }

        let mut new_teams = Vec::new();
        for source in &rounds {
            self.sync_round(&season, source, &mut new_teams, &mut report);
        }

        self.enter(SyncPhase::Persisting);
        match self
            .store
            .record_categories(season.competition_id, vocabulary.categories())
        {
            Ok(added) => report.new_categories = added,
            Err(err) => report
                .errors
                .push(SyncError::storage(Table::PlayerStats, &err)),
        }

        self.enrich(&season, &new_teams, &mut report);
        self.finish(report, Some(started_at))
    }

    fn sync_round(
        &mut self,
        season: &SeasonInfo,
        source: &RoundSource,
        new_teams: &mut Vec<Team>,
        report: &mut SyncReport,
    ) {
        let season_id = season.season_id;
        self.enter(SyncPhase::Extracting);
        let mut batch = RoundBatch::default();
        for path in &source.files {
            match extract_match_file(path, season_id, Some(source.round)) {
                Ok(extract) => batch.push(extract),
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "match file skipped");
                    report.errors.push(err);
                }
            }
        }
        report.files_scanned += source.files.len();
        report.rounds_processed.push(source.round);
        debug!(
            round = source.round,
            matches = batch.games.len(),
            stats = batch.stats.len(),
            "round extracted"
        );

        self.enter(SyncPhase::Merging);
        let Some(mut matchdays) = self.stored_keys(Table::Matchday, report, |s| {
            s.matchday_ids(season_id)
        }) else {
            return;
        };
        let outcome = merge_matchdays(batch.matchdays, &matchdays);
        for row in self.persist(outcome, report, S::insert_matchdays) {
            matchdays.insert(row.matchday_id);
        }

        let Some(mut teams) = self.stored_keys(Table::Team, report, |s| s.team_ids(season_id))
        else {
            return;
        };
        let outcome = merge_teams(batch.teams, &teams);
        let inserted_teams = self.persist(outcome, report, S::insert_teams);
        teams.extend(inserted_teams.iter().map(|t| t.team_id));
        new_teams.extend(inserted_teams);

        let Some(mut pairs) = self.stored_keys(Table::Player, report, |s| {
            s.player_team_pairs(season_id)
        }) else {
            return;
        };
        let stored_players = pairs.iter().map(|(player, _)| *player).collect::<HashSet<_>>();
        let outcome = merge_players(batch.players, &teams, &stored_players);
        for row in self.persist(outcome, report, S::insert_players) {
            pairs.insert((row.player_id, row.team_id));
        }

        let Some(mut games) = self.stored_keys(Table::FootballGame, report, |s| s.match_ids())
        else {
            return;
        };
        let outcome = merge_matches(batch.games, &teams, &matchdays, &games);
        for row in self.persist(outcome, report, S::insert_matches) {
            games.insert(row.match_id);
        }

        let Some(stat_keys) =
            self.stored_keys(Table::PlayerStats, report, |s| s.player_stat_keys())
        else {
            return;
        };
        let outcome = merge_player_stats(batch.stats, &pairs, &games, &stat_keys);
        self.persist(outcome, report, S::insert_player_stats);
    }

    /// True when every observed category is already stored for the competition.
    fn vocabulary_stored(&self, season: &SeasonInfo, vocabulary: &Vocabulary) -> bool {
        match self.store.categories(season.competition_id) {
            Ok(stored) => vocabulary.categories().is_subset(&stored),
            Err(err) => {
                warn!(season_id = season.season_id, error = %format!("{err:#}"), "stored categories unreadable");
                false
            }
        }
    }

    fn stored_keys<K, F>(
        &self,
        table: Table,
        report: &mut SyncReport,
        query: F,
    ) -> Option<HashSet<K>>
    where
        K: Eq + Hash,
        F: FnOnce(&S) -> anyhow::Result<HashSet<K>>,
    {
        match query(&self.store) {
            Ok(keys) => Some(keys),
            Err(err) => {
                warn!(%table, error = %format!("{err:#}"), "stored key lookup failed");
                report.errors.push(SyncError::storage(table, &err));
                None
            }
        }
    }

    /// Writes the merged rows and hands back the ones that were committed.
    fn persist<T, W>(
        &mut self,
        outcome: MergeOutcome<T>,
        report: &mut SyncReport,
        write: W,
    ) -> Vec<T>
    where
        W: FnOnce(&mut S, &[T]) -> anyhow::Result<usize>,
    {
        let table = outcome.table;
        for notice in outcome.notices() {
            match notice {
                SyncError::DuplicateKey { count, .. } => {
                    debug!(%table, count, "already stored rows excluded");
                }
                other => {
                    warn!(%table, error = %other, "rows dropped");
                    report.errors.push(other);
                }
            }
        }
        if outcome.is_noop() {
            return Vec::new();
        }

        self.enter(SyncPhase::Persisting);
        let rows = outcome.rows;
        let store = &mut self.store;
        match commit(table, &rows, |rows| write(store, rows)) {
            Ok(inserted) => {
                *report.rows_inserted.entry(table).or_insert(0) += inserted;
                rows
            }
            Err(err) => {
                report.errors.push(err);
                Vec::new()
            }
        }
    }

    fn enrich(&mut self, season: &SeasonInfo, new_teams: &[Team], report: &mut SyncReport) {
        let Some(enricher) = self.enricher.as_ref() else {
            return;
        };
        if new_teams.is_empty() {
            return;
        }
        let outcome = enrich_teams(
            enricher.source.as_ref(),
            &season.competition_name,
            new_teams,
            enricher.workers,
        );
        report.errors.extend(outcome.errors);
        if outcome.found.is_empty() {
            return;
        }
        match self
            .store
            .update_team_metadata(season.season_id, &outcome.found)
        {
            Ok(updated) => {
                info!(season_id = season.season_id, updated, "team metadata stored");
                report.teams_enriched = updated;
            }
            Err(err) => report.errors.push(SyncError::storage(Table::Team, &err)),
        }
    }

    /// Settles the final phase and records the run. `started_at` is `None` when the cycle never
    /// resolved its season or found nothing to sync, in which case nothing is written.
    fn finish(&mut self, mut report: SyncReport, started_at: Option<String>) -> SyncReport {
        let phase = if report.errors.iter().any(SyncError::is_fatal) {
            SyncPhase::Failed
        } else {
            SyncPhase::Synced
        };
        self.enter(phase);
        report.phase = phase;

        if let Some(started_at) = started_at {
            let run = SyncRun {
                season_id: report.season_id,
                started_at,
                finished_at: Utc::now().to_rfc3339(),
                rounds: report.rounds_processed.clone(),
                rows_inserted: report.rows_inserted.clone(),
                errors: report.errors.iter().map(ToString::to_string).collect(),
                outcome: phase.as_str().to_string(),
            };
            if let Err(err) = self.store.record_sync_run(&run) {
                warn!(season_id = report.season_id, error = %format!("{err:#}"), "sync run not recorded");
            }
        }

        info!(
            season_id = report.season_id,
            phase = phase.as_str(),
            rounds = report.rounds_processed.len(),
            inserted = report.total_inserted(),
            errors = report.errors.len(),
            "sync finished"
        );
        report
    }
}

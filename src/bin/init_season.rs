use anyhow::{Context, Result, anyhow};

use matchday_sync::cli;
use matchday_sync::config::SyncConfig;
use matchday_sync::db::SqliteStore;
use matchday_sync::model::MAX_ROUND;
use matchday_sync::scanner::SeasonPaths;

const DEFAULT_ROUNDS: u32 = 38;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = cli::args();
    let config = SyncConfig::from_env();
    let competition = cli::arg_value(&args, "--competition")
        .ok_or_else(|| anyhow!("missing --competition <name>"))?;
    let season_name = cli::arg_value(&args, "--season")
        .ok_or_else(|| anyhow!("missing --season <YYYY/YYYY>"))?;
    let rounds = match cli::arg_value(&args, "--rounds") {
        Some(raw) => raw
            .parse::<u32>()
            .with_context(|| format!("--rounds expects a number, got {raw:?}"))?,
        None => DEFAULT_ROUNDS,
    };
    if rounds == 0 || rounds > MAX_ROUND {
        return Err(anyhow!("--rounds must be within 1..={MAX_ROUND}"));
    }
    let db_path = cli::db_path(&args, &config)?;

    let mut store = SqliteStore::open(&db_path)?;
    let competition = store.ensure_competition(&competition)?;
    let season = store.ensure_season(competition.competition_id, &season_name)?;
    let created = store.preallocate_matchdays(season.season_id, rounds)?;

    let paths = SeasonPaths::new(
        &config.data_root,
        &season.competition_name,
        &season.season_name,
    );
    paths.ensure_dirs()?;

    println!("Season ready");
    println!("DB: {}", db_path.display());
    println!(
        "Competition: {} (id {})",
        competition.name, competition.competition_id
    );
    println!("Season: {} (id {})", season.season_name, season.season_id);
    println!("Matchdays created: {created} of {rounds}");
    println!("Round lists: {}", paths.round_lists_dir().display());

    let status = store.season_status(season.season_id)?;
    match status.last_round {
        Some(round) => println!("Last synced round: {round}"),
        None => println!("Last synced round: none"),
    }

    Ok(())
}

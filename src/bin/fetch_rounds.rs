use anyhow::{Context, Result, anyhow};

use matchday_sync::cli;
use matchday_sync::config::SyncConfig;
use matchday_sync::db::SqliteStore;
use matchday_sync::feed::{HttpMatchFeed, fetch_pending_rounds};
use matchday_sync::gateway::Store;
use matchday_sync::scanner::SeasonPaths;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = cli::args();
    let config = SyncConfig::from_env();
    let season_id = cli::required_u64(&args, "--season")?;
    let db_path = cli::db_path(&args, &config)?;

    let store = SqliteStore::open(&db_path)?;
    let season = store
        .season(season_id)?
        .ok_or_else(|| anyhow!("season {season_id} is not registered"))?;
    let watermark = store.last_synced_round(season_id)?.unwrap_or(0);

    let paths = SeasonPaths::new(
        &config.data_root,
        &season.competition_name,
        &season.season_name,
    );
    paths.ensure_dirs()?;
    let feed = HttpMatchFeed::new(&config.feed);
    let summary = fetch_pending_rounds(&feed, &paths, watermark)
        .with_context(|| format!("fetch rounds into {}", paths.root().display()))?;

    println!("Round fetch complete");
    println!("Source: {}", paths.root().display());
    println!("Watermark: round {watermark}");
    println!("Rounds: {:?}", summary.rounds);
    println!(
        "Files written: {} (kept {} existing)",
        summary.written, summary.skipped_existing
    );
    if !summary.failures.is_empty() {
        println!("Failures: {}", summary.failures.len());
        for (round, identifier, err) in summary.failures.iter().take(8) {
            println!(" - round {round} {identifier}: {err}");
        }
    }

    Ok(())
}

use anyhow::{Context, Result, anyhow};

use matchday_sync::cli;
use matchday_sync::config::SyncConfig;
use matchday_sync::db::SqliteStore;
use matchday_sync::enrich::FootballDataClient;
use matchday_sync::gateway::WRITE_ORDER;
use matchday_sync::pipeline::{Enricher, SyncPipeline};

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
    let mut pipeline = SyncPipeline::new(store, config.data_root.clone());
    if let Some(enrich) = config.enrich.as_ref()
        && !cli::has_flag(&args, "--no-enrich")
    {
        pipeline = pipeline.with_enricher(Enricher::new(
            Box::new(FootballDataClient::new(enrich)),
            enrich.workers,
        ));
    }

    if cli::has_flag(&args, "--reset") {
        let counts = pipeline
            .reset_season(season_id)
            .with_context(|| format!("reset season {season_id}"))?;
        println!(
            "Reset season {season_id}: player_stats={} matches={} players={}",
            counts.player_stats, counts.matches, counts.players
        );
    }

    let report = pipeline.sync(season_id);

    println!("Matchday sync complete");
    println!("DB: {}", db_path.display());
    println!("Season: {} ({})", report.season_id, report.phase.as_str());
    println!("Watermark: round {}", report.watermark);
    println!(
        "Rounds: {:?} ({} files)",
        report.rounds_processed, report.files_scanned
    );
    for table in WRITE_ORDER {
        println!("  {table}: +{}", report.inserted(table));
    }
    if report.new_categories > 0 {
        println!("New stat categories: {}", report.new_categories);
    }
    if report.teams_enriched > 0 {
        println!("Teams enriched: {}", report.teams_enriched);
    }
    if !report.errors.is_empty() {
        println!("Errors: {}", report.errors.len());
        for err in report.errors.iter().take(12) {
            println!(" - {err}");
        }
    }

    if let Ok(status) = pipeline.store().season_status(season_id)
        && let Some(days) = status.days_since_update
    {
        println!("Last update: {days} day(s) ago");
    }

    if report.is_failed() {
        return Err(anyhow!("sync of season {season_id} failed"));
    }
    Ok(())
}

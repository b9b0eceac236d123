use anyhow::{Context, Result};
use log::info;

use podcast_collage::artwork::HttpFetcher;
use podcast_collage::config::Config;
use podcast_collage::episode::extract_episodes;
use podcast_collage::pipeline::CollagePipeline;
use podcast_collage::source;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().context("Invalid configuration")?;

    info!("Starting podcast collage run");
    info!("Database: {}", config.db_path.display());
    info!("Cache path: {}", config.cache_path.display());
    info!("Output path: {}", config.output_path.display());
    info!(
        "Date range: {} ..= {} ({})",
        config.start_date, config.end_date, config.timezone
    );

    let rows = source::fetch_history_rows(&config.db_path)
        .await
        .context("Failed to read listening history")?;
    let extraction = extract_episodes(rows, &config.timezone);
    info!(
        "Extracted {} episodes ({} records rejected)",
        extraction.episodes.len(),
        extraction.rejected
    );

    // Fetching and image work are blocking; keep them off the async workers.
    let summary = tokio::task::spawn_blocking(move || -> Result<_> {
        let fetcher = HttpFetcher::new(config.fetch.timeout);
        let pipeline = CollagePipeline::new(&config, fetcher)?;
        let summary = pipeline.run(&extraction, config.date_range());

        let summary_path = pipeline.output_dir().join("summary.json");
        summary
            .write_json(&summary_path)
            .with_context(|| format!("Failed to write {}", summary_path.display()))?;
        info!("Run summary written to {}", summary_path.display());
        Ok(summary)
    })
    .await
    .context("Collage worker panicked")??;

    summary.log();
    Ok(())
}

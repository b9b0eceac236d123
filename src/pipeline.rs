use chrono::NaiveDate;
use log::{error, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::artwork::{assign_keys, ArtworkCache, ArtworkFetcher, CacheError, RetryPolicy};
use crate::collage::{collage_path, compose, load_tile, write_collage};
use crate::config::{CollageConfig, Config};
use crate::episode::{Episode, Extraction};
use crate::grouping::{group_by_date, partition_fetchable, DateRange};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to prepare artwork cache: {0}")]
    Cache(#[from] CacheError),
    #[error("Failed to create output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write run summary: {0}")]
    Summary(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    MissingArtwork,
    OverCollageLimit,
    FetchFailed { message: String },
    DecodeFailed { message: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingArtwork => write!(f, "missing artwork"),
            SkipReason::OverCollageLimit => write!(f, "over collage limit"),
            SkipReason::FetchFailed { message } => write!(f, "fetch failed: {}", message),
            SkipReason::DecodeFailed { message } => write!(f, "decode failed: {}", message),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedEpisode {
    pub episode_name: String,
    pub podcast_name: String,
    pub reason: SkipReason,
}

impl SkippedEpisode {
    fn new(episode: &Episode, reason: SkipReason) -> Self {
        Self {
            episode_name: episode.episode_name.clone(),
            podcast_name: episode.podcast_name.clone(),
            reason,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DateReport {
    pub date: NaiveDate,
    pub included: usize,
    pub skipped: Vec<SkippedEpisode>,
    pub collage: Option<PathBuf>,
    pub error: Option<String>,
}

impl DateReport {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            included: 0,
            skipped: Vec::new(),
            collage: None,
            error: None,
        }
    }

    fn skip(&mut self, episode: &Episode, reason: SkipReason) {
        warn!(
            "{}: skipping {:?} ({}): {}",
            self.date, episode.episode_name, episode.podcast_name, reason
        );
        self.skipped.push(SkippedEpisode::new(episode, reason));
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rejected_records: usize,
    pub dates: Vec<DateReport>,
}

impl RunSummary {
    pub fn collages_written(&self) -> usize {
        self.dates.iter().filter(|d| d.collage.is_some()).count()
    }

    pub fn log(&self) {
        for report in &self.dates {
            match &report.collage {
                Some(path) => info!(
                    "{}: {} included, {} skipped -> {}",
                    report.date,
                    report.included,
                    report.skipped.len(),
                    path.display()
                ),
                None => info!(
                    "{}: no collage ({} skipped{})",
                    report.date,
                    report.skipped.len(),
                    report
                        .error
                        .as_deref()
                        .map(|e| format!(", {}", e))
                        .unwrap_or_default()
                ),
            }
        }
        info!(
            "Collage generation complete: {} collages for {}..={} ({} history records rejected)",
            self.collages_written(),
            self.start_date,
            self.end_date,
            self.rejected_records
        );
    }

    pub fn write_json(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Turns grouped listening history into one collage per date.
pub struct CollagePipeline<F> {
    cache: ArtworkCache<F>,
    settings: CollageConfig,
    output_dir: PathBuf,
}

impl<F: ArtworkFetcher> CollagePipeline<F> {
    pub fn new(config: &Config, fetcher: F) -> Result<Self, PipelineError> {
        let cache = ArtworkCache::new(
            config.cache_path.clone(),
            fetcher,
            RetryPolicy::from(&config.fetch),
        )?;
        Self::with_cache(cache, config.collage.clone(), config.output_path.clone())
    }

    pub fn with_cache(
        cache: ArtworkCache<F>,
        settings: CollageConfig,
        output_dir: PathBuf,
    ) -> Result<Self, PipelineError> {
        fs::create_dir_all(&output_dir).map_err(|source| PipelineError::OutputDir {
            path: output_dir.clone(),
            source,
        })?;

        Ok(Self {
            cache,
            settings,
            output_dir,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn run(&self, extraction: &Extraction, range: DateRange) -> RunSummary {
        let groups = group_by_date(&extraction.episodes, range);
        info!(
            "Found {} listening days between {} and {}",
            groups.len(),
            range.start,
            range.end
        );

        let dates = groups
            .into_iter()
            .map(|(date, group)| self.process_date(date, group))
            .collect();

        RunSummary {
            start_date: range.start,
            end_date: range.end,
            rejected_records: extraction.rejected,
            dates,
        }
    }

    /// Fetches, composes and writes the collage for one date. Failures of single
    /// episodes are recorded in the report; a failure to write the collage only
    /// affects this date.
    pub fn process_date(&self, date: NaiveDate, group: Vec<Episode>) -> DateReport {
        let mut report = DateReport::new(date);

        let (mut fetchable, missing) = partition_fetchable(group);
        for episode in &missing {
            report.skip(episode, SkipReason::MissingArtwork);
        }
        if fetchable.is_empty() {
            info!("{}: no episodes with artwork, skipping", date);
            return report;
        }

        if fetchable.len() > self.settings.max_items {
            warn!(
                "{}: {} episodes exceed the collage limit of {}",
                date,
                fetchable.len(),
                self.settings.max_items
            );
            for episode in fetchable.split_off(self.settings.max_items) {
                report.skip(&episode, SkipReason::OverCollageLimit);
            }
        }

        info!("Generating collage for {} ({} episodes)", date, fetchable.len());

        let keys = assign_keys(date, &fetchable);
        let mut cached: Vec<(&Episode, PathBuf)> = Vec::with_capacity(fetchable.len());
        for (episode, key) in fetchable.iter().zip(&keys) {
            // partition_fetchable guarantees an artwork URL
            let Some(url) = episode.artwork_url.as_deref() else {
                continue;
            };
            match self.cache.ensure_cached(key, url) {
                Ok(path) => cached.push((episode, path)),
                Err(e) => report.skip(
                    episode,
                    SkipReason::FetchFailed {
                        message: e.to_string(),
                    },
                ),
            }
        }

        // Only cell-sized tiles are kept; each full-size decode is dropped
        // inside the worker that produced it.
        let cell_size = self.settings.cell_size;
        let decoded: Vec<_> = cached
            .par_iter()
            .map(|(episode, path)| (*episode, load_tile(path, cell_size)))
            .collect();

        let mut tiles = Vec::with_capacity(decoded.len());
        for (episode, result) in decoded {
            match result {
                Ok(tile) => tiles.push(tile),
                Err(e) => report.skip(
                    episode,
                    SkipReason::DecodeFailed {
                        message: e.to_string(),
                    },
                ),
            }
        }

        if tiles.is_empty() {
            warn!("{}: none of the artwork could be used, skipping", date);
            return report;
        }

        let written = compose(&tiles, cell_size, self.settings.background)
            .and_then(|(canvas, layout)| {
                let path = collage_path(&self.output_dir, date);
                write_collage(&canvas, &path)?;
                info!(
                    "Collage saved at: {} ({}x{} grid, {}x{} px)",
                    path.display(),
                    layout.grid_cols,
                    layout.grid_rows,
                    layout.canvas_width(),
                    layout.canvas_height()
                );
                Ok(path)
            });

        match written {
            Ok(path) => {
                report.included = tiles.len();
                report.collage = Some(path);
            }
            Err(e) => {
                error!("Failed to create collage for {}: {}", date, e);
                report.error = Some(e.to_string());
            }
        }

        report
    }
}

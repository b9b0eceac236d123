use chrono::{DateTime, Duration, NaiveDate};
use chrono_tz::Tz;
use log::warn;

/// One row of listening history as it comes out of the data source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEpisodeRow {
    pub episode_name: Option<String>,
    pub podcast_name: Option<String>,
    pub url: Option<String>,
    pub playback_date_ms: Option<i64>,
    pub duration_ms: Option<i64>,
    pub episode_artwork_url: Option<String>,
    pub podcast_artwork_url: Option<String>,
    /// First column whose stored value had the wrong type, if any.
    pub invalid_column: Option<&'static str>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("Record is missing {0}")]
    MissingField(&'static str),
    #[error("Playback timestamp {0} is not a valid positive millisecond timestamp")]
    InvalidTimestamp(i64),
    #[error("Record has an unreadable {0} value")]
    InvalidColumn(&'static str),
}

/// A single playback event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    pub episode_name: String,
    pub podcast_name: String,
    pub playback_url: String,
    pub date: NaiveDate,
    pub duration: Duration,
    pub artwork_url: Option<String>,
}

impl Episode {
    pub fn from_row(row: RawEpisodeRow, timezone: &Tz) -> Result<Self, RecordError> {
        if let Some(column) = row.invalid_column {
            return Err(RecordError::InvalidColumn(column));
        }
        let episode_name = row
            .episode_name
            .ok_or(RecordError::MissingField("episode name"))?;
        let podcast_name = row
            .podcast_name
            .ok_or(RecordError::MissingField("podcast name"))?;
        let playback_url = row.url.ok_or(RecordError::MissingField("url"))?;
        let playback_ms = row
            .playback_date_ms
            .ok_or(RecordError::MissingField("playback date"))?;

        Ok(Episode {
            episode_name,
            podcast_name,
            playback_url,
            date: playback_date(playback_ms, timezone)?,
            duration: Duration::milliseconds(row.duration_ms.unwrap_or(0).max(0)),
            artwork_url: resolve_artwork_url(row.episode_artwork_url, row.podcast_artwork_url),
        })
    }

    pub fn has_fetchable_artwork(&self) -> bool {
        self.artwork_url.as_deref().is_some_and(is_fetchable_url)
    }
}

/// Converts a millisecond Unix timestamp to the calendar date it falls on in `timezone`.
pub fn playback_date(timestamp_ms: i64, timezone: &Tz) -> Result<NaiveDate, RecordError> {
    if timestamp_ms <= 0 {
        return Err(RecordError::InvalidTimestamp(timestamp_ms));
    }
    let instant = DateTime::from_timestamp_millis(timestamp_ms)
        .ok_or(RecordError::InvalidTimestamp(timestamp_ms))?;
    Ok(instant.with_timezone(timezone).date_naive())
}

/// Episode artwork wins over podcast artwork; blank URLs count as absent.
pub fn resolve_artwork_url(episode: Option<String>, podcast: Option<String>) -> Option<String> {
    let present = |url: &String| !url.trim().is_empty();
    episode.filter(present).or_else(|| podcast.filter(present))
}

pub fn is_fetchable_url(url: &str) -> bool {
    let url = url.trim();
    ["http://", "https://"].iter().any(|scheme| {
        url.len() > scheme.len()
            && url
                .get(..scheme.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub episodes: Vec<Episode>,
    pub rejected: usize,
}

/// Normalizes raw rows, dropping the ones that cannot become an [`Episode`].
pub fn extract_episodes(rows: Vec<RawEpisodeRow>, timezone: &Tz) -> Extraction {
    let mut extraction = Extraction::default();

    for row in rows {
        let label = row
            .episode_name
            .clone()
            .unwrap_or_else(|| "<unnamed>".to_string());
        match Episode::from_row(row, timezone) {
            Ok(episode) => extraction.episodes.push(episode),
            Err(e) => {
                warn!("Skipping history record {:?}: {}", label, e);
                extraction.rejected += 1;
            }
        }
    }

    extraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(name: &str, playback_ms: i64) -> RawEpisodeRow {
        RawEpisodeRow {
            episode_name: Some(name.to_string()),
            podcast_name: Some("The Show".to_string()),
            url: Some("https://cdn.example.com/ep.mp3".to_string()),
            playback_date_ms: Some(playback_ms),
            duration_ms: Some(90_500),
            episode_artwork_url: None,
            podcast_artwork_url: Some("https://cdn.example.com/show.jpg".to_string()),
            invalid_column: None,
        }
    }

    #[test]
    fn test_from_row() {
        let ms = Tz::UTC
            .with_ymd_and_hms(2024, 8, 5, 12, 0, 0)
            .unwrap()
            .timestamp_millis();
        let episode = Episode::from_row(row("Pilot", ms), &Tz::UTC).unwrap();

        assert_eq!(episode.episode_name, "Pilot");
        assert_eq!(episode.date, NaiveDate::from_ymd_opt(2024, 8, 5).unwrap());
        assert_eq!(episode.duration, Duration::milliseconds(90_500));
        assert_eq!(
            episode.artwork_url.as_deref(),
            Some("https://cdn.example.com/show.jpg")
        );
    }

    #[test]
    fn test_missing_required_fields() {
        let mut no_name = row("x", 1_000);
        no_name.episode_name = None;
        assert_eq!(
            Episode::from_row(no_name, &Tz::UTC),
            Err(RecordError::MissingField("episode name"))
        );

        let mut no_podcast = row("x", 1_000);
        no_podcast.podcast_name = None;
        assert_eq!(
            Episode::from_row(no_podcast, &Tz::UTC),
            Err(RecordError::MissingField("podcast name"))
        );

        let mut no_url = row("x", 1_000);
        no_url.url = None;
        assert_eq!(
            Episode::from_row(no_url, &Tz::UTC),
            Err(RecordError::MissingField("url"))
        );
    }

    #[test]
    fn test_unreadable_column_rejected() {
        let mut raw = row("x", 1_000);
        raw.duration_ms = None;
        raw.invalid_column = Some("duration");
        assert_eq!(
            Episode::from_row(raw, &Tz::UTC),
            Err(RecordError::InvalidColumn("duration"))
        );
    }

    #[test]
    fn test_zero_timestamp_rejected() {
        assert_eq!(
            Episode::from_row(row("x", 0), &Tz::UTC),
            Err(RecordError::InvalidTimestamp(0))
        );
        assert_eq!(
            playback_date(-5, &Tz::UTC),
            Err(RecordError::InvalidTimestamp(-5))
        );
    }

    #[test]
    fn test_negative_duration_clamped() {
        let mut raw = row("x", 1_000);
        raw.duration_ms = Some(-20);
        assert_eq!(
            Episode::from_row(raw, &Tz::UTC).unwrap().duration,
            Duration::zero()
        );
    }

    #[test]
    fn test_local_midnight_and_late_evening_share_a_date() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let midnight = tz.with_ymd_and_hms(2024, 8, 5, 0, 0, 0).unwrap();
        let late = tz.with_ymd_and_hms(2024, 8, 5, 23, 59, 0).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 8, 5).unwrap();

        assert_eq!(playback_date(midnight.timestamp_millis(), &tz), Ok(expected));
        assert_eq!(playback_date(late.timestamp_millis(), &tz), Ok(expected));
        // The same instant is already the next day in UTC
        assert_ne!(playback_date(late.timestamp_millis(), &Tz::UTC), Ok(expected));
    }

    #[test]
    fn test_artwork_precedence() {
        let ep = Some("https://a/ep.jpg".to_string());
        let pod = Some("https://a/pod.jpg".to_string());

        assert_eq!(resolve_artwork_url(ep.clone(), pod.clone()), ep);
        assert_eq!(resolve_artwork_url(None, pod.clone()), pod);
        assert_eq!(resolve_artwork_url(Some("  ".to_string()), pod.clone()), pod);
        assert_eq!(resolve_artwork_url(None, None), None);
    }

    #[test]
    fn test_fetchable_urls() {
        assert!(is_fetchable_url("http://x/a.jpg"));
        assert!(is_fetchable_url("HTTPS://x/a.jpg"));
        assert!(!is_fetchable_url("ftp://x"));
        assert!(!is_fetchable_url("/sdcard/thumb.jpg"));
        assert!(!is_fetchable_url("https://"));
        assert!(!is_fetchable_url(""));
    }

    #[test]
    fn test_extract_counts_rejected_rows() {
        let mut broken = row("broken", 1_000);
        broken.url = None;
        let rows = vec![row("a", 1_000), broken, row("b", 0), row("c", 2_000)];

        let extraction = extract_episodes(rows, &Tz::UTC);
        assert_eq!(extraction.episodes.len(), 2);
        assert_eq!(extraction.rejected, 2);
    }
}

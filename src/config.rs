use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use image::Rgb;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::grouping::DateRange;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("Start date {start} is after end date {end}")]
    EmptyRange { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Clone)]
pub struct CollageConfig {
    pub cell_size: u32,
    pub background: Rgb<u8>,
    pub max_items: usize,
}

impl Default for CollageConfig {
    fn default() -> Self {
        Self {
            cell_size: 250,
            background: Rgb([0, 0, 0]),
            max_items: 400,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub cache_path: PathBuf,
    pub output_path: PathBuf,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub timezone: Tz,
    pub collage: CollageConfig,
    pub fetch: FetchConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok(), Utc::now())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// `now` is only consulted when no end date is given; it is converted to a
    /// calendar date once, in the configured timezone, so the whole run works
    /// against the same fixed range.
    pub fn from_lookup<F>(lookup: F, now: DateTime<Utc>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let timezone: Tz = parse_or(&lookup, "PODCAST_COLLAGE_TIMEZONE", "UTC")?;

        let start_date = match lookup("PODCAST_COLLAGE_START_DATE") {
            Some(value) => parse_date("PODCAST_COLLAGE_START_DATE", &value)?,
            None => return Err(ConfigError::Missing("PODCAST_COLLAGE_START_DATE")),
        };
        let end_date = match lookup("PODCAST_COLLAGE_END_DATE") {
            Some(value) => parse_date("PODCAST_COLLAGE_END_DATE", &value)?,
            None => now.with_timezone(&timezone).date_naive(),
        };
        if start_date > end_date {
            return Err(ConfigError::EmptyRange {
                start: start_date,
                end: end_date,
            });
        }

        let background = match lookup("PODCAST_COLLAGE_BACKGROUND") {
            Some(value) => parse_hex_color("PODCAST_COLLAGE_BACKGROUND", &value)?,
            None => CollageConfig::default().background,
        };

        let fetch_timeout: u64 = positive(&lookup, "PODCAST_COLLAGE_FETCH_TIMEOUT_SECS", "30")?;

        Ok(Config {
            db_path: lookup("PODCAST_COLLAGE_DB_PATH")
                .unwrap_or_else(|| "./podcastAddict.db".to_string())
                .into(),
            cache_path: lookup("PODCAST_COLLAGE_CACHE_PATH")
                .unwrap_or_else(|| "./data/images".to_string())
                .into(),
            output_path: lookup("PODCAST_COLLAGE_OUTPUT_PATH")
                .unwrap_or_else(|| "./data/collages".to_string())
                .into(),
            start_date,
            end_date,
            timezone,
            collage: CollageConfig {
                cell_size: positive(&lookup, "PODCAST_COLLAGE_CELL_SIZE", "250")?,
                background,
                max_items: positive(&lookup, "PODCAST_COLLAGE_MAX_ITEMS", "400")?,
            },
            fetch: FetchConfig {
                timeout: Duration::from_secs(fetch_timeout),
                attempts: positive(&lookup, "PODCAST_COLLAGE_FETCH_ATTEMPTS", "3")?,
                ..FetchConfig::default()
            },
        })
    }

    pub fn date_range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).unwrap_or_else(|| default.to_string());
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.clone(),
        reason: e.to_string(),
    })
}

fn positive<T, F>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let parsed: T = parse_or(lookup, key, default)?;
    if parsed == T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(parsed)
}

fn parse_date(key: &'static str, value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|e| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Parses `#rrggbb` (leading `#` optional).
fn parse_hex_color(key: &'static str, value: &str) -> Result<Rgb<u8>, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("expected a #rrggbb color"));
    }

    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16).map_err(|_| invalid("expected hex digits"))
    };
    Ok(Rgb([channel(0..2)?, channel(2..4)?, channel(4..6)?]))
}

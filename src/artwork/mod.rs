use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

use crate::episode::Episode;

pub mod cache;
pub mod fetcher;

pub use cache::{ArtworkCache, CacheError, CacheResult};
pub use fetcher::{fetch_with_retry, ArtworkFetcher, FetchError, HttpFetcher, RetryPolicy};

const MAX_STEM_CHARS: usize = 150;
/// Leaves room for the date prefix, the collision suffix and `.jpg.part`
/// within the usual 255-byte file name limit.
const MAX_STEM_BYTES: usize = 200;

/// Replaces characters that are unsafe in file names across platforms.
pub fn sanitize_file_component(name: &str) -> String {
    let mut replaced = String::new();
    for c in name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_STEM_CHARS)
    {
        if replaced.len() + c.len_utf8() > MAX_STEM_BYTES {
            break;
        }
        replaced.push(c);
    }

    let trimmed = replaced.trim().trim_end_matches('.').trim_end();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Identifies one cached artwork file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtworkKey {
    pub date: NaiveDate,
    pub stem: String,
}

impl ArtworkKey {
    pub fn new(date: NaiveDate, stem: String) -> Self {
        Self { date, stem }
    }

    pub fn file_name(&self) -> String {
        format!("{}.jpg", self)
    }
}

impl fmt::Display for ArtworkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.date.format("%Y-%m-%d"), self.stem)
    }
}

/// Assigns cache keys to the episodes of one date.
///
/// Episodes that sanitize to the same name but come from a different podcast
/// or point at different artwork get a short content-derived suffix. The same
/// episode played twice on one day maps to the same key.
pub fn assign_keys(date: NaiveDate, episodes: &[Episode]) -> Vec<ArtworkKey> {
    let mut claimed: HashMap<String, (&str, Option<&str>)> = HashMap::new();

    episodes
        .iter()
        .map(|episode| {
            let identity = (
                episode.podcast_name.as_str(),
                episode.artwork_url.as_deref(),
            );
            let base = sanitize_file_component(&episode.episode_name);

            let stem = match claimed.get(&base) {
                Some(owner) if *owner != identity => {
                    format!("{}-{}", base, disambiguator(episode))
                }
                _ => base,
            };
            claimed.entry(stem.clone()).or_insert(identity);

            ArtworkKey::new(date, stem)
        })
        .collect()
}

fn disambiguator(episode: &Episode) -> String {
    let mut hasher = Sha256::new();
    hasher.update(episode.podcast_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(episode.episode_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(episode.artwork_url.as_deref().unwrap_or_default().as_bytes());

    let digest = format!("{:x}", hasher.finalize());
    digest[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, 5).unwrap()
    }

    fn episode(name: &str, podcast: &str, artwork: &str) -> Episode {
        Episode {
            episode_name: name.to_string(),
            podcast_name: podcast.to_string(),
            playback_url: "https://cdn/ep.mp3".to_string(),
            date: date(),
            duration: Duration::minutes(1),
            artwork_url: Some(artwork.to_string()),
        }
    }

    #[test]
    fn test_sanitize_file_component() {
        assert_eq!(sanitize_file_component("Episode 12: A/B?"), "Episode 12_ A_B_");
        assert_eq!(sanitize_file_component("..\\..\\etc"), ".._.._etc");
        assert_eq!(sanitize_file_component("tabs\tand\nnewlines"), "tabs_and_newlines");
        assert_eq!(sanitize_file_component("trailing dots..."), "trailing dots");
        assert_eq!(sanitize_file_component("   "), "untitled");
        assert_eq!(sanitize_file_component(".."), "untitled");
        assert_eq!(sanitize_file_component("Café №5"), "Café №5");
        assert_eq!(
            sanitize_file_component(&"x".repeat(400)).chars().count(),
            MAX_STEM_CHARS
        );
    }

    #[test]
    fn test_sanitize_caps_multibyte_names_by_bytes() {
        let stem = sanitize_file_component(&"話".repeat(90));
        assert_eq!(stem.len(), 198);
        assert!(stem.chars().all(|c| c == '話'));

        let emoji = sanitize_file_component(&"🎙".repeat(100));
        assert_eq!(emoji.len(), 200);

        let key = ArtworkKey::new(date(), format!("{}-0123abcd", stem));
        assert!(format!("{}.part", key.file_name()).len() <= 255);
    }

    #[test]
    fn test_key_file_name() {
        let key = ArtworkKey::new(date(), "Pilot".to_string());
        assert_eq!(key.to_string(), "2024-08-05_Pilot");
        assert_eq!(key.file_name(), "2024-08-05_Pilot.jpg");
    }

    #[test]
    fn test_assign_keys_disambiguates_collisions() {
        let episodes = vec![
            episode("Intro", "Show A", "https://a/1.jpg"),
            episode("Intro", "Show B", "https://b/1.jpg"),
            episode("Intro?", "Show C", "https://c/1.jpg"),
            episode("Other", "Show A", "https://a/2.jpg"),
        ];

        let keys = assign_keys(date(), &episodes);

        assert_eq!(keys[0].stem, "Intro");
        assert!(keys[1].stem.starts_with("Intro-"));
        assert_eq!(keys[1].stem.len(), "Intro-".len() + 8);
        assert_eq!(keys[2].stem, "Intro_");
        assert_eq!(keys[3].stem, "Other");

        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn test_assign_keys_is_stable() {
        let episodes = vec![
            episode("Intro", "Show A", "https://a/1.jpg"),
            episode("Intro", "Show B", "https://b/1.jpg"),
        ];
        assert_eq!(assign_keys(date(), &episodes), assign_keys(date(), &episodes));
    }

    #[test]
    fn test_repeat_plays_share_a_key() {
        let episodes = vec![
            episode("Intro", "Show A", "https://a/1.jpg"),
            episode("Intro", "Show A", "https://a/1.jpg"),
        ];
        let keys = assign_keys(date(), &episodes);
        assert_eq!(keys[0], keys[1]);
    }
}

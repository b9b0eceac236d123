use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::episode::Episode;

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

pub type DateGroups = BTreeMap<NaiveDate, Vec<Episode>>;

/// Groups the episodes inside `range` by playback date.
///
/// Each group is ordered by episode name, then podcast name, so that collage
/// placement does not depend on the order the data source returned rows in.
pub fn group_by_date(episodes: &[Episode], range: DateRange) -> DateGroups {
    let mut groups = DateGroups::new();

    for episode in episodes.iter().filter(|e| range.contains(e.date)) {
        groups.entry(episode.date).or_default().push(episode.clone());
    }

    for group in groups.values_mut() {
        group.sort_by(|a, b| {
            a.episode_name
                .cmp(&b.episode_name)
                .then_with(|| a.podcast_name.cmp(&b.podcast_name))
        });
    }

    groups
}

/// Splits a group into episodes whose artwork can be downloaded and the rest.
pub fn partition_fetchable(group: Vec<Episode>) -> (Vec<Episode>, Vec<Episode>) {
    group.into_iter().partition(Episode::has_fetchable_artwork)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, day).unwrap()
    }

    fn episode(name: &str, day: u32, artwork: Option<&str>) -> Episode {
        Episode {
            episode_name: name.to_string(),
            podcast_name: "Show".to_string(),
            playback_url: format!("https://cdn/{}.mp3", name),
            date: date(day),
            duration: Duration::minutes(30),
            artwork_url: artwork.map(str::to_string),
        }
    }

    #[test]
    fn test_range_is_inclusive() {
        let range = DateRange::new(date(2), date(4));
        assert!(!range.contains(date(1)));
        assert!(range.contains(date(2)));
        assert!(range.contains(date(4)));
        assert!(!range.contains(date(5)));
    }

    #[test]
    fn test_group_by_date() {
        let episodes = vec![
            episode("c", 5, Some("https://a/c.jpg")),
            episode("a", 5, Some("https://a/a.jpg")),
            episode("early", 1, Some("https://a/x.jpg")),
            episode("b", 6, None),
            episode("late", 9, Some("https://a/y.jpg")),
        ];

        let groups = group_by_date(&episodes, DateRange::new(date(5), date(8)));

        assert_eq!(groups.keys().copied().collect::<Vec<_>>(), vec![date(5), date(6)]);
        let names: Vec<_> = groups[&date(5)]
            .iter()
            .map(|e| e.episode_name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(groups[&date(6)].len(), 1);
    }

    #[test]
    fn test_ties_broken_by_podcast_name() {
        let mut from_z = episode("Same", 5, None);
        from_z.podcast_name = "Zed".to_string();
        let mut from_a = episode("Same", 5, None);
        from_a.podcast_name = "Alpha".to_string();

        let groups = group_by_date(&[from_z, from_a], DateRange::new(date(1), date(31)));
        let podcasts: Vec<_> = groups[&date(5)]
            .iter()
            .map(|e| e.podcast_name.as_str())
            .collect();
        assert_eq!(podcasts, vec!["Alpha", "Zed"]);
    }

    #[test]
    fn test_grouping_is_idempotent() {
        let episodes = vec![
            episode("b", 5, Some("https://a/b.jpg")),
            episode("a", 5, Some("https://a/a.jpg")),
            episode("z", 7, None),
        ];
        let range = DateRange::new(date(1), date(31));

        assert_eq!(group_by_date(&episodes, range), group_by_date(&episodes, range));
    }

    #[test]
    fn test_partition_fetchable() {
        let group = vec![
            episode("ok", 5, Some("https://a/ok.jpg")),
            episode("none", 5, None),
            episode("ftp", 5, Some("ftp://x")),
            episode("plain", 5, Some("http://a/plain.png")),
        ];

        let (fetchable, rejected) = partition_fetchable(group);
        let names = |v: &[Episode]| v.iter().map(|e| e.episode_name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&fetchable), vec!["ok", "plain"]);
        assert_eq!(names(&rejected), vec!["none", "ftp"]);
    }
}

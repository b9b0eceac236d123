use log::{debug, info};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::fetcher::{fetch_with_retry, ArtworkFetcher, FetchError, RetryPolicy};
use super::ArtworkKey;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("{0}")]
    Fetch(#[from] FetchError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// On-disk store of downloaded artwork, one file per [`ArtworkKey`].
///
/// Files left over from earlier runs are never trusted: each key is fetched
/// once per cache instance and overwritten on disk.
pub struct ArtworkCache<F> {
    cache_dir: PathBuf,
    fetcher: F,
    retry: RetryPolicy,
    fetched: Mutex<HashSet<ArtworkKey>>,
}

impl<F: ArtworkFetcher> ArtworkCache<F> {
    pub fn new(cache_dir: PathBuf, fetcher: F, retry: RetryPolicy) -> CacheResult<Self> {
        fs::create_dir_all(&cache_dir)?;
        info!("Artwork cache: {}", cache_dir.display());

        Ok(Self {
            cache_dir,
            fetcher,
            retry,
            fetched: Mutex::new(HashSet::new()),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn get_cache_path(&self, key: &ArtworkKey) -> PathBuf {
        self.cache_dir.join(key.file_name())
    }

    /// Returns the local path of the artwork for `key`, downloading it from
    /// `url` unless this cache already fetched it. The body is stored verbatim.
    pub fn ensure_cached(&self, key: &ArtworkKey, url: &str) -> CacheResult<PathBuf> {
        let cache_path = self.get_cache_path(key);

        if self.was_fetched(key) && cache_path.is_file() {
            debug!("Cache hit for {}", key);
            return Ok(cache_path);
        }

        debug!("Fetching {} for {}", url, key);
        let bytes = fetch_with_retry(&self.fetcher, url, &self.retry)?;
        write_atomically(&cache_path, &bytes)?;
        self.fetched
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.clone());

        debug!("Saved artwork to cache: {:?}", cache_path);
        Ok(cache_path)
    }

    fn was_fetched(&self, key: &ArtworkKey) -> bool {
        self.fetched
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(key)
    }
}

/// Writes to a sibling temp file and renames it over `path`, so readers never
/// observe a partially written file.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let temp_path = partial_path(path);

    if let Err(e) = fs::write(&temp_path, bytes).and_then(|_| fs::rename(&temp_path, path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(())
}

pub(crate) fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

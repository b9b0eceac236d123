use log::{debug, warn};
use std::thread;
use std::time::Duration;

use crate::config::FetchConfig;

/// Upper bound on a single artwork download.
const MAX_ARTWORK_BYTES: u64 = 20 * 1024 * 1024;
const MAX_BACKOFF: Duration = Duration::from_secs(8);

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("Timed out fetching {0}")]
    Timeout(String),
    #[error("Artwork at {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: u64 },
    #[error("Failed to fetch {url}: {reason}")]
    Transport { url: String, reason: String },
    #[error("Gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => matches!(status, 408 | 429 | 500..=599),
            FetchError::Timeout(_) | FetchError::Transport { .. } => true,
            FetchError::TooLarge { .. } | FetchError::Exhausted { .. } => false,
        }
    }

    fn from_ureq(url: &str, error: ureq::Error) -> Self {
        match error {
            ureq::Error::StatusCode(status) => FetchError::Status {
                url: url.to_string(),
                status,
            },
            ureq::Error::Timeout(_) => FetchError::Timeout(url.to_string()),
            ureq::Error::BodyExceedsLimit(limit) => FetchError::TooLarge {
                url: url.to_string(),
                limit,
            },
            other => FetchError::Transport {
                url: url.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Retrieves raw artwork bytes for a URL.
pub trait ArtworkFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP fetcher with a global per-request timeout.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self { agent }
    }
}

impl ArtworkFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| FetchError::from_ureq(url, e))?;

        response
            .body_mut()
            .with_config()
            .limit(MAX_ARTWORK_BYTES)
            .read_to_vec()
            .map_err(|e| FetchError::from_ureq(url, e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Exponential backoff after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(6);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            base_delay: config.backoff,
        }
    }
}

/// Runs `fetcher` until it succeeds, fails permanently, or the policy's
/// attempts are used up.
pub fn fetch_with_retry<F>(
    fetcher: &F,
    url: &str,
    policy: &RetryPolicy,
) -> Result<Vec<u8>, FetchError>
where
    F: ArtworkFetcher + ?Sized,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match fetcher.fetch(url) {
            Ok(bytes) => {
                debug!("Fetched {} bytes from {}", bytes.len(), url);
                return Ok(bytes);
            }
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt >= attempts => {
                return Err(FetchError::Exhausted {
                    url: url.to_string(),
                    attempts,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                    attempt, attempts, url, e, delay
                );
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

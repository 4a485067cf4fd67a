//! Configuration for the lookup client, mirror fetches and the queue

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DownloadError, Result};
use crate::retry::{RetryPolicy, env_parse};

/// Default metadata lookup endpoint (osu! API v2)
pub const DEFAULT_LOOKUP_URL: &str = "https://osu.ppy.sh/api/v2/beatmaps/lookup";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderConfig {
    /// Metadata lookup endpoint, queried with `?checksum=`
    pub lookup_url: String,

    /// Directory archives are written to
    pub download_dir: PathBuf,

    /// Workers per task
    pub concurrency: usize,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Request timeout, covers the archive body
    pub request_timeout: Duration,

    /// Pause after each processed item
    pub item_delay: Duration,

    pub user_agent: String,

    /// Retry policy for metadata lookups
    pub retry_policy: RetryPolicy,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            lookup_url: DEFAULT_LOOKUP_URL.to_string(),
            download_dir: PathBuf::from("downloads"),
            concurrency: 3,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            item_delay: Duration::from_millis(50),
            user_agent: concat!("osu-stuff/", env!("CARGO_PKG_VERSION")).to_string(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl DownloaderConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            lookup_url: std::env::var("OSU_STUFF_LOOKUP_URL").unwrap_or(defaults.lookup_url),
            download_dir: std::env::var("OSU_STUFF_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            concurrency: env_parse("OSU_STUFF_CONCURRENCY").unwrap_or(defaults.concurrency),
            connect_timeout: env_parse("OSU_STUFF_CONNECT_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            request_timeout: env_parse("OSU_STUFF_REQUEST_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            item_delay: env_parse("OSU_STUFF_ITEM_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.item_delay),
            user_agent: std::env::var("OSU_STUFF_USER_AGENT").unwrap_or(defaults.user_agent),
            retry_policy: RetryPolicy::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the downloader cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(DownloadError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        url::Url::parse(&self.lookup_url)
            .map_err(|e| DownloadError::InvalidUrl(format!("{}: {e}", self.lookup_url)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DownloaderConfig::default();
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.item_delay, Duration::from_millis(50));
        assert!(config.user_agent.starts_with("osu-stuff/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let config = DownloaderConfig {
            concurrency: 0,
            ..DownloaderConfig::default()
        };
        assert!(matches!(config.validate(), Err(DownloadError::Config(_))));

        let config = DownloaderConfig {
            lookup_url: "not a url".to_string(),
            ..DownloaderConfig::default()
        };
        assert!(matches!(config.validate(), Err(DownloadError::InvalidUrl(_))));
    }
}

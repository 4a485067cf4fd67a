//! HTTP client construction shared by the lookup client and mirror fetches

use std::time::Duration;

use reqwest::{Client, ClientBuilder};

use crate::config::DownloaderConfig;
use crate::error::Result;

/// Build the HTTP client used for lookups and archive downloads
pub fn build_client(config: &DownloaderConfig) -> Result<Client> {
    ClientBuilder::new()
        // A task keeps hitting the same few hosts
        .pool_idle_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(config.concurrency.max(1))
        .timeout(config.request_timeout)
        .connect_timeout(config.connect_timeout)
        .tcp_nodelay(true)
        .tcp_keepalive(Duration::from_secs(60))
        .use_rustls_tls()
        .gzip(true)
        .deflate(true)
        // Mirrors commonly redirect to a storage host
        .redirect(reqwest::redirect::Policy::limited(3))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(Into::into)
}

//! Mirror endpoints with failure-driven reordering
//!
//! Mirrors are tried in list order. An endpoint answering with a status
//! from [`BAD_STATUSES`] is moved to the back of the list, so mirrors
//! that keep failing sink over time. The list is shared by every worker
//! of a task and every later task.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DownloadError, Result};

/// Statuses that demote the answering mirror
pub const BAD_STATUSES: [u16; 9] = [204, 401, 403, 408, 410, 429, 500, 503, 504];

/// Check whether a response status demotes its mirror
pub fn is_bad_status(status: StatusCode) -> bool {
    BAD_STATUSES.contains(&status.as_u16())
}

/// A download mirror serving archives by numeric id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MirrorEndpoint {
    pub name: String,
    /// Prefix the content id is appended to
    pub base_url: String,
}

impl MirrorEndpoint {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
        }
    }

    /// Archive URL for a content id
    pub fn url_for(&self, content_id: i32) -> String {
        format!("{}{content_id}", self.base_url)
    }
}

impl fmt::Display for MirrorEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.base_url)
    }
}

/// Source of archive bytes by content id
#[async_trait]
pub trait MirrorFetch: Send + Sync {
    /// Fetch the archive for `content_id` from the first mirror that has it
    async fn fetch(&self, content_id: i32) -> Result<Bytes>;

    /// Replace the mirror list
    fn set_mirrors(&self, mirrors: Vec<MirrorEndpoint>);

    /// Whether at least one mirror is configured
    fn has_mirrors(&self) -> bool;
}

/// Ordered mirror list backed by an HTTP client
pub struct MirrorResolver {
    client: Client,
    mirrors: Mutex<Vec<MirrorEndpoint>>,
}

impl MirrorResolver {
    pub fn new(client: Client) -> Self {
        Self::with_mirrors(client, Vec::new())
    }

    pub fn with_mirrors(client: Client, mirrors: Vec<MirrorEndpoint>) -> Self {
        Self {
            client,
            mirrors: Mutex::new(mirrors),
        }
    }

    /// Snapshot of the current order
    pub fn mirrors(&self) -> Vec<MirrorEndpoint> {
        self.mirrors.lock().clone()
    }

    /// Move `endpoint` to the end of the list
    ///
    /// Returns false when the endpoint is no longer in the list.
    pub fn demote(&self, endpoint: &MirrorEndpoint) -> bool {
        let mut mirrors = self.mirrors.lock();
        let Some(position) = mirrors.iter().position(|m| m == endpoint) else {
            return false;
        };
        let demoted = mirrors.remove(position);
        mirrors.push(demoted);
        true
    }

    async fn try_mirror(&self, mirror: &MirrorEndpoint, content_id: i32) -> Attempt {
        let url = mirror.url_for(content_id);
        debug!("Fetching {} from {}", content_id, url);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Mirror {} request failed: {}", mirror.name, e);
                return Attempt::Miss;
            }
        };

        let status = response.status();
        if status == StatusCode::OK {
            return match response.bytes().await {
                Ok(body) if !body.is_empty() => Attempt::Found(body),
                Ok(_) => {
                    debug!("Mirror {} returned an empty body for {}", mirror.name, content_id);
                    Attempt::Miss
                }
                Err(e) => {
                    debug!("Mirror {} body read failed: {}", mirror.name, e);
                    Attempt::Miss
                }
            };
        }

        if is_bad_status(status) {
            Attempt::Bad(status)
        } else {
            debug!("Mirror {} answered {} for {}", mirror.name, status, content_id);
            Attempt::Miss
        }
    }
}

enum Attempt {
    Found(Bytes),
    Bad(StatusCode),
    Miss,
}

#[async_trait]
impl MirrorFetch for MirrorResolver {
    async fn fetch(&self, content_id: i32) -> Result<Bytes> {
        // Iterate a snapshot so the lock is never held across a request
        let snapshot = self.mirrors();
        if snapshot.is_empty() {
            return Err(DownloadError::NoMirrors);
        }

        for mirror in &snapshot {
            match self.try_mirror(mirror, content_id).await {
                Attempt::Found(body) => {
                    info!(
                        "Downloaded {} ({} bytes) from {}",
                        content_id,
                        body.len(),
                        mirror.name
                    );
                    return Ok(body);
                }
                Attempt::Bad(status) => {
                    warn!("Demoting mirror {} after status {}", mirror.name, status);
                    self.demote(mirror);
                }
                Attempt::Miss => {}
            }
        }

        Err(DownloadError::MirrorExhausted { content_id })
    }

    fn set_mirrors(&self, mirrors: Vec<MirrorEndpoint>) {
        *self.mirrors.lock() = mirrors;
    }

    fn has_mirrors(&self) -> bool {
        !self.mirrors.lock().is_empty()
    }
}

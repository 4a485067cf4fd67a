//! Beatmap downloads for osu! stable libraries
//!
#![allow(clippy::doc_markdown)] // osu! names don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::return_self_not_must_use)] // Builder patterns
#![allow(clippy::significant_drop_tightening)] // Short lock scopes are intentional
//! Resolves beatmap checksums to beatmapset ids, fetches archives from an
//! ordered list of mirrors and writes them to a download directory. Newly
//! downloaded beatmaps are added to a shared catalog so it can be written
//! back to `osu!.db`.
//!
//! - [`MirrorResolver`] tries mirrors in order and demotes the ones that
//!   answer with a failure status
//! - [`LookupClient`] calls the osu! API `beatmaps/lookup` endpoint
//! - [`Downloader`] queues tasks and runs each with a bounded worker pool
//!
//! ```no_run
//! use osu_stuff_download::{DownloadTask, Downloader, DownloaderConfig, MirrorEndpoint, WorkItem};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (downloader, mut events) = Downloader::builder(DownloaderConfig::from_env()?)
//!     .mirrors(vec![MirrorEndpoint::new("nerinyan", "https://api.nerinyan.moe/d/")])
//!     .credential("token")
//!     .build()?;
//!
//! downloader.submit_download(DownloadTask::new("favourites", [WorkItem::ContentId(1)]))?;
//! let worker = downloader.spawn();
//!
//! while let Some(event) = events.recv().await {
//!     if event.is_end() {
//!         break;
//!     }
//! }
//! downloader.shutdown();
//! worker.await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod lookup;
/// Mirror list and archive fetches
pub mod mirror;
pub mod orchestrator;
pub mod retry;
pub mod task;
/// Shared HTTP client setup
pub mod transport;

pub use config::{DEFAULT_LOOKUP_URL, DownloaderConfig};
pub use error::{DownloadError, Result};
pub use events::DownloadEvent;
pub use lookup::{BeatmapLookup, BeatmapMetadata, BeatmapsetMetadata, LookupClient};
pub use mirror::{BAD_STATUSES, MirrorEndpoint, MirrorFetch, MirrorResolver, is_bad_status};
pub use orchestrator::{Downloader, DownloaderBuilder, EventReceiver};
pub use retry::RetryPolicy;
pub use task::{DownloadTask, ItemOutcome, ItemStatus, QueueEntry, TaskStatus, WorkItem};

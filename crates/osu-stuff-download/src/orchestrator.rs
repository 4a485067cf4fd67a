//! Download queue and the bounded worker pool that drives a task
//!
//! One task is active at a time. Its items are claimed through a shared
//! index by up to `concurrency` workers; each worker checks that its task
//! is still the active one before every claim, which is how a stop takes
//! effect. Tasks submitted meanwhile wait in FIFO order.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use osu_stuff_formats::SharedCatalog;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Notify, OnceCell, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::config::DownloaderConfig;
use crate::error::{DownloadError, Result};
use crate::events::DownloadEvent;
use crate::lookup::{BeatmapLookup, BeatmapMetadata, LookupClient};
use crate::mirror::{MirrorEndpoint, MirrorFetch, MirrorResolver};
use crate::task::{DownloadTask, ItemOutcome, ItemStatus, QueueEntry, TaskStatus, WorkItem};
use crate::transport::build_client;

/// Receiving half of the event stream
pub type EventReceiver = mpsc::UnboundedReceiver<DownloadEvent>;

/// Archive written for a content id, `None` when it was already on disk
type FetchResult = std::result::Result<Option<PathBuf>, String>;

/// Builder for [`Downloader`]
pub struct DownloaderBuilder {
    config: DownloaderConfig,
    lookup: Option<Arc<dyn BeatmapLookup>>,
    mirrors: Option<Arc<dyn MirrorFetch>>,
    mirror_list: Vec<MirrorEndpoint>,
    credential: Option<String>,
    catalog: Option<SharedCatalog>,
}

impl DownloaderBuilder {
    pub fn new(config: DownloaderConfig) -> Self {
        Self {
            config,
            lookup: None,
            mirrors: None,
            mirror_list: Vec::new(),
            credential: None,
            catalog: None,
        }
    }

    /// Use a custom lookup backend instead of the HTTP client
    pub fn lookup(mut self, lookup: Arc<dyn BeatmapLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Use a custom mirror backend instead of the HTTP resolver
    pub fn mirror_fetch(mut self, mirrors: Arc<dyn MirrorFetch>) -> Self {
        self.mirrors = Some(mirrors);
        self
    }

    pub fn mirrors(mut self, mirrors: Vec<MirrorEndpoint>) -> Self {
        self.mirror_list = mirrors;
        self
    }

    pub fn credential(mut self, token: impl Into<String>) -> Self {
        self.credential = Some(token.into());
        self
    }

    /// Catalog that receives records for downloaded beatmaps
    pub fn catalog(mut self, catalog: SharedCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn build(self) -> Result<(Downloader, EventReceiver)> {
        self.config.validate()?;

        // One client, and its connection pool, for both HTTP backends
        let client = match (&self.lookup, &self.mirrors) {
            (Some(_), Some(_)) => None,
            _ => Some(build_client(&self.config)?),
        };

        let lookup: Arc<dyn BeatmapLookup> = match self.lookup {
            Some(lookup) => lookup,
            None => Arc::new(LookupClient::new(
                client.clone().unwrap_or_default(),
                &self.config.lookup_url,
            )?),
        };
        let mirrors: Arc<dyn MirrorFetch> = match self.mirrors {
            Some(mirrors) => mirrors,
            None => Arc::new(MirrorResolver::new(client.unwrap_or_default())),
        };

        if !self.mirror_list.is_empty() {
            mirrors.set_mirrors(self.mirror_list);
        }
        if self.credential.is_some() {
            lookup.set_credential(self.credential);
        }

        let (events, receiver) = mpsc::unbounded_channel();
        let download_dir = self.config.download_dir.clone();
        let inner = Inner {
            config: self.config,
            lookup,
            mirrors,
            catalog: self.catalog,
            download_dir: RwLock::new(download_dir),
            queue: Mutex::new(QueueState::default()),
            lookup_cache: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            events,
            wake: Notify::new(),
            shutdown: AtomicBool::new(false),
        };

        Ok((
            Downloader {
                inner: Arc::new(inner),
            },
            receiver,
        ))
    }
}

/// Queued and active tasks
#[derive(Default)]
struct QueueState {
    waiting: VecDeque<DownloadTask>,
    active: Option<ActiveTask>,
}

struct ActiveTask {
    id: String,
    name: String,
    total: usize,
    completed: usize,
    cancelled: bool,
}

/// State shared by the workers of one task
struct TaskProgress {
    next: AtomicUsize,
    stop: AtomicBool,
    completed: Mutex<usize>,
}

struct Inner {
    config: DownloaderConfig,
    lookup: Arc<dyn BeatmapLookup>,
    mirrors: Arc<dyn MirrorFetch>,
    catalog: Option<SharedCatalog>,
    download_dir: RwLock<PathBuf>,
    queue: Mutex<QueueState>,
    lookup_cache: Mutex<HashMap<String, BeatmapMetadata>>,
    /// One fetch per content id; difficulties of a set share it
    in_flight: Mutex<HashMap<i32, Arc<OnceCell<FetchResult>>>>,
    events: mpsc::UnboundedSender<DownloadEvent>,
    wake: Notify,
    shutdown: AtomicBool,
}

/// Handle to the download queue, cheap to clone
#[derive(Clone)]
pub struct Downloader {
    inner: Arc<Inner>,
}

impl Downloader {
    pub fn builder(config: DownloaderConfig) -> DownloaderBuilder {
        DownloaderBuilder::new(config)
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.inner.config
    }

    /// Queue a task; it starts once every earlier task is done
    pub fn submit_download(&self, task: DownloadTask) -> Result<()> {
        if !self.inner.mirrors.has_mirrors() {
            return Err(DownloadError::NoMirrors);
        }

        {
            let mut queue = self.inner.queue.lock();
            let duplicate = queue.active.as_ref().is_some_and(|a| a.id == task.id)
                || queue.waiting.iter().any(|t| t.id == task.id);
            if duplicate {
                return Err(DownloadError::DuplicateTask(task.id));
            }

            info!("Queued task {} ({} items)", task.id, task.items.len());
            self.emit(DownloadEvent::DownloadCreate {
                task_id: task.id.clone(),
                name: task.name.clone(),
            });
            queue.waiting.push_back(task);
        }

        self.inner.wake.notify_one();
        Ok(())
    }

    /// Stop the active task at the next claim boundary
    ///
    /// Returns false when `task_id` is not the active task.
    pub fn stop_download(&self, task_id: &str) -> bool {
        let mut queue = self.inner.queue.lock();
        match queue.active.as_mut() {
            Some(active) if active.id == task_id && !active.cancelled => {
                info!("Stopping task {}", task_id);
                active.cancelled = true;
                true
            }
            _ => false,
        }
    }

    /// Drop a waiting task, or stop it if it is the active one
    pub fn remove_download(&self, task_id: &str) -> bool {
        let removed = {
            let mut queue = self.inner.queue.lock();
            queue
                .waiting
                .iter()
                .position(|t| t.id == task_id)
                .and_then(|position| queue.waiting.remove(position))
        };

        match removed {
            Some(task) => {
                info!("Removed waiting task {}", task.id);
                self.emit(DownloadEvent::ProgressEnd {
                    task_id: task.id,
                    name: task.name,
                    success: false,
                });
                true
            }
            None => self.stop_download(task_id),
        }
    }

    /// Snapshot of the active task followed by the waiting ones
    pub fn get_queue(&self) -> Vec<QueueEntry> {
        let queue = self.inner.queue.lock();
        let active = queue.active.iter().map(|a| QueueEntry {
            id: a.id.clone(),
            name: a.name.clone(),
            status: if a.cancelled {
                TaskStatus::Cancelled
            } else {
                TaskStatus::InProgress
            },
            completed: a.completed,
            total: a.total,
        });
        let waiting = queue.waiting.iter().map(|t| QueueEntry {
            id: t.id.clone(),
            name: t.name.clone(),
            status: TaskStatus::Waiting,
            completed: 0,
            total: t.items.len(),
        });
        active.chain(waiting).collect()
    }

    pub fn set_credential(&self, token: Option<String>) {
        self.inner.lookup.set_credential(token);
    }

    pub fn set_mirrors(&self, mirrors: Vec<MirrorEndpoint>) {
        info!("Using {} mirrors", mirrors.len());
        self.inner.mirrors.set_mirrors(mirrors);
    }

    pub fn set_download_directory(&self, path: impl Into<PathBuf>) {
        *self.inner.download_dir.write() = path.into();
    }

    pub fn download_directory(&self) -> PathBuf {
        self.inner.download_dir.read().clone()
    }

    /// Archive path for a content id
    pub fn archive_path(&self, content_id: i32) -> PathBuf {
        self.inner
            .download_dir
            .read()
            .join(format!("{content_id}.osz"))
    }

    /// Process one item outside the queue, without events
    pub async fn download_single(&self, item: WorkItem) -> ItemStatus {
        let outcome = self.process_item(&item).await;
        ItemStatus {
            index: 0,
            item,
            outcome,
        }
    }

    /// Run queued tasks until [`Downloader::shutdown`] is called
    pub async fn run(&self) {
        while !self.inner.shutdown.load(Ordering::Acquire) {
            match self.start_next() {
                Some(task) => {
                    self.run_task(task).await;
                }
                None => self.inner.wake.notified().await,
            }
        }
        debug!("Download loop stopped");
    }

    /// Run queued tasks until the queue is empty
    pub async fn run_until_idle(&self) {
        while let Some(task) = self.start_next() {
            self.run_task(task).await;
        }
    }

    /// Run the queue loop on the current runtime
    pub fn spawn(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run().await })
    }

    /// Stop the active task and end the queue loop
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        if let Some(active) = self.inner.queue.lock().active.as_mut() {
            active.cancelled = true;
        }
        self.inner.wake.notify_one();
    }

    fn start_next(&self) -> Option<DownloadTask> {
        let mut queue = self.inner.queue.lock();
        if queue.active.is_some() {
            return None;
        }
        let task = queue.waiting.pop_front()?;
        queue.active = Some(ActiveTask {
            id: task.id.clone(),
            name: task.name.clone(),
            total: task.items.len(),
            completed: 0,
            cancelled: false,
        });
        Some(task)
    }

    fn is_active(&self, task_id: &str) -> bool {
        self.inner
            .queue
            .lock()
            .active
            .as_ref()
            .is_some_and(|a| a.id == task_id && !a.cancelled)
    }

    /// Drive one task to completion and report whether it ran to the end
    async fn run_task(&self, task: DownloadTask) -> bool {
        let task = Arc::new(task);
        let total = task.items.len();
        let workers = self.inner.config.concurrency.max(1).min(total);
        let progress = Arc::new(TaskProgress {
            next: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
            completed: Mutex::new(0),
        });

        info!(
            "Starting task {} ({} items, {} workers)",
            task.id, total, workers
        );

        let mut set = JoinSet::new();
        for _ in 0..workers {
            let this = self.clone();
            let task = Arc::clone(&task);
            let progress = Arc::clone(&progress);
            set.spawn(async move { this.work(&task, &progress).await });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                warn!("Worker for task {} ended abnormally: {}", task.id, e);
                progress.stop.store(true, Ordering::Release);
            }
        }

        let completed = *progress.completed.lock();
        self.finish_task(&task, &progress, completed)
    }

    /// Retire the active task and emit its single end event
    fn finish_task(&self, task: &DownloadTask, progress: &TaskProgress, completed: usize) -> bool {
        let total = task.items.len();
        // A stop accepted up to this point still counts
        let cancelled = self
            .inner
            .queue
            .lock()
            .active
            .take()
            .is_some_and(|active| active.cancelled);
        let success = !progress.stop.load(Ordering::Acquire) && !cancelled;

        if success {
            info!("Task {} finished ({}/{})", task.id, completed, total);
        } else {
            info!("Task {} stopped ({}/{})", task.id, completed, total);
        }
        self.emit(DownloadEvent::ProgressEnd {
            task_id: task.id.clone(),
            name: task.name.clone(),
            success,
        });
        success
    }

    async fn work(&self, task: &DownloadTask, progress: &TaskProgress) {
        let total = task.items.len();
        loop {
            if progress.stop.load(Ordering::Acquire) {
                return;
            }
            if !self.is_active(&task.id) {
                debug!("Task {} is no longer active", task.id);
                progress.stop.store(true, Ordering::Release);
                return;
            }

            let index = progress.next.fetch_add(1, Ordering::AcqRel);
            let Some(item) = task.items.get(index) else {
                return;
            };

            let outcome = self.process_item(item).await;
            let status = ItemStatus {
                index,
                item: item.clone(),
                outcome,
            };
            self.report(task, total, progress, status);

            if !self.inner.config.item_delay.is_zero() {
                tokio::time::sleep(self.inner.config.item_delay).await;
            }
        }
    }

    /// Count a finished item and emit its progress event
    fn report(&self, task: &DownloadTask, total: usize, progress: &TaskProgress, item: ItemStatus) {
        // Counting and sending under one lock keeps `completed` ordered
        let mut completed = progress.completed.lock();
        *completed += 1;

        if let Some(active) = self.inner.queue.lock().active.as_mut() {
            if active.id == task.id {
                active.completed = *completed;
            }
        }

        self.emit(DownloadEvent::ProgressUpdate {
            task_id: task.id.clone(),
            completed: *completed,
            total,
            item,
        });
    }

    async fn process_item(&self, item: &WorkItem) -> ItemOutcome {
        if let Some(content_id) = item.checksum().and_then(|c| self.catalog_content_id(c)) {
            debug!("{} is already in the catalog", item);
            return ItemOutcome::Skipped { content_id };
        }

        let (content_id, metadata) = match self.resolve(item).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("{}", e);
                return ItemOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let cell = Arc::clone(self.inner.in_flight.lock().entry(content_id).or_default());
        let mut fetched_here = false;
        let flag = &mut fetched_here;
        let result = cell
            .get_or_init(|| async move {
                *flag = true;
                self.fetch_archive(item, content_id).await
            })
            .await
            .clone();
        if fetched_here {
            self.inner.in_flight.lock().remove(&content_id);
        }

        let archive = match result {
            Ok(archive) => archive,
            Err(reason) => return ItemOutcome::Failed { reason },
        };
        // The set is on disk either way, so this difficulty joins the catalog
        if let Some(metadata) = metadata {
            self.record_download(item, &metadata);
        }
        match archive {
            Some(path) if fetched_here => ItemOutcome::Downloaded { content_id, path },
            Some(_) => {
                debug!("{} was fetched for another item", content_id);
                ItemOutcome::Skipped { content_id }
            }
            None => ItemOutcome::Skipped { content_id },
        }
    }

    /// Fetch and save one archive unless it is already on disk
    async fn fetch_archive(&self, item: &WorkItem, content_id: i32) -> FetchResult {
        if self.archive_exists(content_id).await {
            debug!("{} already downloaded", content_id);
            return Ok(None);
        }

        let body = self.inner.mirrors.fetch(content_id).await.map_err(|e| {
            warn!("{}: {}", item, e);
            e.to_string()
        })?;

        let path = self.archive_path(content_id);
        write_archive(&path, &body).await.map_err(|e| {
            warn!("{}", e);
            e.to_string()
        })?;
        Ok(Some(path))
    }

    /// Find the content id of an item, looking it up when needed
    async fn resolve(&self, item: &WorkItem) -> Result<(i32, Option<BeatmapMetadata>)> {
        let checksum = match item {
            WorkItem::ContentId(id) => return Ok((*id, None)),
            WorkItem::Checksum(checksum) => checksum.as_str(),
        };

        if let Some(metadata) = self.inner.lookup_cache.lock().get(checksum).cloned() {
            return Ok((metadata.beatmapset_id, Some(metadata)));
        }

        let lookup = &self.inner.lookup;
        let metadata = self
            .inner
            .config
            .retry_policy
            .execute(move || lookup.lookup(checksum))
            .await
            .map_err(|e| match e {
                DownloadError::LookupFailed { .. } => e,
                other => DownloadError::lookup_failed(checksum, other.to_string()),
            })?;

        self.inner
            .lookup_cache
            .lock()
            .insert(checksum.to_string(), metadata.clone());
        Ok((metadata.beatmapset_id, Some(metadata)))
    }

    fn catalog_content_id(&self, checksum: &str) -> Option<i32> {
        let catalog = self.inner.catalog.as_ref()?;
        catalog.read().get(checksum).map(|record| record.beatmapset_id)
    }

    /// An archive or an extracted folder for the id counts as downloaded
    async fn archive_exists(&self, content_id: i32) -> bool {
        let archive = self.archive_path(content_id);
        let folder = self.download_directory().join(content_id.to_string());
        tokio::fs::try_exists(&archive).await.unwrap_or(false)
            || tokio::fs::metadata(&folder)
                .await
                .is_ok_and(|m| m.is_dir())
    }

    fn record_download(&self, item: &WorkItem, metadata: &BeatmapMetadata) {
        let Some(catalog) = &self.inner.catalog else {
            return;
        };
        let mut record = metadata.to_record();
        if record.checksum.is_none() {
            record.checksum = item.checksum().map(str::to_string);
        }
        debug!("Adding {} to the catalog", record.checksum_str());
        catalog.write().insert(record);
    }

    fn emit(&self, event: DownloadEvent) {
        if self.inner.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

/// Write through a sibling `.part` file so a partial archive never counts
/// as downloaded
async fn write_archive(path: &Path, body: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::write_failed(parent, e))?;
    }
    let partial = path.with_extension("osz.part");
    tokio::fs::write(&partial, body)
        .await
        .map_err(|e| DownloadError::write_failed(&partial, e))?;
    tokio::fs::rename(&partial, path)
        .await
        .map_err(|e| DownloadError::write_failed(path, e))
}

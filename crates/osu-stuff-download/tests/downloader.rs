//! Queue and worker pool behaviour with in-process and mock HTTP backends

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use osu_stuff_download::{
    BeatmapLookup, BeatmapMetadata, DownloadError, DownloadEvent, DownloadTask, Downloader,
    DownloaderConfig, EventReceiver, ItemOutcome, MirrorEndpoint, MirrorFetch, RetryPolicy,
    TaskStatus, WorkItem,
};
use osu_stuff_formats::{BeatmapRecord, CatalogFile, SharedCatalog};
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHECKSUM: &str = "a5b99395a42bd55bc5eb1d2411cbdf8b";

/// Mirror that serves the same bytes for every id
struct StaticMirror {
    body: Bytes,
    delay: Duration,
    calls: AtomicUsize,
}

impl StaticMirror {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            body: Bytes::from_static(b"PK\x03\x04archive"),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MirrorFetch for StaticMirror {
    async fn fetch(&self, _content_id: i32) -> osu_stuff_download::Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.body.clone())
    }

    fn set_mirrors(&self, _mirrors: Vec<MirrorEndpoint>) {}

    fn has_mirrors(&self) -> bool {
        true
    }
}

/// Lookup that knows a fixed set of checksums
struct TableLookup {
    known: Vec<(String, i32)>,
    calls: AtomicUsize,
}

impl TableLookup {
    fn new(known: &[(&str, i32)]) -> Arc<Self> {
        Arc::new(Self {
            known: known.iter().map(|(c, id)| ((*c).to_string(), *id)).collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl BeatmapLookup for TableLookup {
    async fn lookup(&self, checksum: &str) -> osu_stuff_download::Result<BeatmapMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.known
            .iter()
            .find(|(c, _)| c == checksum)
            .map(|(c, id)| BeatmapMetadata {
                id: id * 10,
                beatmapset_id: *id,
                checksum: Some(c.clone()),
                ..BeatmapMetadata::default()
            })
            .ok_or_else(|| DownloadError::lookup_failed(checksum, "not found"))
    }

    fn set_credential(&self, _token: Option<String>) {}
}

fn config(dir: &Path) -> DownloaderConfig {
    // Shows worker logs with `--nocapture`; later calls are no-ops
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("osu_stuff_download=debug")
        .try_init();

    DownloaderConfig {
        download_dir: dir.to_path_buf(),
        concurrency: 3,
        item_delay: Duration::ZERO,
        retry_policy: RetryPolicy::none(),
        ..DownloaderConfig::default()
    }
}

fn drain(events: &mut EventReceiver) -> Vec<DownloadEvent> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

fn ends(events: &[DownloadEvent]) -> Vec<(String, bool)> {
    events
        .iter()
        .filter_map(|e| match e {
            DownloadEvent::ProgressEnd {
                task_id, success, ..
            } => Some((task_id.clone(), *success)),
            _ => None,
        })
        .collect()
}

fn completed_counts(events: &[DownloadEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            DownloadEvent::ProgressUpdate { completed, .. } => Some(*completed),
            _ => None,
        })
        .collect()
}

fn shared(catalog: CatalogFile) -> SharedCatalog {
    Arc::new(parking_lot::RwLock::new(catalog))
}

#[tokio::test]
async fn five_items_with_three_workers_complete_once() {
    let dir = tempfile::tempdir().unwrap();
    let mirror = StaticMirror::new(Duration::from_millis(5));
    let (downloader, mut events) = Downloader::builder(config(dir.path()))
        .lookup(TableLookup::new(&[]))
        .mirror_fetch(mirror.clone())
        .build()
        .unwrap();

    downloader
        .submit_download(DownloadTask::new("batch", (1..=5).map(WorkItem::ContentId)))
        .unwrap();
    downloader.run_until_idle().await;

    let events = drain(&mut events);
    assert!(matches!(events[0], DownloadEvent::DownloadCreate { .. }));
    assert_eq!(completed_counts(&events), vec![1, 2, 3, 4, 5]);
    assert_eq!(ends(&events), vec![("batch".to_string(), true)]);
    assert!(events.last().unwrap().is_end());

    assert_eq!(mirror.calls(), 5);
    for id in 1..=5 {
        assert!(dir.path().join(format!("{id}.osz")).exists());
    }
    assert!(downloader.get_queue().is_empty());
}

#[tokio::test]
async fn stop_ends_task_once_without_new_claims() {
    let dir = tempfile::tempdir().unwrap();
    let mirror = StaticMirror::new(Duration::from_millis(30));
    let (downloader, mut events) = Downloader::builder(config(dir.path()))
        .lookup(TableLookup::new(&[]))
        .mirror_fetch(mirror.clone())
        .build()
        .unwrap();

    downloader
        .submit_download(DownloadTask::new("batch", (1..=30).map(WorkItem::ContentId)))
        .unwrap();
    let runner = {
        let downloader = downloader.clone();
        tokio::spawn(async move { downloader.run_until_idle().await })
    };

    // Wait for the first finished item, then stop
    let mut seen = Vec::new();
    loop {
        let event = events.recv().await.unwrap();
        let progressed = matches!(event, DownloadEvent::ProgressUpdate { .. });
        seen.push(event);
        if progressed {
            break;
        }
    }
    assert!(downloader.stop_download("batch"));
    assert_eq!(downloader.get_queue()[0].status, TaskStatus::Cancelled);

    runner.await.unwrap();
    seen.extend(drain(&mut events));

    assert_eq!(ends(&seen), vec![("batch".to_string(), false)]);
    let updates = completed_counts(&seen);
    assert!(updates.len() < 30);
    // Every claimed item was reported and nothing was claimed afterwards
    assert_eq!(mirror.calls(), updates.len());
    assert!(updates.windows(2).all(|w| w[0] < w[1]));
    assert!(!downloader.stop_download("batch"));
    assert!(downloader.get_queue().is_empty());
}

#[tokio::test]
async fn tasks_run_in_submission_order() {
    let dir = tempfile::tempdir().unwrap();
    let (downloader, mut events) = Downloader::builder(config(dir.path()))
        .lookup(TableLookup::new(&[]))
        .mirror_fetch(StaticMirror::new(Duration::ZERO))
        .build()
        .unwrap();

    downloader
        .submit_download(DownloadTask::new("first", [WorkItem::ContentId(1)]))
        .unwrap();
    downloader
        .submit_download(DownloadTask::new("second", [WorkItem::ContentId(2)]))
        .unwrap();
    downloader
        .submit_download(DownloadTask::new("third", [WorkItem::ContentId(3)]))
        .unwrap();

    let err = downloader
        .submit_download(DownloadTask::new("first", Vec::new()))
        .unwrap_err();
    assert!(matches!(err, DownloadError::DuplicateTask(id) if id == "first"));

    let queue = downloader.get_queue();
    assert_eq!(queue.len(), 3);
    assert!(queue.iter().all(|entry| entry.status == TaskStatus::Waiting));

    assert!(downloader.remove_download("third"));
    assert!(!downloader.remove_download("missing"));

    downloader.run_until_idle().await;

    let events = drain(&mut events);
    assert_eq!(
        ends(&events),
        vec![
            ("third".to_string(), false),
            ("first".to_string(), true),
            ("second".to_string(), true),
        ]
    );
    assert!(!dir.path().join("3.osz").exists());
}

#[tokio::test]
async fn failed_lookup_does_not_abort_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let lookup = TableLookup::new(&[(CHECKSUM, 44)]);
    let (downloader, mut events) = Downloader::builder(config(dir.path()))
        .lookup(lookup.clone())
        .mirror_fetch(StaticMirror::new(Duration::ZERO))
        .build()
        .unwrap();

    downloader
        .submit_download(DownloadTask::new(
            "mixed",
            [
                WorkItem::from("ffffffffffffffffffffffffffffffff"),
                WorkItem::from(CHECKSUM),
            ],
        ))
        .unwrap();
    downloader.run_until_idle().await;

    let events = drain(&mut events);
    let mut outcomes: Vec<(usize, bool)> = events
        .iter()
        .filter_map(|e| match e {
            DownloadEvent::ProgressUpdate { item, .. } => Some((item.index, item.is_success())),
            _ => None,
        })
        .collect();
    outcomes.sort_unstable();

    assert_eq!(outcomes, vec![(0, false), (1, true)]);
    assert_eq!(ends(&events), vec![("mixed".to_string(), true)]);
    assert!(dir.path().join("44.osz").exists());
    assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn lookups_are_cached_between_items() {
    let dir = tempfile::tempdir().unwrap();
    let lookup = TableLookup::new(&[(CHECKSUM, 8)]);
    let mirror = StaticMirror::new(Duration::ZERO);
    let (downloader, _events) = Downloader::builder(config(dir.path()))
        .lookup(lookup.clone())
        .mirror_fetch(mirror.clone())
        .build()
        .unwrap();

    let first = downloader.download_single(WorkItem::from(CHECKSUM)).await;
    let second = downloader.download_single(WorkItem::from(CHECKSUM)).await;

    assert!(matches!(first.outcome, ItemOutcome::Downloaded { content_id: 8, .. }));
    assert_eq!(second.outcome, ItemOutcome::Skipped { content_id: 8 });
    assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    assert_eq!(mirror.calls(), 1);
}

#[tokio::test]
async fn difficulties_of_one_set_share_a_single_fetch() {
    const EASY: &str = "11111111111111111111111111111111";
    const HARD: &str = "22222222222222222222222222222222";
    const INSANE: &str = "33333333333333333333333333333333";

    let dir = tempfile::tempdir().unwrap();
    let mirror = StaticMirror::new(Duration::from_millis(50));
    let catalog = shared(CatalogFile::new(20250107));
    let (downloader, mut events) = Downloader::builder(config(dir.path()))
        .lookup(TableLookup::new(&[(EASY, 44), (HARD, 44), (INSANE, 44)]))
        .mirror_fetch(mirror.clone())
        .catalog(catalog.clone())
        .build()
        .unwrap();

    downloader
        .submit_download(DownloadTask::new("set", [WorkItem::from(EASY), WorkItem::from(HARD)]))
        .unwrap();
    downloader.run_until_idle().await;

    let mut outcomes: Vec<ItemOutcome> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            DownloadEvent::ProgressUpdate { item, .. } => Some(item.outcome),
            _ => None,
        })
        .collect();
    outcomes.sort_by_key(|o| matches!(o, ItemOutcome::Skipped { .. }));

    assert_eq!(mirror.calls(), 1);
    assert_eq!(outcomes.len(), 2);
    assert!(matches!(outcomes[0], ItemOutcome::Downloaded { content_id: 44, .. }));
    assert_eq!(outcomes[1], ItemOutcome::Skipped { content_id: 44 });
    assert!(dir.path().join("44.osz").exists());
    assert!(!dir.path().join("44.osz.part").exists());

    {
        let catalog = catalog.read();
        assert!(catalog.contains(EASY));
        assert!(catalog.contains(HARD));
    }

    // A later difficulty of the same set finds the archive on disk
    downloader
        .submit_download(DownloadTask::new("later", [WorkItem::from(INSANE)]))
        .unwrap();
    downloader.run_until_idle().await;

    assert_eq!(mirror.calls(), 1);
    assert!(catalog.read().contains(INSANE));
}

#[tokio::test]
async fn existing_archives_are_skipped_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"unexpected".to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("42.osz"), b"PK").unwrap();
    std::fs::create_dir(dir.path().join("7")).unwrap();

    let mut catalog = CatalogFile::new(20250107);
    catalog.insert(BeatmapRecord {
        checksum: Some(CHECKSUM.to_string()),
        beatmapset_id: 42,
        ..BeatmapRecord::default()
    });

    let mut config = config(dir.path());
    config.lookup_url = format!("{}/api/v2/beatmaps/lookup", server.uri());
    let (downloader, mut events) = Downloader::builder(config)
        .mirrors(vec![MirrorEndpoint::new("mock", format!("{}/d/", server.uri()))])
        .credential("secret")
        .catalog(shared(catalog))
        .build()
        .unwrap();

    downloader
        .submit_download(DownloadTask::new(
            "again",
            [WorkItem::from(CHECKSUM), WorkItem::ContentId(7)],
        ))
        .unwrap();
    downloader.run_until_idle().await;

    let events = drain(&mut events);
    let mut skipped: Vec<ItemOutcome> = events
        .iter()
        .filter_map(|e| match e {
            DownloadEvent::ProgressUpdate { item, .. } => Some(item.outcome.clone()),
            _ => None,
        })
        .collect();
    skipped.sort_by_key(|outcome| match outcome {
        ItemOutcome::Skipped { content_id } => *content_id,
        _ => 0,
    });

    assert_eq!(
        skipped,
        vec![
            ItemOutcome::Skipped { content_id: 7 },
            ItemOutcome::Skipped { content_id: 42 },
        ]
    );
    assert_eq!(ends(&events), vec![("again".to_string(), true)]);
    server.verify().await;
}

#[tokio::test]
async fn downloaded_beatmap_is_added_to_the_catalog() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/beatmaps/lookup"))
        .and(query_param("checksum", CHECKSUM))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 75,
            "beatmapset_id": 1,
            "checksum": CHECKSUM,
            "version": "Normal",
            "mode": "osu",
            "status": "ranked",
            "difficulty_rating": 2.5,
            "beatmapset": { "artist": "Kenji Ninuma", "title": "DISCO PRINCE", "creator": "peppy" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/d/1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04disco".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let catalog = shared(CatalogFile::new(20250107));

    let mut config = config(dir.path());
    config.lookup_url = format!("{}/api/v2/beatmaps/lookup", server.uri());
    let (downloader, mut events) = Downloader::builder(config)
        .mirrors(vec![MirrorEndpoint::new("mock", format!("{}/d/", server.uri()))])
        .credential("secret")
        .catalog(catalog.clone())
        .build()
        .unwrap();

    downloader
        .submit_download(DownloadTask::new("one", [WorkItem::from(CHECKSUM)]).with_name("Favourites"))
        .unwrap();
    downloader.run_until_idle().await;

    assert_eq!(
        std::fs::read(dir.path().join("1.osz")).unwrap(),
        b"PK\x03\x04disco"
    );
    {
        let catalog = catalog.read();
        let record = catalog.get(CHECKSUM).expect("record inserted");
        assert_eq!(record.beatmapset_id, 1);
        assert_eq!(record.title.as_deref(), Some("DISCO PRINCE"));
    }

    // Known to the catalog now, so the next run neither looks up nor fetches
    downloader
        .submit_download(DownloadTask::new("two", [WorkItem::from(CHECKSUM)]))
        .unwrap();
    downloader.run_until_idle().await;

    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        DownloadEvent::ProgressEnd { name, success: true, .. } if name == "Favourites"
    )));
    assert_eq!(
        ends(&events),
        vec![("one".to_string(), true), ("two".to_string(), true)]
    );
    server.verify().await;
}

#[tokio::test]
async fn empty_task_finishes_successfully() {
    let dir = tempfile::tempdir().unwrap();
    let (downloader, mut events) = Downloader::builder(config(dir.path()))
        .lookup(TableLookup::new(&[]))
        .mirror_fetch(StaticMirror::new(Duration::ZERO))
        .build()
        .unwrap();

    downloader
        .submit_download(DownloadTask::new("empty", Vec::new()))
        .unwrap();
    downloader.run_until_idle().await;

    let events = drain(&mut events);
    assert_eq!(events.len(), 2);
    assert_eq!(ends(&events), vec![("empty".to_string(), true)]);
}

#[tokio::test]
async fn spawned_loop_picks_up_later_submissions() {
    let dir = tempfile::tempdir().unwrap();
    let (downloader, mut events) = Downloader::builder(config(dir.path()))
        .lookup(TableLookup::new(&[]))
        .mirror_fetch(StaticMirror::new(Duration::ZERO))
        .build()
        .unwrap();

    let worker = downloader.spawn();
    downloader
        .submit_download(DownloadTask::new("late", [WorkItem::ContentId(3)]))
        .unwrap();

    let end = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if event.is_end() {
                return event;
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(end.task_id(), "late");
    downloader.shutdown();
    tokio::time::timeout(Duration::from_secs(5), worker)
        .await
        .unwrap()
        .unwrap();
}

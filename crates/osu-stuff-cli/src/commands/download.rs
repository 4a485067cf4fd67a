use std::path::PathBuf;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use osu_stuff_download::{
    DownloadEvent, DownloadTask, Downloader, DownloaderConfig, ItemOutcome, MirrorEndpoint,
    WorkItem,
};
use osu_stuff_formats::CatalogDatabase;
use serde::Serialize;
use tracing::{info, warn};

use crate::CommandContext;
use crate::commands::missing::{find_missing, load_library};
use crate::output::{OutputStyle, format_success, format_warning, print_json};

pub struct DownloadOptions {
    pub db: Option<PathBuf>,
    pub collections: Option<PathBuf>,
    pub name: Option<String>,
    pub dir: Option<PathBuf>,
    pub token: Option<String>,
    pub mirrors: Vec<MirrorEndpoint>,
    pub concurrency: Option<usize>,
    pub write_db: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Tasks that ended early
    pub stopped: usize,
}

impl DownloadSummary {
    fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Downloaded { .. } => self.downloaded += 1,
            ItemOutcome::Skipped { .. } => self.skipped += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

pub async fn handle(context: &CommandContext, options: DownloadOptions) -> anyhow::Result<()> {
    let (db_path, catalog_bytes, collections) =
        load_library(context, options.db, options.collections)?;
    let mut database = CatalogDatabase::new(catalog_bytes);
    let catalog = database.decode()?;

    let missing = {
        let catalog = catalog.read();
        find_missing(&catalog, &collections, options.name.as_deref())?
    };
    let style = OutputStyle::new();
    if missing.is_empty() {
        if context.format.is_json() {
            return print_json(&DownloadSummary::default(), context.format);
        }
        println!("{}", format_success("Nothing to download", &style));
        return Ok(());
    }

    let mut config = DownloaderConfig::from_env()?;
    if let Some(dir) = options.dir {
        config.download_dir = dir;
    } else if let Some(osu_dir) = &context.osu_dir {
        config.download_dir = osu_dir.join("Songs");
    }
    if let Some(concurrency) = options.concurrency {
        config.concurrency = concurrency;
    }

    let mut builder = Downloader::builder(config)
        .mirrors(options.mirrors)
        .catalog(Arc::clone(&catalog));
    if let Some(token) = options.token {
        builder = builder.credential(token);
    }
    let (downloader, mut events) = builder.build()?;

    let total: usize = missing.iter().map(|m| m.checksums.len()).sum();
    info!(
        "Downloading {} beatmaps from {} collections into {}",
        total,
        missing.len(),
        downloader.download_directory().display()
    );

    // Collection names may repeat, so ids carry the position
    for (index, collection) in missing.iter().enumerate() {
        let items = collection.checksums.iter().cloned().map(WorkItem::Checksum);
        downloader.submit_download(
            DownloadTask::new(format!("{index}:{}", collection.name), items)
                .with_name(collection.name.clone()),
        )?;
    }

    let runner = {
        let downloader = downloader.clone();
        tokio::spawn(async move { downloader.run_until_idle().await })
    };

    let progress = if context.format.is_json() {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        bar
    };

    let mut summary = DownloadSummary::default();
    let mut remaining = missing.len();
    let mut interrupted = false;
    while remaining > 0 {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    DownloadEvent::DownloadCreate { .. } => {}
                    DownloadEvent::ProgressUpdate { item, .. } => {
                        summary.record(&item.outcome);
                        if let ItemOutcome::Failed { reason } = &item.outcome {
                            progress.println(format_warning(&format!("{}: {reason}", item.item), &style));
                        }
                        progress.inc(1);
                    }
                    DownloadEvent::ProgressEnd { name, success, .. } => {
                        remaining -= 1;
                        if success {
                            progress.set_message(name);
                        } else {
                            summary.stopped += 1;
                            warn!("Collection {} was stopped", name);
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                progress.println(format_warning("Stopping after the current downloads", &style));
                for entry in downloader.get_queue() {
                    downloader.remove_download(&entry.id);
                }
            }
        }
    }
    runner.await?;
    progress.finish_and_clear();

    if options.write_db && summary.downloaded > 0 {
        let written = database.save(&db_path)?;
        info!("Wrote {} bytes to {}", written, db_path.display());
    }

    if context.format.is_json() {
        return print_json(&summary, context.format);
    }
    println!(
        "{}",
        format_success(
            &format!(
                "{} downloaded, {} already present, {} failed",
                summary.downloaded, summary.skipped, summary.failed
            ),
            &style
        )
    );
    Ok(())
}

//! Command line interface: one subcommand per pipeline stage.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::download::{DownloadSettings, Downloader};
use crate::extract::{DateExtractor, DateSettings, TextExtractor, TextSettings};
use crate::pdf::PopplerMiner;
use crate::spider::{Spider, SpiderSettings};
use crate::store::{RedisStore, SharedStore, VisitedSet};

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Distributed PDF harvesting pipeline")]
#[command(version)]
pub struct Cli {
    /// Redis URL backing the shared work-sets
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1/", global = true)]
    redis_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Expand the crawl frontier and classify discovered links
    Spider {
        /// Seeds file: JSON array of {website, name, code} records
        #[arg(long)]
        seeds_path: PathBuf,
        /// Max depth to crawl below the seeds
        #[arg(long, default_value_t = 3)]
        depth: u32,
        /// Times to try opening a link before declaring it dead
        #[arg(long, default_value_t = 3)]
        attempt: u32,
        /// Max concurrent connections per host
        #[arg(long, default_value_t = 3)]
        limit_per_host: usize,
        /// Max worker threads (one host batch per thread)
        #[arg(long, default_value_t = 3)]
        threads: usize,
        /// Max run time in minutes, 0 for unbounded
        #[arg(long, default_value_t = 0)]
        timeout: u64,
        /// Flush the visited-set and old logs before seeding
        #[arg(long)]
        reset: bool,
    },

    /// Download queued PDF links to disk
    Download {
        /// Folder for downloaded PDFs
        #[arg(long)]
        download_path: PathBuf,
        /// Times to try downloading a link before declaring it dead
        #[arg(long, default_value_t = 3)]
        attempt: u32,
        /// Max concurrent connections per host
        #[arg(long, default_value_t = 3)]
        limit_per_host: usize,
        /// Max worker threads (one host batch per thread)
        #[arg(long, default_value_t = 3)]
        threads: usize,
        /// Max run time in minutes, 0 for unbounded
        #[arg(long, default_value_t = 0)]
        timeout: u64,
    },

    /// Convert downloaded PDFs into plain text
    ExtractText {
        /// Folder holding the downloaded PDFs
        #[arg(long)]
        download_path: PathBuf,
        /// Max worker pool size (capped at cores minus one)
        #[arg(long, default_value_t = 2)]
        processors: usize,
        /// Max concurrent conversions per worker
        #[arg(long, default_value_t = 2)]
        threads: usize,
        /// Max run time in minutes, 0 for unbounded
        #[arg(long, default_value_t = 0)]
        timeout: u64,
    },

    /// Tag documents with a publication date and persist them as JSON
    ExtractDate {
        /// Folder for the finished JSON documents
        #[arg(long)]
        saved_path: PathBuf,
        /// Max worker pool size (capped at cores minus one)
        #[arg(long, default_value_t = 2)]
        processors: usize,
        /// Max concurrent documents per worker
        #[arg(long, default_value_t = 2)]
        threads: usize,
        /// Max run time in minutes, 0 for unbounded
        #[arg(long, default_value_t = 0)]
        timeout: u64,
    },
}

/// Parse arguments and run the selected stage to completion.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Spider {
            seeds_path,
            depth,
            attempt,
            limit_per_host,
            threads,
            timeout,
            reset,
        } => {
            if reset {
                clear_logs()?;
            }
            init_stage_logging("spider")?;
            let store = connect_store(&cli.redis_url).await?;
            if reset {
                VisitedSet::new(store.clone())
                    .clear()
                    .await
                    .context("failed to flush the visited-set")?;
                tracing::info!("visited-set flushed");
            }

            let spider = Spider::new(
                store,
                SpiderSettings {
                    max_depth: depth,
                    max_attempt: attempt,
                    max_threads: threads,
                    limit_per_host,
                    timeout_minutes: timeout,
                },
            );
            spider.load_seeds(&seeds_path).await?;
            spider.run().await
        }

        Command::Download {
            download_path,
            attempt,
            limit_per_host,
            threads,
            timeout,
        } => {
            init_stage_logging("downloader")?;
            fs::create_dir_all(&download_path).with_context(|| {
                format!("cannot create download folder: {}", download_path.display())
            })?;
            let store = connect_store(&cli.redis_url).await?;

            let downloader = Downloader::new(
                store,
                DownloadSettings {
                    download_path,
                    max_attempt: attempt,
                    max_threads: threads,
                    limit_per_host,
                    timeout_minutes: timeout,
                },
            );
            downloader.run().await
        }

        Command::ExtractText {
            download_path,
            processors,
            threads,
            timeout,
        } => {
            init_stage_logging("text_extractor")?;
            let store = connect_store(&cli.redis_url).await?;

            let extractor = TextExtractor::new(
                store,
                Arc::new(PopplerMiner),
                TextSettings {
                    download_path,
                    max_processors: processors,
                    max_threads: threads,
                    timeout_minutes: timeout,
                },
            );
            extractor.run().await
        }

        Command::ExtractDate {
            saved_path,
            processors,
            threads,
            timeout,
        } => {
            init_stage_logging("date_extractor")?;
            fs::create_dir_all(&saved_path)
                .with_context(|| format!("cannot create saved folder: {}", saved_path.display()))?;
            let store = connect_store(&cli.redis_url).await?;

            let extractor = DateExtractor::new(
                store,
                DateSettings {
                    saved_path,
                    max_processors: processors,
                    max_threads: threads,
                    timeout_minutes: timeout,
                },
            );
            extractor.run().await
        }
    }
}

async fn connect_store(redis_url: &str) -> anyhow::Result<SharedStore> {
    let store = RedisStore::connect(redis_url)
        .await
        .context("work-set store unreachable")?;
    Ok(Arc::new(store))
}

fn logs_dir() -> anyhow::Result<PathBuf> {
    Ok(std::env::current_dir()?.join("logs"))
}

/// Route this stage's tracing output to logs/<stage>_<timestamp>.log.
fn init_stage_logging(stage: &str) -> anyhow::Result<()> {
    let logs_dir = logs_dir()?;
    fs::create_dir_all(&logs_dir)
        .with_context(|| format!("cannot create log folder: {}", logs_dir.display()))?;

    let timestamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S");
    let log_path = logs_dir.join(format!("{}_{}.log", stage, timestamp));
    let log_file = fs::File::create(&log_path)
        .with_context(|| format!("cannot create log file: {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdfharvest=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(log_file)),
        )
        .init();

    println!("log file is created: {}", log_path.display());
    Ok(())
}

/// Delete accumulated log files (part of --reset).
fn clear_logs() -> anyhow::Result<()> {
    let logs_dir = logs_dir()?;
    if !logs_dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(&logs_dir)? {
        let path = entry?.path();
        if path.is_file() {
            remove_log(&path)?;
        }
    }
    Ok(())
}

fn remove_log(path: &Path) -> anyhow::Result<()> {
    fs::remove_file(path).with_context(|| format!("cannot delete log: {}", path.display()))
}

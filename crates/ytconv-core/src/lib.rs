//! `Ytconv` Core Library
//!
//! This crate provides the download queue behind the `Ytconv` converter:
//! - Jobs with a tracked lifecycle (queued, fetching, downloading,
//!   processing, complete, error, cancelled)
//! - A FIFO download queue served by a fixed worker pool
//! - A queue controller that bounds concurrency, supports pause/resume and
//!   cancellation, and fires a post-queue action once work drains
//! - A `yt-dlp` backed extraction client
//! - Output naming and application configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ytconv_core::{
//!     AppConfig, LoggingHook, MediaFormat, OutputDirectory, QueueController, YtDlpClient,
//! };
//!
//! async fn run() -> ytconv_core::Result<()> {
//!     let config = AppConfig::load()?;
//!     let output = Arc::new(OutputDirectory::resolve(config.output_directory.as_deref())?);
//!     let client = Arc::new(YtDlpClient::new((&config).into()));
//!     let (controller, _pool) =
//!         QueueController::start(&config, client, output, Arc::new(LoggingHook)).await?;
//!     controller
//!         .submit_urls(["https://www.youtube.com/watch?v=dQw4w9WgXcQ"], MediaFormat::Audio, "192kbps")
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod extractor;
pub mod input;
pub mod job;
pub mod output;
pub mod progress;
pub mod queue;
pub mod worker;
pub mod ytdlp;

pub use config::{
    AppConfig, DEFAULT_MAX_CONCURRENT_DOWNLOADS, DEFAULT_WORKER_COUNT, MAX_CONCURRENT_DOWNLOADS,
    MIN_CONCURRENT_DOWNLOADS, PostQueueAction, QueueConfig, validate_rate_limit,
};
pub use controller::{
    ACTIVITY_LOG_CAPACITY, LogEntry, LogLevel, LoggingHook, PostQueueHook, QueueCommands,
    QueueController, QueueEvent, QueueStats,
};
pub use error::{Error, Result};
pub use extractor::{
    AudioConversion, DownloadOptions, ExtractionClient, MediaInfo, PlaylistEntry, ProbeScope,
    ProgressCallback, ProgressEvent, format_selector,
};
pub use input::{SourceKind, expand_playlist, parse_url_list, single_playlist_url};
pub use job::{
    AUDIO_BITRATES, CancelFlag, DEFAULT_AUDIO_BITRATE, DownloadRequest, Job, JobId, JobStatus,
    MediaFormat, PLACEHOLDER_TITLE, Quality, VIDEO_HEIGHTS,
};
pub use output::{
    FALLBACK_OUTPUT_FOLDER, MAX_TITLE_LEN, OUTPUT_SUBFOLDER, OutputDirectory,
    default_output_directory, sanitize_title,
};
pub use progress::ProgressReporter;
pub use queue::DownloadQueue;
pub use worker::WorkerPool;
pub use ytdlp::{YtDlpClient, YtDlpConfig};

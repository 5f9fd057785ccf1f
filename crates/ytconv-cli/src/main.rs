//! `ytconv` - command line front-end for the `Ytconv` download queue.
//!
//! Submits every URL to the queue, prints one line per job change and exits
//! once the queue drains. Ctrl-C cancels whatever is still pending.

mod args;
mod logging;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};
use ytconv_core::{
    AppConfig, Job, JobStatus, LogLevel, OutputDirectory, PostQueueAction, PostQueueHook,
    QueueCommands, QueueController, QueueEvent, SourceKind, YtDlpClient, YtDlpConfig,
    expand_playlist, single_playlist_url,
};

use crate::args::Cli;
use crate::logging::LoggingConfig;

/// Announces the post-queue action. Power management is left to the user.
struct AnnouncingHook;

impl PostQueueHook for AnnouncingHook {
    fn on_queue_drained(&self, action: PostQueueAction) {
        info!(%action, "Queue drained");
        eprintln!("All downloads finished. Requested action: {action} (not performed by ytconv)");
    }
}

/// Outcome of a run.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
struct Summary {
    completed: usize,
    failed: usize,
    cancelled: usize,
    output_directory: PathBuf,
}

impl Summary {
    fn from_jobs(jobs: &[Job], output_directory: &Path) -> Self {
        let mut summary = Self {
            output_directory: output_directory.to_path_buf(),
            ..Self::default()
        };
        for job in jobs {
            match job.status {
                JobStatus::Complete => summary.completed += 1,
                JobStatus::Error(_) => summary.failed += 1,
                JobStatus::Cancelled => summary.cancelled += 1,
                _ => {}
            }
        }
        summary
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = match logging::init(&LoggingConfig::auto().with_verbosity(cli.verbose)) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: {e}");
            None
        }
    };

    match run(cli).await {
        Ok(summary) if summary.failed == 0 => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<Summary> {
    let config_path = cli.config_path();
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .with_context(|| format!("loading settings from {}", config_path.display()))?;
    cli.apply_overrides(&mut config)?;
    if cli.save_config {
        config.save_to(&config_path)?;
        eprintln!("Saved settings to {}", config_path.display());
    }

    let urls = cli.collect_urls()?;
    if urls.is_empty() {
        bail!("no URLs given; pass them as arguments or with --input");
    }

    let client = Arc::new(YtDlpClient::new(YtDlpConfig::from(&config)));
    check_tools(Arc::clone(&client)).await?;

    let urls = if cli.playlist {
        playlist_urls(Arc::clone(&client), cli.source, &urls).await?
    } else {
        urls
    };
    let requests = cli
        .source
        .requests(&urls, cli.format, cli.quality.as_deref())?;

    let output = Arc::new(OutputDirectory::resolve(config.output_directory.as_deref())?);
    eprintln!("Saving to {}", output.path().display());

    let (controller, pool) =
        QueueController::start(&config, client, Arc::clone(&output), Arc::new(AnnouncingHook))
            .await?;
    let events = controller.subscribe();
    let ids = QueueCommands::submit(&controller, requests).await?;
    info!(count = ids.len(), "Submitted downloads");

    watch(&controller, events, cli.json).await?;

    controller.shutdown().await;
    pool.join().await;

    let jobs = controller.jobs().await;
    let summary = Summary::from_jobs(&jobs, output.path());
    if cli.json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        for job in &jobs {
            if let JobStatus::Error(message) = &job.status {
                eprintln!("failed: {} ({message})", job.request.url);
            }
        }
        eprintln!(
            "{} complete, {} failed, {} cancelled",
            summary.completed, summary.failed, summary.cancelled
        );
    }
    Ok(summary)
}

/// Fail early when `yt-dlp` is missing; warn when `ffmpeg` is.
async fn check_tools(client: Arc<YtDlpClient>) -> Result<()> {
    let (version, has_ffmpeg) =
        tokio::task::spawn_blocking(move || (client.version(), client.has_ffmpeg())).await?;
    let version = version.context("yt-dlp is required")?;
    info!(%version, "Using yt-dlp");
    if !has_ffmpeg {
        warn!("ffmpeg not found; MP3 conversion and stream merging will fail");
    }
    Ok(())
}

async fn playlist_urls(
    client: Arc<YtDlpClient>,
    source: SourceKind,
    urls: &[String],
) -> Result<Vec<String>> {
    if !source.supports_playlists() {
        bail!("{source} links cannot be expanded as playlists");
    }
    let url = single_playlist_url(urls)?.to_string();
    let entries =
        tokio::task::spawn_blocking(move || expand_playlist(client.as_ref(), &url)).await??;
    eprintln!("Playlist has {} entries", entries.len());
    Ok(entries.into_iter().map(|entry| entry.url).collect())
}

/// Print events until the queue drains. The first Ctrl-C cancels all jobs.
async fn watch(
    controller: &QueueController,
    mut events: broadcast::Receiver<QueueEvent>,
    json: bool,
) -> Result<()> {
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    print_event(&event, json)?;
                    if matches!(event, QueueEvent::Drained { .. }) {
                        return Ok(());
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed queue events");
                    // The drain event may be among the skipped ones
                    let stats = controller.stats().await;
                    if stats.active_count == 0 && stats.pending_count == 0 {
                        return Ok(());
                    }
                }
                Err(RecvError::Closed) => bail!("download queue stopped unexpectedly"),
            },
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                signal?;
                interrupted = true;
                let cancelled = controller.cancel_all().await;
                eprintln!("Interrupted, cancelling {cancelled} job(s)");
            }
        }
    }
}

fn print_event(event: &QueueEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    if let Some(line) = event_line(event) {
        println!("{line}");
    }
    Ok(())
}

fn event_line(event: &QueueEvent) -> Option<String> {
    match event {
        QueueEvent::JobChanged {
            job_id,
            title,
            status: JobStatus::Error(message),
        } => Some(format!("[{job_id}] {title} — Error: {message}")),
        QueueEvent::JobChanged {
            job_id,
            title,
            status,
        } => Some(format!("[{job_id}] {title} — {status}")),
        QueueEvent::LogAppended(entry) if entry.level == LogLevel::Warning => {
            Some(format!("warning: {}", entry.message))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_line_formats_job_changes() {
        let event = QueueEvent::JobChanged {
            job_id: 3,
            title: "Song".to_string(),
            status: JobStatus::Downloading(Some(42.0)),
        };
        assert_eq!(
            event_line(&event).unwrap(),
            "[3] Song — Downloading 42.0%"
        );

        let event = QueueEvent::JobChanged {
            job_id: 4,
            title: "Clip".to_string(),
            status: JobStatus::Error("HTTP Error 403".to_string()),
        };
        assert_eq!(
            event_line(&event).unwrap(),
            "[4] Clip — Error: HTTP Error 403"
        );
    }

    #[test]
    fn test_event_line_skips_queue_level_events() {
        assert!(event_line(&QueueEvent::Paused).is_none());
        assert!(
            event_line(&QueueEvent::Drained {
                action: PostQueueAction::None
            })
            .is_none()
        );
    }

    #[test]
    fn test_summary_serializes() {
        let summary = Summary {
            completed: 2,
            failed: 1,
            cancelled: 0,
            output_directory: PathBuf::from("/music"),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["completed"], 2);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["output_directory"], "/music");
    }

    #[test]
    fn test_summary_from_no_jobs() {
        let summary = Summary::from_jobs(&[], Path::new("/out"));
        assert_eq!(summary.completed + summary.failed + summary.cancelled, 0);
    }
}

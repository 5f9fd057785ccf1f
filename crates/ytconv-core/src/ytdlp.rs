//! `yt-dlp` subprocess implementation of [`ExtractionClient`].
//!
//! Probing runs `yt-dlp --dump-single-json` and parses the JSON document.
//! Downloads run with a custom `--progress-template` so each progress line on
//! stdout can be parsed without scraping the human-readable output.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::LazyLock;
use std::thread::JoinHandle;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::extractor::{
    DownloadOptions, ExtractionClient, MediaInfo, PlaylistEntry, ProbeScope, ProgressCallback,
    ProgressEvent,
};

/// Name of the extractor binary.
pub const YT_DLP_BINARY: &str = "yt-dlp";

/// Name of the transcoder binary.
pub const FFMPEG_BINARY: &str = "ffmpeg";

/// Marker that identifies our progress lines on stdout.
const PROGRESS_MARKER: &str = "ytconv|";

/// Progress template; yt-dlp prints `NA` for unknown fields.
const PROGRESS_TEMPLATE: &str = "download:ytconv|%(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s";

/// Number of stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

static POST_PROCESS_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\[(ExtractAudio|Merger|ffmpeg|FixupM3u8|FixupM4a|VideoConvertor)\]").ok()
});

/// Binary locations for [`YtDlpClient`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YtDlpConfig {
    /// Explicit `yt-dlp` path; `PATH` lookup when `None`.
    pub yt_dlp_path: Option<PathBuf>,
    /// Explicit `ffmpeg` path; `PATH` lookup when `None`.
    pub ffmpeg_path: Option<PathBuf>,
}

impl From<&AppConfig> for YtDlpConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            yt_dlp_path: config.yt_dlp_path.clone(),
            ffmpeg_path: config.ffmpeg_path.clone(),
        }
    }
}

/// Extraction client backed by the `yt-dlp` binary.
#[derive(Debug, Clone, Default)]
pub struct YtDlpClient {
    config: YtDlpConfig,
}

impl YtDlpClient {
    /// Create a client.
    #[must_use]
    pub const fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    fn yt_dlp(&self) -> Result<PathBuf> {
        resolve_binary(YT_DLP_BINARY, self.config.yt_dlp_path.as_deref())
    }

    fn ffmpeg(&self) -> Result<PathBuf> {
        resolve_binary(FFMPEG_BINARY, self.config.ffmpeg_path.as_deref())
    }

    /// Version string reported by `yt-dlp --version`.
    pub fn version(&self) -> Result<String> {
        let yt_dlp = self.yt_dlp()?;
        let output = Command::new(&yt_dlp)
            .arg("--version")
            .stdin(Stdio::null())
            .output()?;
        if !output.status.success() {
            return Err(Error::Configuration(format!(
                "{} --version exited with {}",
                yt_dlp.display(),
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Whether the transcoder can be found.
    pub fn has_ffmpeg(&self) -> bool {
        self.ffmpeg().is_ok()
    }
}

impl ExtractionClient for YtDlpClient {
    fn probe(&self, url: &str, scope: ProbeScope) -> Result<MediaInfo> {
        let yt_dlp = self.yt_dlp()?;
        let args = probe_args(url, scope);
        debug!("Executing command: {} {:?}", yt_dlp.display(), args);

        let output = Command::new(&yt_dlp)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::Probe(format!("Failed to run {YT_DLP_BINARY}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<String> = stderr.lines().map(str::to_string).collect();
            return Err(Error::Probe(failure_message(output.status, &tail)));
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    fn download(
        &self,
        url: &str,
        options: &DownloadOptions,
        on_progress: ProgressCallback<'_>,
    ) -> Result<()> {
        let yt_dlp = self.yt_dlp()?;
        let ffmpeg = if options.requires_transcoder() {
            Some(self.ffmpeg()?)
        } else {
            // Merging separate video and audio streams also needs it, but
            // yt-dlp falls back to a single-file format without it.
            self.ffmpeg().ok()
        };

        let args = download_args(url, options, ffmpeg.as_deref());
        debug!("Executing command: {} {:?}", yt_dlp.display(), args);

        let mut child = Command::new(&yt_dlp)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Download(format!("Failed to start {YT_DLP_BINARY}: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Download(format!("{YT_DLP_BINARY} stdout unavailable")))?;
        let stderr_tail = child.stderr.take().map(spawn_tail_reader);

        for line in BufReader::new(stdout).lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("Error reading {YT_DLP_BINARY} output: {}", e);
                    break;
                }
            };

            let Some(event) = parse_progress_line(&line) else {
                trace!("{YT_DLP_BINARY}: {}", line);
                continue;
            };

            if let Err(e) = on_progress(event) {
                debug!("Stopping {YT_DLP_BINARY}: {}", e);
                if let Err(kill_err) = child.kill() {
                    warn!("Failed to kill {YT_DLP_BINARY}: {}", kill_err);
                }
                let _ = child.wait();
                return Err(e);
            }
        }

        let status = child.wait()?;
        let tail = stderr_tail
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(Error::Download(failure_message(status, &tail)))
        }
    }
}

/// Locate a binary: the configured path if set, otherwise a `PATH` lookup.
pub fn resolve_binary(name: &str, configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        warn!("Configured {} not found at {}", name, path.display());
        return Err(Error::tool_missing(name));
    }
    which::which(name).map_err(|_| Error::tool_missing(name))
}

/// Arguments for a metadata probe.
#[must_use]
pub fn probe_args(url: &str, scope: ProbeScope) -> Vec<String> {
    let scope_flag = match scope {
        ProbeScope::Single => "--no-playlist",
        ProbeScope::FlatPlaylist => "--flat-playlist",
    };
    vec![
        "--dump-single-json".to_string(),
        "--no-warnings".to_string(),
        scope_flag.to_string(),
        "--".to_string(),
        url.to_string(),
    ]
}

/// Arguments for a download.
#[must_use]
pub fn download_args(url: &str, options: &DownloadOptions, ffmpeg: Option<&Path>) -> Vec<String> {
    let mut args: Vec<String> = [
        "--newline",
        "--no-playlist",
        "--progress-template",
        PROGRESS_TEMPLATE,
        "-f",
        options.format_selector.as_str(),
        "-o",
        options.output_template.as_str(),
    ]
    .iter()
    .map(ToString::to_string)
    .collect();

    if let Some(limit) = &options.rate_limit {
        args.push("--limit-rate".to_string());
        args.push(limit.clone());
    }

    if let Some(audio) = &options.audio_conversion {
        args.push("-x".to_string());
        args.push("--audio-format".to_string());
        args.push(audio.codec.clone());
        args.push("--audio-quality".to_string());
        args.push(format!("{}K", audio.bitrate_kbps));
    } else {
        args.push("--merge-output-format".to_string());
        args.push("mp4".to_string());
    }

    if let Some(ffmpeg) = ffmpeg {
        args.push("--ffmpeg-location".to_string());
        args.push(ffmpeg.to_string_lossy().into_owned());
    }

    args.push("--".to_string());
    args.push(url.to_string());
    args
}

fn parse_bytes(field: Option<&str>) -> Option<u64> {
    let field = field?.trim();
    if field.is_empty() || field == "NA" || field == "None" {
        return None;
    }
    field
        .parse::<u64>()
        .ok()
        .or_else(|| field.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64))
}

/// Parse one stdout line into a progress event.
#[must_use]
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(PROGRESS_MARKER) {
        let mut fields = rest.split('|');
        return match fields.next()? {
            "downloading" => Some(ProgressEvent::Downloading {
                downloaded_bytes: parse_bytes(fields.next()).unwrap_or(0),
                total_bytes: parse_bytes(fields.next()),
                total_bytes_estimate: parse_bytes(fields.next()),
            }),
            "finished" => Some(ProgressEvent::Finished),
            _ => None,
        };
    }

    POST_PROCESS_RE
        .as_ref()
        .filter(|re| re.is_match(line))
        .map(|_| ProgressEvent::PostProcessing)
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    id: Option<String>,
    title: Option<String>,
    entries: Option<Vec<Option<RawEntry>>>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    ie_key: Option<String>,
}

impl RawEntry {
    fn into_entry(self) -> Option<PlaylistEntry> {
        let url = match (self.webpage_url, self.url) {
            (Some(page), _) => page,
            (None, Some(url)) if url.contains("://") => url,
            // Older flat extraction reports bare video ids
            (None, Some(id)) if self.ie_key.as_deref() == Some("Youtube") => {
                format!("https://www.youtube.com/watch?v={id}")
            }
            (None, _) => match (self.id, self.ie_key.as_deref()) {
                (Some(id), Some("Youtube")) => format!("https://www.youtube.com/watch?v={id}"),
                _ => return None,
            },
        };
        Some(PlaylistEntry {
            url,
            title: self.title,
        })
    }
}

/// Parse the JSON document printed by `--dump-single-json`.
pub fn parse_probe_output(json: &str) -> Result<MediaInfo> {
    let raw: RawInfo = serde_json::from_str(json.trim())
        .map_err(|e| Error::Probe(format!("Unexpected {YT_DLP_BINARY} output: {e}")))?;

    let id = raw.id.unwrap_or_default();
    let title = raw
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| id.clone());
    let entries = raw.entries.map(|entries| {
        entries
            .into_iter()
            .flatten()
            .filter_map(RawEntry::into_entry)
            .collect()
    });

    Ok(MediaInfo { id, title, entries })
}

fn spawn_tail_reader<R: Read + Send + 'static>(stream: R) -> JoinHandle<Vec<String>> {
    std::thread::spawn(move || {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        for line in BufReader::new(stream).lines().map_while(std::result::Result::ok) {
            trace!("{YT_DLP_BINARY} stderr: {}", line);
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        tail.into_iter().collect()
    })
}

/// Human-readable reason for a failed run.
///
/// Prefers the last `ERROR:` line, then the last non-empty line.
#[must_use]
pub fn failure_message(status: ExitStatus, stderr_tail: &[String]) -> String {
    let last_error = stderr_tail
        .iter()
        .rev()
        .find_map(|line| line.trim().strip_prefix("ERROR:").map(str::trim));
    let last_line = stderr_tail
        .iter()
        .rev()
        .map(|line| line.trim())
        .find(|line| !line.is_empty());

    last_error
        .or(last_line)
        .map_or_else(
            || format!("{YT_DLP_BINARY} exited with {status}"),
            ToString::to_string,
        )
}

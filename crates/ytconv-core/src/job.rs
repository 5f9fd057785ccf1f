//! Download jobs and their lifecycle.
//!
//! A [`Job`] describes one requested download: where it comes from, which
//! format and quality it should be fetched in, and where it currently is in
//! its lifecycle:
//!
//! ```text
//! Queued -> Fetching -> Downloading(%) -> Processing -> Complete | Error
//!    \_________\______________\_______________\______> Cancelling -> Cancelled
//! ```
//!
//! Terminal states ([`JobStatus::is_terminal`]) are never left again; a
//! finished job can only disappear through `clear_finished`.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Error, Result};

/// Unique identifier for a job.
///
/// Ids are handed out monotonically by the controller and are never reused,
/// so a stale id can at worst resolve to nothing.
pub type JobId = u64;

/// Placeholder title shown until the metadata probe resolves.
pub const PLACEHOLDER_TITLE: &str = "Fetching title…";

/// Audio bitrates offered for MP3 extraction, in kbps.
pub const AUDIO_BITRATES: [u32; 4] = [128, 192, 256, 320];

/// Maximum video heights offered besides `Best`.
pub const VIDEO_HEIGHTS: [u32; 3] = [1080, 720, 480];

/// Default MP3 bitrate in kbps.
pub const DEFAULT_AUDIO_BITRATE: u32 = 192;

/// Target media format of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    /// Audio only, transcoded to MP3.
    Audio,
    /// Video with audio, MP4 container.
    Video,
}

impl MediaFormat {
    /// File extension of the final artifact.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Audio => "mp3",
            Self::Video => "mp4",
        }
    }
}

impl std::fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

impl std::str::FromStr for MediaFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "audio" | "mp3" => Ok(Self::Audio),
            "video" | "mp4" => Ok(Self::Video),
            other => Err(Error::InvalidInput(format!("unknown format '{other}'"))),
        }
    }
}

/// Format-specific quality parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// MP3 bitrate in kbps (audio only).
    Bitrate(u32),
    /// Best available video.
    Best,
    /// Best video not taller than this many pixels.
    MaxHeight(u32),
}

impl Quality {
    /// Default quality for a format.
    #[must_use]
    pub const fn default_for(format: MediaFormat) -> Self {
        match format {
            MediaFormat::Audio => Self::Bitrate(DEFAULT_AUDIO_BITRATE),
            MediaFormat::Video => Self::Best,
        }
    }

    /// Parse a user-facing label ("192kbps", "720p", "Best") for a format.
    pub fn parse(format: MediaFormat, label: &str) -> Result<Self> {
        let normalized = label.trim().to_lowercase();
        let invalid = || Error::InvalidQuality {
            label: label.to_string(),
            format: format.to_string(),
        };

        match format {
            MediaFormat::Audio => {
                let digits = normalized
                    .strip_suffix("kbps")
                    .or_else(|| normalized.strip_suffix('k'))
                    .unwrap_or(&normalized)
                    .trim();
                let kbps: u32 = digits.parse().map_err(|_| invalid())?;
                if AUDIO_BITRATES.contains(&kbps) {
                    Ok(Self::Bitrate(kbps))
                } else {
                    Err(invalid())
                }
            }
            MediaFormat::Video => {
                if normalized == "best" {
                    return Ok(Self::Best);
                }
                let digits = normalized.strip_suffix('p').unwrap_or(&normalized);
                let height: u32 = digits.parse().map_err(|_| invalid())?;
                if VIDEO_HEIGHTS.contains(&height) {
                    Ok(Self::MaxHeight(height))
                } else {
                    Err(invalid())
                }
            }
        }
    }

    /// Whether this quality can be used with the given format.
    #[must_use]
    pub const fn fits(self, format: MediaFormat) -> bool {
        matches!(
            (self, format),
            (Self::Bitrate(_), MediaFormat::Audio)
                | (Self::Best | Self::MaxHeight(_), MediaFormat::Video)
        )
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bitrate(kbps) => write!(f, "{kbps}kbps"),
            Self::Best => write!(f, "Best"),
            Self::MaxHeight(height) => write!(f, "{height}p"),
        }
    }
}

/// A download request as submitted by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Source URL, opaque to the queue.
    pub url: String,
    /// Target format.
    pub format: MediaFormat,
    /// Quality for the target format.
    pub quality: Quality,
}

impl DownloadRequest {
    /// Create a request, checking that the quality fits the format.
    pub fn new(url: impl Into<String>, format: MediaFormat, quality: Quality) -> Result<Self> {
        if !quality.fits(format) {
            return Err(Error::InvalidQuality {
                label: quality.to_string(),
                format: format.to_string(),
            });
        }
        Ok(Self {
            url: url.into(),
            format,
            quality,
        })
    }

    /// Create a request from a user-facing quality label.
    pub fn from_label(url: impl Into<String>, format: MediaFormat, label: &str) -> Result<Self> {
        let quality = Quality::parse(format, label)?;
        Self::new(url, format, quality)
    }

    /// MP3 request at the given bitrate label.
    pub fn audio(url: impl Into<String>, bitrate: &str) -> Result<Self> {
        Self::from_label(url, MediaFormat::Audio, bitrate)
    }

    /// MP4 request at the given resolution label.
    pub fn video(url: impl Into<String>, resolution: &str) -> Result<Self> {
        Self::from_label(url, MediaFormat::Video, resolution)
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a worker.
    Queued,
    /// Probing metadata.
    Fetching,
    /// Transferring media; percent is present only when the total size is known.
    Downloading(Option<f64>),
    /// Post-processing (merge or transcode).
    Processing,
    /// Finished successfully.
    Complete,
    /// Failed; the message is also appended to the activity log.
    Error(String),
    /// Cancel requested, waiting for the worker to notice.
    Cancelling,
    /// Cancelled.
    Cancelled,
}

impl JobStatus {
    /// Whether the job reached a state it never leaves.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error(_) | Self::Cancelled)
    }

    /// Whether a worker is currently running the job.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Fetching | Self::Downloading(_) | Self::Processing | Self::Cancelling
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "Queued"),
            Self::Fetching => write!(f, "Fetching…"),
            Self::Downloading(Some(percent)) => write!(f, "Downloading {percent:.1}%"),
            Self::Downloading(None) => write!(f, "Downloading"),
            Self::Processing => write!(f, "Processing…"),
            Self::Complete => write!(f, "Complete"),
            Self::Error(_) => write!(f, "Error"),
            Self::Cancelling => write!(f, "Cancelling…"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Shared cancellation flag.
///
/// Set by the controller, read by the worker and by the progress reporter
/// inside the extraction client's callback loop.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Serialize for CancelFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bool(self.is_cancelled())
    }
}

/// A tracked download job.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    /// Stable identity used to route updates.
    pub id: JobId,
    /// What to download.
    pub request: DownloadRequest,
    /// Display title; a placeholder until metadata resolves.
    pub title: String,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Cancellation flag shared with the worker.
    pub cancelled: CancelFlag,
    /// Final artifact path once known.
    pub output_path: Option<PathBuf>,
    /// Timestamp when the job was submitted (Unix millis).
    pub added_at: u64,
}

impl Job {
    /// Create a queued job.
    pub(crate) fn new(id: JobId, request: DownloadRequest) -> Self {
        Self {
            id,
            request,
            title: PLACEHOLDER_TITLE.to_string(),
            status: JobStatus::Queued,
            cancelled: CancelFlag::new(),
            output_path: None,
            added_at: now_millis(),
        }
    }

    /// Whether the job is finished (complete, failed, or cancelled).
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Current time as Unix millis.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_audio_quality() {
        assert_eq!(
            Quality::parse(MediaFormat::Audio, "192kbps").unwrap(),
            Quality::Bitrate(192)
        );
        assert_eq!(
            Quality::parse(MediaFormat::Audio, "320K").unwrap(),
            Quality::Bitrate(320)
        );
        assert_eq!(
            Quality::parse(MediaFormat::Audio, " 128 ").unwrap(),
            Quality::Bitrate(128)
        );
        assert!(Quality::parse(MediaFormat::Audio, "64kbps").is_err());
        assert!(Quality::parse(MediaFormat::Audio, "720p").is_err());
    }

    #[test]
    fn test_parse_video_quality() {
        assert_eq!(
            Quality::parse(MediaFormat::Video, "Best").unwrap(),
            Quality::Best
        );
        assert_eq!(
            Quality::parse(MediaFormat::Video, "1080p").unwrap(),
            Quality::MaxHeight(1080)
        );
        assert!(Quality::parse(MediaFormat::Video, "4k").is_err());
        assert!(Quality::parse(MediaFormat::Video, "192kbps").is_err());
    }

    #[test]
    fn test_quality_labels() {
        assert_eq!(Quality::Bitrate(192).to_string(), "192kbps");
        assert_eq!(Quality::MaxHeight(720).to_string(), "720p");
        assert_eq!(Quality::Best.to_string(), "Best");
    }

    #[test]
    fn test_request_rejects_mismatched_quality() {
        let result = DownloadRequest::new("https://example.com", MediaFormat::Audio, Quality::Best);
        assert!(matches!(result, Err(Error::InvalidQuality { .. })));

        let request = DownloadRequest::audio("https://example.com", "192kbps").unwrap();
        assert_eq!(request.quality, Quality::Bitrate(192));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(JobStatus::Fetching.to_string(), "Fetching…");
        assert_eq!(
            JobStatus::Downloading(Some(42.345)).to_string(),
            "Downloading 42.3%"
        );
        assert_eq!(JobStatus::Downloading(None).to_string(), "Downloading");
        assert_eq!(JobStatus::Error("boom".into()).to_string(), "Error");
        assert_eq!(JobStatus::Cancelling.to_string(), "Cancelling…");
    }

    #[test]
    fn test_terminal_and_in_flight_states() {
        assert!(JobStatus::Complete.is_terminal());
        assert!(JobStatus::Error(String::new()).is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Cancelling.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(JobStatus::Fetching.is_in_flight());
        assert!(JobStatus::Downloading(Some(3.0)).is_in_flight());
        assert!(JobStatus::Cancelling.is_in_flight());
        assert!(!JobStatus::Queued.is_in_flight());
        assert!(!JobStatus::Cancelled.is_in_flight());
    }

    #[test]
    fn test_cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_cancelled());
        flag.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn test_new_job_is_queued_with_placeholder() {
        let request = DownloadRequest::video("https://example.com/v", "Best").unwrap();
        let job = Job::new(7, request);
        assert_eq!(job.id, 7);
        assert_eq!(job.title, PLACEHOLDER_TITLE);
        assert_eq!(job.status, JobStatus::Queued);
        assert!(!job.is_finished());
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("mp3".parse::<MediaFormat>().unwrap(), MediaFormat::Audio);
        assert_eq!("Video".parse::<MediaFormat>().unwrap(), MediaFormat::Video);
        assert!("flac".parse::<MediaFormat>().is_err());
    }
}

//! Extraction client contract.
//!
//! Metadata probing, media retrieval and transcoding are delegated to an
//! external extractor. The queue only needs the narrow interface defined by
//! [`ExtractionClient`]; [`crate::ytdlp::YtDlpClient`] implements it on top of
//! the `yt-dlp` binary.
//!
//! Both calls are blocking. Workers run them on the blocking thread pool, one
//! in-flight download per worker.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::job::{DownloadRequest, MediaFormat, Quality};

/// How much of a source to probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeScope {
    /// A single item; playlist parameters in the URL are ignored.
    Single,
    /// List the entries of a playlist-like source without resolving each one.
    FlatPlaylist,
}

/// One entry of a playlist-like source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    /// Entry URL, suitable for submitting as its own job.
    pub url: String,
    /// Entry title, if the extractor reported one.
    pub title: Option<String>,
}

/// Result of a metadata probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Source-provided identifier.
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// Present only for playlist-like sources.
    pub entries: Option<Vec<PlaylistEntry>>,
}

/// Audio transcoding step run after the download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConversion {
    /// Target codec (`mp3`).
    pub codec: String,
    /// Target bitrate in kbps.
    pub bitrate_kbps: u32,
}

/// Options for a single download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Extractor format selector.
    pub format_selector: String,
    /// Output path template (extension left as `%(ext)s`).
    pub output_template: String,
    /// Optional rate limit such as `500K` or `2M`.
    pub rate_limit: Option<String>,
    /// Post-process step for audio jobs.
    pub audio_conversion: Option<AudioConversion>,
}

impl DownloadOptions {
    /// Map a request onto extractor options.
    #[must_use]
    pub fn for_request(
        request: &DownloadRequest,
        output_template: String,
        rate_limit: Option<String>,
    ) -> Self {
        let audio_conversion = match (request.format, request.quality) {
            (MediaFormat::Audio, Quality::Bitrate(kbps)) => Some(AudioConversion {
                codec: "mp3".to_string(),
                bitrate_kbps: kbps,
            }),
            _ => None,
        };

        Self {
            format_selector: format_selector(request.format, request.quality),
            output_template,
            rate_limit: rate_limit.filter(|limit| !limit.trim().is_empty()),
            audio_conversion,
        }
    }

    /// Whether the transcoding binary is needed for this download.
    #[must_use]
    pub const fn requires_transcoder(&self) -> bool {
        self.audio_conversion.is_some()
    }
}

/// Format selector string for a format/quality pair.
#[must_use]
pub fn format_selector(format: MediaFormat, quality: Quality) -> String {
    match (format, quality) {
        (MediaFormat::Audio, _) => "bestaudio/best".to_string(),
        (MediaFormat::Video, Quality::MaxHeight(height)) => format!(
            "bestvideo[height<={height}][ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4][height<={height}]"
        ),
        (MediaFormat::Video, _) => {
            "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string()
        }
    }
}

/// Raw progress notification from the extraction client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Bytes are being transferred. Totals may be missing or estimated.
    Downloading {
        /// Bytes received so far.
        downloaded_bytes: u64,
        /// Exact total, when the server reported it.
        total_bytes: Option<u64>,
        /// Estimated total, when only an estimate exists.
        total_bytes_estimate: Option<u64>,
    },
    /// One stream finished downloading.
    Finished,
    /// A post-processor (merge, audio extraction) is running.
    PostProcessing,
}

/// Progress callback handed to [`ExtractionClient::download`].
///
/// Returning an error (normally [`crate::Error::Cancelled`]) asks the client
/// to abort; the client must propagate that error unchanged.
pub type ProgressCallback<'a> = &'a mut (dyn FnMut(ProgressEvent) -> Result<()> + Send);

/// External extractor interface.
pub trait ExtractionClient: Send + Sync {
    /// Probe a source for its title and id, and for its entries when
    /// `scope` is [`ProbeScope::FlatPlaylist`].
    fn probe(&self, url: &str, scope: ProbeScope) -> Result<MediaInfo>;

    /// Download a source, reporting progress through `on_progress`.
    fn download(
        &self,
        url: &str,
        options: &DownloadOptions,
        on_progress: ProgressCallback<'_>,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_request_maps_to_mp3_extraction() {
        let request = DownloadRequest::audio("https://example.com/a", "192kbps").unwrap();
        let options = DownloadOptions::for_request(&request, "/out/a.%(ext)s".into(), None);

        assert_eq!(options.format_selector, "bestaudio/best");
        assert_eq!(
            options.audio_conversion,
            Some(AudioConversion {
                codec: "mp3".to_string(),
                bitrate_kbps: 192,
            })
        );
        assert!(options.requires_transcoder());
    }

    #[test]
    fn test_video_best_selector() {
        let request = DownloadRequest::video("https://example.com/v", "Best").unwrap();
        let options = DownloadOptions::for_request(&request, "/out/v.%(ext)s".into(), None);

        assert_eq!(
            options.format_selector,
            "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best"
        );
        assert!(options.audio_conversion.is_none());
        assert!(!options.requires_transcoder());
    }

    #[test]
    fn test_video_height_selector() {
        assert_eq!(
            format_selector(MediaFormat::Video, Quality::MaxHeight(720)),
            "bestvideo[height<=720][ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4][height<=720]"
        );
    }

    #[test]
    fn test_blank_rate_limit_is_dropped() {
        let request = DownloadRequest::video("https://example.com/v", "480p").unwrap();
        let options =
            DownloadOptions::for_request(&request, "t".into(), Some("   ".to_string()));
        assert_eq!(options.rate_limit, None);

        let options = DownloadOptions::for_request(&request, "t".into(), Some("2M".to_string()));
        assert_eq!(options.rate_limit.as_deref(), Some("2M"));
    }
}

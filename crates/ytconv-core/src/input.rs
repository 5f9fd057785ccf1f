//! User input: pasted URL lists, per-site presets and playlist expansion.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::extractor::{ExtractionClient, PlaylistEntry, ProbeScope};
use crate::job::{DownloadRequest, MediaFormat, Quality};

/// Split pasted text into URLs, one per line, dropping blank lines.
#[must_use]
pub fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Site a batch of URLs comes from. Each site has its own format presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// YouTube: user picks format and quality; playlists supported.
    #[default]
    YouTube,
    /// Facebook videos and reels: always best MP4.
    Facebook,
    /// Instagram videos and reels: always best MP4.
    Instagram,
    /// Any other site the extractor supports.
    Other,
}

impl SourceKind {
    /// Format used when the user does not pick one.
    #[must_use]
    pub const fn default_format(self) -> MediaFormat {
        match self {
            Self::YouTube => MediaFormat::Audio,
            Self::Facebook | Self::Instagram | Self::Other => MediaFormat::Video,
        }
    }

    /// Quality used when the user does not pick one.
    #[must_use]
    pub const fn default_quality(self, format: MediaFormat) -> Quality {
        match (self, format) {
            (Self::YouTube, MediaFormat::Video) => Quality::MaxHeight(720),
            (Self::Facebook | Self::Instagram, _) => Quality::Best,
            _ => Quality::default_for(format),
        }
    }

    /// Whether playlist expansion is offered for this site.
    #[must_use]
    pub const fn supports_playlists(self) -> bool {
        matches!(self, Self::YouTube | Self::Other)
    }

    /// Resolve the effective format and quality for this site.
    ///
    /// Facebook and Instagram ignore the requested values.
    pub fn resolve(
        self,
        format: Option<MediaFormat>,
        quality: Option<&str>,
    ) -> Result<(MediaFormat, Quality)> {
        if matches!(self, Self::Facebook | Self::Instagram) {
            if format == Some(MediaFormat::Audio) || quality.is_some() {
                warn!("{self} downloads are always best-quality MP4, ignoring requested format");
            }
            return Ok((MediaFormat::Video, Quality::Best));
        }

        let format = format.unwrap_or_else(|| self.default_format());
        let quality = match quality {
            Some(label) => Quality::parse(format, label)?,
            None => self.default_quality(format),
        };
        Ok((format, quality))
    }

    /// Build requests for a batch of URLs from this site.
    pub fn requests(
        self,
        urls: &[String],
        format: Option<MediaFormat>,
        quality: Option<&str>,
    ) -> Result<Vec<DownloadRequest>> {
        let (format, quality) = self.resolve(format, quality)?;
        urls.iter()
            .map(|url| DownloadRequest::new(url.clone(), format, quality))
            .collect()
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::YouTube => write!(f, "YouTube"),
            Self::Facebook => write!(f, "Facebook"),
            Self::Instagram => write!(f, "Instagram"),
            Self::Other => write!(f, "Other"),
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "youtube" | "yt" => Ok(Self::YouTube),
            "facebook" | "fb" => Ok(Self::Facebook),
            "instagram" | "ig" => Ok(Self::Instagram),
            "other" => Ok(Self::Other),
            other => Err(Error::InvalidInput(format!("unknown source '{other}'"))),
        }
    }
}

/// Pick the single playlist URL out of a pasted list.
///
/// Playlist mode takes exactly one URL at a time.
pub fn single_playlist_url(urls: &[String]) -> Result<&str> {
    match urls {
        [url] => Ok(url.as_str()),
        [] => Err(Error::InvalidInput("no playlist URL given".to_string())),
        _ => Err(Error::InvalidInput(
            "enter only one playlist URL at a time".to_string(),
        )),
    }
}

/// List the entries of a playlist-like source without downloading anything.
pub fn expand_playlist(client: &dyn ExtractionClient, url: &str) -> Result<Vec<PlaylistEntry>> {
    let info = client.probe(url, ProbeScope::FlatPlaylist)?;
    let entries = info
        .entries
        .filter(|entries| !entries.is_empty())
        .ok_or_else(|| Error::Probe("no entries".to_string()))?;

    info!(
        url,
        playlist = %info.title,
        count = entries.len(),
        "Expanded playlist"
    );
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{DownloadOptions, MediaInfo, ProgressCallback};

    struct StaticClient(MediaInfo);

    impl ExtractionClient for StaticClient {
        fn probe(&self, _url: &str, scope: ProbeScope) -> Result<MediaInfo> {
            assert_eq!(scope, ProbeScope::FlatPlaylist);
            Ok(self.0.clone())
        }

        fn download(
            &self,
            _url: &str,
            _options: &DownloadOptions,
            _on_progress: ProgressCallback<'_>,
        ) -> Result<()> {
            unreachable!("expansion never downloads")
        }
    }

    fn info(entries: Option<Vec<PlaylistEntry>>) -> MediaInfo {
        MediaInfo {
            id: "PL1".to_string(),
            title: "Mix".to_string(),
            entries,
        }
    }

    #[test]
    fn test_parse_url_list_drops_blank_lines() {
        let text = "  https://a\n\n\t\nhttps://b  \r\n   ";
        assert_eq!(parse_url_list(text), vec!["https://a", "https://b"]);
        assert!(parse_url_list("\n  \n").is_empty());
    }

    #[test]
    fn test_social_sources_force_best_video() {
        for source in [SourceKind::Facebook, SourceKind::Instagram] {
            let resolved = source
                .resolve(Some(MediaFormat::Audio), Some("320kbps"))
                .unwrap();
            assert_eq!(resolved, (MediaFormat::Video, Quality::Best));
            assert!(!source.supports_playlists());
        }
    }

    #[test]
    fn test_other_source_defaults() {
        assert_eq!(
            SourceKind::Other.resolve(Some(MediaFormat::Audio), None).unwrap(),
            (MediaFormat::Audio, Quality::Bitrate(192))
        );
        assert_eq!(
            SourceKind::Other.resolve(None, None).unwrap(),
            (MediaFormat::Video, Quality::Best)
        );
    }

    #[test]
    fn test_youtube_honours_choice() {
        assert_eq!(
            SourceKind::YouTube.resolve(None, None).unwrap(),
            (MediaFormat::Audio, Quality::Bitrate(192))
        );
        assert_eq!(
            SourceKind::YouTube
                .resolve(Some(MediaFormat::Video), None)
                .unwrap(),
            (MediaFormat::Video, Quality::MaxHeight(720))
        );
        assert_eq!(
            SourceKind::YouTube
                .resolve(Some(MediaFormat::Video), Some("1080p"))
                .unwrap(),
            (MediaFormat::Video, Quality::MaxHeight(1080))
        );
        assert!(
            SourceKind::YouTube
                .resolve(Some(MediaFormat::Audio), Some("720p"))
                .is_err()
        );
    }

    #[test]
    fn test_requests_for_batch() {
        let urls = parse_url_list("https://a\nhttps://b");
        let requests = SourceKind::Facebook.requests(&urls, None, None).unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.format == MediaFormat::Video));
        assert_eq!(requests[1].url, "https://b");
    }

    #[test]
    fn test_source_kind_from_str() {
        assert_eq!("YouTube".parse::<SourceKind>().unwrap(), SourceKind::YouTube);
        assert_eq!("ig".parse::<SourceKind>().unwrap(), SourceKind::Instagram);
        assert!("tiktok".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_single_playlist_url() {
        let one = vec!["https://list".to_string()];
        assert_eq!(single_playlist_url(&one).unwrap(), "https://list");
        assert!(single_playlist_url(&[]).is_err());
        let two = vec!["a".to_string(), "b".to_string()];
        assert!(single_playlist_url(&two).is_err());
    }

    #[test]
    fn test_expand_playlist_returns_entries() {
        let entries = vec![
            PlaylistEntry {
                url: "https://a".to_string(),
                title: Some("A".to_string()),
            },
            PlaylistEntry {
                url: "https://b".to_string(),
                title: None,
            },
        ];
        let client = StaticClient(info(Some(entries.clone())));
        assert_eq!(expand_playlist(&client, "https://list").unwrap(), entries);
    }

    #[test]
    fn test_expand_playlist_without_entries_fails() {
        for entries in [None, Some(Vec::new())] {
            let client = StaticClient(info(entries));
            let err = expand_playlist(&client, "https://list").unwrap_err();
            assert!(matches!(err, Error::Probe(ref msg) if msg == "no entries"));
        }
    }
}

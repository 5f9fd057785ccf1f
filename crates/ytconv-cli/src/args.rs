//! Command line arguments.

use std::fs;
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use ytconv_core::{AppConfig, Error, MediaFormat, PostQueueAction, Result, SourceKind, parse_url_list};

/// Download audio and video through a bounded download queue.
#[derive(Debug, Parser)]
#[command(name = "ytconv", version, about)]
pub struct Cli {
    /// Media URLs to download
    pub urls: Vec<String>,

    /// Read more URLs from a file, one per line
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Output format: audio (MP3) or video (MP4)
    #[arg(short, long)]
    pub format: Option<MediaFormat>,

    /// Quality label, e.g. 192kbps, 720p or best
    #[arg(short, long)]
    pub quality: Option<String>,

    /// Site preset: youtube, facebook, instagram or other
    #[arg(short, long, default_value_t = SourceKind::YouTube)]
    pub source: SourceKind,

    /// Treat the single URL as a playlist and download every entry
    #[arg(long)]
    pub playlist: bool,

    /// Maximum simultaneous downloads (1-20)
    #[arg(short, long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Download rate limit, e.g. 500K or 2M
    #[arg(long, value_name = "RATE")]
    pub rate_limit: Option<String>,

    /// What to do once every download finished: none, shutdown or sleep
    #[arg(long, value_name = "ACTION")]
    pub after: Option<PostQueueAction>,

    /// Directory for finished files
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Store the effective settings in the config file
    #[arg(long)]
    pub save_config: bool,

    /// Print queue events as JSON lines
    #[arg(long)]
    pub json: bool,

    /// More console logging (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Config file this run reads and, with `--save-config`, writes.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(AppConfig::config_file_path)
    }

    /// Apply command line overrides on top of the loaded settings.
    pub fn apply_overrides(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(n) = self.concurrency {
            config.queue.max_concurrent_downloads = n;
        }
        if let Some(limit) = &self.rate_limit {
            config.rate_limit = Some(limit.clone());
        }
        if let Some(action) = self.after {
            config.post_queue_action = action;
        }
        if let Some(dir) = &self.output_dir {
            config.output_directory = Some(dir.clone());
        }
        config.validate()
    }

    /// URLs from the arguments followed by those in `--input`.
    pub fn collect_urls(&self) -> Result<Vec<String>> {
        let mut urls: Vec<String> = self
            .urls
            .iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .map(ToString::to_string)
            .collect();

        if let Some(path) = &self.input {
            let text = fs::read_to_string(path).map_err(|e| Error::FileSystem {
                path: path.clone(),
                message: format!("Failed to read URL list: {e}"),
            })?;
            urls.extend(parse_url_list(&text));
        }
        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ytconv_core::MAX_CONCURRENT_DOWNLOADS;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ytconv").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["https://youtu.be/a"]);
        assert_eq!(cli.source, SourceKind::YouTube);
        assert!(cli.format.is_none());
        assert!(!cli.playlist);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_value_parsing() {
        let cli = parse(&[
            "-f", "video", "-q", "1080p", "--source", "ig", "--after", "sleep", "-vv", "u",
        ]);
        assert_eq!(cli.format, Some(MediaFormat::Video));
        assert_eq!(cli.quality.as_deref(), Some("1080p"));
        assert_eq!(cli.source, SourceKind::Instagram);
        assert_eq!(cli.after, Some(PostQueueAction::Sleep));
        assert_eq!(cli.verbose, 2);

        assert!(Cli::try_parse_from(["ytconv", "--after", "reboot"]).is_err());
        assert!(Cli::try_parse_from(["ytconv", "--format", "flac"]).is_err());
    }

    #[test]
    fn test_overrides_are_validated() {
        let mut config = AppConfig::default();
        parse(&["-c", "50", "--rate-limit", "2M"])
            .apply_overrides(&mut config)
            .unwrap();
        assert_eq!(config.queue.max_concurrent_downloads, MAX_CONCURRENT_DOWNLOADS);
        assert_eq!(config.rate_limit.as_deref(), Some("2M"));

        let mut config = AppConfig::default();
        assert!(
            parse(&["--rate-limit", "fast"])
                .apply_overrides(&mut config)
                .is_err()
        );
    }

    #[test]
    fn test_collect_urls_merges_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("urls.txt");
        fs::write(&list, "https://b\n\n  https://c  \n").unwrap();

        let cli = parse(&["https://a", " ", "--input", list.to_str().unwrap()]);
        assert_eq!(
            cli.collect_urls().unwrap(),
            vec!["https://a", "https://b", "https://c"]
        );
    }

    #[test]
    fn test_collect_urls_missing_input_file() {
        let cli = parse(&["--input", "/definitely/not/here.txt"]);
        assert!(matches!(
            cli.collect_urls(),
            Err(Error::FileSystem { .. })
        ));
    }
}

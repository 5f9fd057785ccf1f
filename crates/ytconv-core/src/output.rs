//! Output directory and file naming.
//!
//! All jobs write into one shared directory. Each job derives its own file
//! name from the sanitized title, so concurrent writers never touch the same
//! path; [`OutputDirectory::reserve`] also keeps two in-flight jobs with the
//! same title apart.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Subfolder created inside the platform download directory.
pub const OUTPUT_SUBFOLDER: &str = "YTConverter";

/// Relative folder used when no download directory can be determined.
pub const FALLBACK_OUTPUT_FOLDER: &str = "YTConverter_Downloads";

/// Maximum length of a sanitized title, in characters.
pub const MAX_TITLE_LEN: usize = 80;

/// Characters that are unsafe in file names on at least one platform.
const UNSAFE_CHARS: [char; 9] = ['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Get the default output directory (`<Downloads>/YTConverter`).
#[must_use]
pub fn default_output_directory() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .map_or_else(
            || PathBuf::from(FALLBACK_OUTPUT_FOLDER),
            |downloads| downloads.join(OUTPUT_SUBFOLDER),
        )
}

/// Sanitize a media title for use as a file stem.
///
/// Strips path-unsafe and non-ASCII characters, trims whitespace and
/// truncates to [`MAX_TITLE_LEN`].
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control() && !UNSAFE_CHARS.contains(c))
        .collect();

    let trimmed = cleaned.trim();
    // ASCII only from here, so byte slicing is char-safe.
    let truncated = if trimmed.len() > MAX_TITLE_LEN {
        trimmed[..MAX_TITLE_LEN].trim()
    } else {
        trimmed
    };

    // Leading/trailing dots confuse some file systems
    truncated.trim_matches('.').trim().to_string()
}

/// File stem for a job: the sanitized title, or the sanitized source id when
/// the title sanitizes to nothing.
#[must_use]
pub fn file_stem(title: &str, fallback_id: &str) -> String {
    let stem = sanitize_title(title);
    if !stem.is_empty() {
        return stem;
    }
    let id = sanitize_title(fallback_id);
    if id.is_empty() {
        "download".to_string()
    } else {
        id
    }
}

/// The shared destination directory plus the names currently reserved by
/// in-flight jobs.
#[derive(Debug)]
pub struct OutputDirectory {
    root: PathBuf,
    reserved: Mutex<HashSet<PathBuf>>,
}

impl OutputDirectory {
    /// Use `root`, creating it if needed.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::FileSystem {
            path: root.clone(),
            message: format!("Failed to create output directory: {e}"),
        })?;
        debug!("Output directory ready: {}", root.display());
        Ok(Self {
            root,
            reserved: Mutex::new(HashSet::new()),
        })
    }

    /// Resolve the configured directory, or the platform default.
    ///
    /// Falls back to [`FALLBACK_OUTPUT_FOLDER`] when the preferred location
    /// cannot be created.
    pub fn resolve(configured: Option<&Path>) -> Result<Self> {
        let preferred = configured.map_or_else(default_output_directory, Path::to_path_buf);
        match Self::create(&preferred) {
            Ok(dir) => {
                info!("Saving downloads to {}", dir.root.display());
                Ok(dir)
            }
            Err(e) => {
                warn!("{e}; falling back to {FALLBACK_OUTPUT_FOLDER}");
                Self::create(FALLBACK_OUTPUT_FOLDER)
            }
        }
    }

    /// The directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Reserve a collision-free path `<stem>.<ext>` for a job.
    ///
    /// A name is taken if the file already exists or another job holds it;
    /// in that case ` (1)`, ` (2)`, ... is appended to the stem.
    pub fn reserve(&self, title: &str, fallback_id: &str, extension: &str) -> PathBuf {
        let stem = file_stem(title, fallback_id);
        let mut reserved = self.reserved.lock().unwrap_or_else(PoisonError::into_inner);

        let mut candidate = self.root.join(format!("{stem}.{extension}"));
        let mut counter = 1;
        while candidate.exists() || reserved.contains(&candidate) {
            candidate = self.root.join(format!("{stem} ({counter}).{extension}"));
            counter += 1;
        }

        reserved.insert(candidate.clone());
        candidate
    }

    /// Release a reservation once the job is finished.
    pub fn release(&self, path: &Path) {
        self.reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }
}

/// Build the extraction client's output template for a reserved path.
///
/// The extension is left to the client (`%(ext)s`) since intermediate
/// streams differ from the final artifact. Literal `%` is escaped.
#[must_use]
pub fn output_template(reserved: &Path) -> String {
    let stem = reserved.with_extension("");
    format!("{}.%(ext)s", stem.to_string_lossy().replace('%', "%%"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_strips_unsafe_characters() {
        let sanitized = sanitize_title("My: Video? <Title>");
        assert_eq!(sanitized, "My Video Title");
        for c in UNSAFE_CHARS {
            assert!(!sanitized.contains(c));
        }
    }

    #[test]
    fn test_sanitize_truncates_long_titles() {
        let long = "a".repeat(200);
        assert_eq!(sanitize_title(&long).len(), MAX_TITLE_LEN);

        let spaced = format!("{} tail", "b".repeat(79));
        let sanitized = sanitize_title(&spaced);
        assert!(sanitized.len() <= MAX_TITLE_LEN);
        assert!(!sanitized.ends_with(' '));
    }

    #[test]
    fn test_sanitize_drops_non_ascii() {
        assert_eq!(sanitize_title("Café — Ñandú"), "Caf  and");
        assert_eq!(sanitize_title("日本語"), "");
    }

    #[test]
    fn test_file_stem_falls_back_to_id() {
        assert_eq!(file_stem("???", "dQw4w9WgXcQ"), "dQw4w9WgXcQ");
        assert_eq!(file_stem("日本語", "abc123"), "abc123");
        assert_eq!(file_stem("", ""), "download");
        assert_eq!(file_stem("Song", "id"), "Song");
    }

    #[test]
    fn test_reserve_avoids_existing_and_reserved_names() {
        let temp = TempDir::new().expect("Should create temp dir");
        let dir = OutputDirectory::create(temp.path()).expect("Should create output dir");

        fs::write(temp.path().join("Song.mp3"), b"existing").expect("Should write");

        let first = dir.reserve("Song", "id1", "mp3");
        assert_eq!(first, temp.path().join("Song (1).mp3"));

        let second = dir.reserve("Song", "id2", "mp3");
        assert_eq!(second, temp.path().join("Song (2).mp3"));

        dir.release(&first);
        let third = dir.reserve("Song", "id3", "mp3");
        assert_eq!(third, temp.path().join("Song (1).mp3"));
    }

    #[test]
    fn test_create_makes_nested_directories() {
        let temp = TempDir::new().expect("Should create temp dir");
        let nested = temp.path().join("a").join(OUTPUT_SUBFOLDER);
        let dir = OutputDirectory::create(&nested).expect("Should create output dir");
        assert!(nested.is_dir());
        assert_eq!(dir.path(), nested);
    }

    #[test]
    fn test_output_template_replaces_extension() {
        let template = output_template(Path::new("/tmp/out/My Song.mp3"));
        assert_eq!(template, "/tmp/out/My Song.%(ext)s");

        let escaped = output_template(Path::new("/tmp/out/100% Hits (1).mp3"));
        assert_eq!(escaped, "/tmp/out/100%% Hits (1).%(ext)s");
    }

    #[test]
    fn test_default_output_directory_ends_with_subfolder() {
        let dir = default_output_directory();
        assert!(dir.ends_with(OUTPUT_SUBFOLDER) || dir.ends_with(FALLBACK_OUTPUT_FOLDER));
    }
}

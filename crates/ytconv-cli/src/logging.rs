//! Structured logging for the command line front-end.
//!
//! Console output goes to stderr so it never interleaves with the job
//! listing on stdout. A second layer writes JSON lines to a file that
//! rotates daily.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Crates whose events pass the default filters.
const OWN_TARGETS: [&str; 2] = ["ytconv", "ytconv_core"];

/// Logging configuration options.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory where log files are stored.
    pub log_directory: PathBuf,
    /// Log file name prefix ("ytconv" -> "ytconv.2026-01-15").
    pub log_file_prefix: String,
    /// Maximum level for console output of our own crates.
    pub console_level: Level,
    /// Maximum level for file output of our own crates.
    pub file_level: Level,
    /// Whether to include ANSI color codes in console output.
    pub console_ansi: bool,
    /// Whether to include file/line info in console logs.
    pub include_file_line: bool,
    /// Whether to log span events (enter/exit).
    pub log_span_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LoggingConfig {
    /// Verbose logging for local debugging.
    #[must_use]
    pub fn development() -> Self {
        Self {
            log_directory: default_log_directory(),
            log_file_prefix: "ytconv".to_string(),
            console_level: Level::DEBUG,
            file_level: Level::TRACE,
            console_ansi: true,
            include_file_line: true,
            log_span_events: true,
        }
    }

    /// Warnings on the console, details in the file.
    #[must_use]
    pub fn production() -> Self {
        Self {
            log_directory: default_log_directory(),
            log_file_prefix: "ytconv".to_string(),
            console_level: Level::WARN,
            file_level: Level::DEBUG,
            console_ansi: true,
            include_file_line: false,
            log_span_events: false,
        }
    }

    /// Pick a preset from the build type.
    #[must_use]
    pub fn auto() -> Self {
        if cfg!(debug_assertions) {
            Self::development()
        } else {
            Self::production()
        }
    }

    /// Raise console output for `-v` (info) and `-vv` (debug).
    ///
    /// Never lowers a preset that is already more verbose.
    #[must_use]
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        let requested = match verbose {
            0 => return self,
            1 => Level::INFO,
            _ => Level::DEBUG,
        };
        self.console_level = self.console_level.max(requested);
        self
    }
}

/// Guard that keeps file logging active. Drop this to flush and close log files.
pub struct LoggingGuard {
    _file_guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Initialize the logging system with the given configuration.
///
/// Returns a guard that must be kept alive for the duration of the process.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a subscriber
/// is already installed.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    if !config.log_directory.exists() {
        std::fs::create_dir_all(&config.log_directory).map_err(|e| {
            LoggingError::DirectoryCreationFailed {
                path: config.log_directory.clone(),
                reason: e.to_string(),
            }
        })?;
    }

    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        &config.log_directory,
        &config.log_file_prefix,
    );
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG overrides the console filter
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config.console_level)));
    let file_filter = EnvFilter::new(filter_directives(config.file_level));

    let span_events = if config.log_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.console_ansi)
        .with_target(false)
        .with_file(config.include_file_line)
        .with_line_number(config.include_file_line)
        .with_span_events(span_events.clone())
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .json()
        .with_filter(file_filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Get the default log directory.
#[must_use]
pub fn default_log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ytconv")
        .join("logs")
}

/// Filter that lets dependencies speak at `warn` and our crates at `level`.
fn filter_directives(level: Level) -> String {
    let level = level_to_directive(level);
    OWN_TARGETS
        .iter()
        .fold("warn".to_string(), |acc, target| format!("{acc},{target}={level}"))
}

/// Convert a tracing Level to a filter directive string.
const fn level_to_directive(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

/// Errors that can occur during logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Failed to create the log directory.
    #[error("Failed to create log directory {path}: {reason}")]
    DirectoryCreationFailed {
        /// The path that could not be created.
        path: PathBuf,
        /// The reason for the failure.
        reason: String,
    },
    /// A global subscriber was already set.
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_production() {
        let config = LoggingConfig::default();
        assert_eq!(config.console_level, Level::WARN);
        assert_eq!(config.file_level, Level::DEBUG);
    }

    #[test]
    fn test_development_config() {
        let config = LoggingConfig::development();
        assert_eq!(config.console_level, Level::DEBUG);
        assert_eq!(config.file_level, Level::TRACE);
        assert!(config.include_file_line);
        assert!(config.log_span_events);
    }

    #[test]
    fn test_verbosity_raises_console_level() {
        let config = LoggingConfig::production().with_verbosity(1);
        assert_eq!(config.console_level, Level::INFO);
        assert_eq!(config.file_level, Level::DEBUG);

        let config = LoggingConfig::production().with_verbosity(3);
        assert_eq!(config.console_level, Level::DEBUG);

        assert_eq!(
            LoggingConfig::production().with_verbosity(0).console_level,
            Level::WARN
        );
    }

    #[test]
    fn test_verbosity_never_lowers_development_level() {
        let config = LoggingConfig::development().with_verbosity(1);
        assert_eq!(config.console_level, Level::DEBUG);
    }

    #[test]
    fn test_init_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            log_directory: dir.path().join("nested").join("logs"),
            ..LoggingConfig::production()
        };
        // Another test may already own the global subscriber
        let result = init(&config);
        assert!(config.log_directory.is_dir());
        if let Err(e) = result {
            assert!(matches!(e, LoggingError::AlreadyInitialized(_)));
        }
    }

    #[test]
    fn test_filter_directives() {
        assert_eq!(
            filter_directives(Level::DEBUG),
            "warn,ytconv=debug,ytconv_core=debug"
        );
    }

    #[test]
    fn test_default_log_directory() {
        let dir = default_log_directory();
        assert!(dir.ends_with("ytconv/logs"));
    }
}

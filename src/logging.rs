//! Logging setup using `tracing` and `tracing-subscriber`.
//!
//! - `error`: files that failed to load, rows that failed after the key pre-check
//! - `warn`: skipped files, discarded rows, searches without matches
//! - `info`: stage progress and per-file summaries
//! - `debug`: generated SQL, padded rows, progress steps

use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How and where log events are written
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    /// Write to stderr; off while the terminal UI owns the screen
    pub console: bool,
    pub with_ansi: bool,
    /// Append events to this file as well
    pub log_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            console: true,
            with_ansi: true,
            log_file: None,
        }
    }
}

impl LogConfig {
    /// Map `-v` occurrences to a level: none is warn, then info, debug, trace
    #[must_use]
    pub fn from_verbosity(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            level,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_console(mut self, enable: bool) -> Self {
        self.console = enable;
        self
    }

    #[must_use]
    pub fn with_log_file(mut self, path: Option<PathBuf>) -> Self {
        self.log_file = path;
        self
    }

    /// Directive used when `RUST_LOG` is not set
    pub fn default_directive(&self) -> String {
        let level = self.level.as_str().to_lowercase();
        format!("warn,vehicle_tg_to_sqlite={}", level)
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));

    let console = config.console.then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_ansi(config.with_ansi)
            .with_target(false)
            .without_time()
    });

    let file = match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_verbosity() {
        assert_eq!(LogConfig::from_verbosity(0).level, Level::WARN);
        assert_eq!(LogConfig::from_verbosity(1).level, Level::INFO);
        assert_eq!(LogConfig::from_verbosity(2).level, Level::DEBUG);
        assert_eq!(LogConfig::from_verbosity(9).level, Level::TRACE);
    }

    #[test]
    fn test_default_directive() {
        let config = LogConfig::from_verbosity(2);
        assert_eq!(config.default_directive(), "warn,vehicle_tg_to_sqlite=debug");
    }

    #[test]
    fn test_tui_disables_console() {
        let config = LogConfig::from_verbosity(1)
            .with_console(false)
            .with_log_file(Some(PathBuf::from("import.log")));
        assert!(!config.console);
        assert_eq!(config.log_file.as_deref(), Some(std::path::Path::new("import.log")));
    }
}

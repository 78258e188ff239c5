//! Logging setup for the command line
//!
//! Console output goes to stderr so stdout stays clean for results; an
//! optional JSON layer writes to a daily rolling file for bug reports.

use crate::config::{LoggingSection, log_directory};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Directory where JSON log files are written
    pub log_dir: PathBuf,
    /// Whether to write JSON logs to files
    pub enable_json_logs: bool,
    /// Whether to log to stderr
    pub enable_console_logs: bool,
    /// Whether to include file/line information in console logs
    pub include_location: bool,
    /// Default log level filter, overridden by `RUST_LOG`
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from_section(&LoggingSection::default())
    }
}

impl LoggingConfig {
    /// Builds the logging setup from the `[logging]` config section
    pub fn from_section(section: &LoggingSection) -> Self {
        Self {
            log_dir: section.log_dir.clone().unwrap_or_else(log_directory),
            enable_json_logs: section.json_file,
            enable_console_logs: true,
            include_location: cfg!(debug_assertions),
            default_filter: section.filter.clone(),
        }
    }

    /// Verbose console output, no files
    pub fn verbose() -> Self {
        Self {
            enable_json_logs: false,
            include_location: true,
            default_filter: "debug".to_string(),
            ..Self::default()
        }
    }

    /// Replaces the default filter
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }
}

/// Installs the global subscriber
pub fn init(config: LoggingConfig) -> anyhow::Result<()> {
    // RUST_LOG takes precedence over the configured filter
    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_filter))
    };

    let mut layers = Vec::new();

    if config.enable_console_logs {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(std::io::stderr)
            .with_filter(env_filter())
            .boxed();

        layers.push(console_layer);
    }

    if config.enable_json_logs {
        std::fs::create_dir_all(&config.log_dir)?;

        let file_appender = tracing_appender::rolling::daily(&config.log_dir, "pgexplain.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // The guard flushes on drop and must live as long as the process
        std::mem::forget(guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_writer(non_blocking)
            .with_filter(env_filter())
            .boxed();

        layers.push(json_layer);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::debug!(
        log_dir = %config.log_dir.display(),
        json_enabled = config.enable_json_logs,
        console_enabled = config.enable_console_logs,
        "Logging initialized"
    );

    Ok(())
}

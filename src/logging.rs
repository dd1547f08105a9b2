//! Tracing setup.
//!
//! The library only emits `tracing` events; binaries pick a subscriber here.
//! Three output formats are supported (pretty, compact, JSON), all written to
//! stderr so command output on stdout stays machine-readable. `RUST_LOG`
//! overrides the configured level when set.
//!
//! # Example
//! ```no_run
//! use scpi_instrument::logging::{self, LoggingConfig, OutputFormat};
//! use tracing::Level;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! logging::init(LoggingConfig::new(Level::DEBUG).with_format(OutputFormat::Json))?;
//! tracing::info!(instrument = "dmm", "Connected");
//! # Ok(())
//! # }
//! ```

use crate::config::Settings;
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Output format for log events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Multi-line format with colors (for development)
    Pretty,
    /// Single-line format (the default)
    #[default]
    Compact,
    /// JSON lines for log aggregation
    Json,
}

/// Logging configuration options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: Level,
    /// Output format
    pub format: OutputFormat,
    /// Whether to include file and line numbers
    pub with_file_and_line: bool,
    /// Whether to enable ANSI colors (not used for JSON)
    pub with_ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: OutputFormat::Compact,
            with_file_and_line: false,
            with_ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Logging config from loaded settings
    pub fn from_settings(settings: &Settings) -> Result<Self, String> {
        Ok(Self {
            level: parse_log_level(&settings.log_level)?,
            format: settings.log_format,
            ..Default::default()
        })
    }

    /// Logging config at `level` with default options
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Set output format
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable ANSI colors
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }
}

/// Initialize logging from settings
pub fn init_from_settings(settings: &Settings) -> Result<(), String> {
    init(LoggingConfig::from_settings(settings)?)
}

/// Initialize logging.
///
/// Idempotent: if a global subscriber is already installed this returns
/// `Ok(())`, so tests and embedding applications can call it freely.
pub fn init(config: LoggingConfig) -> Result<(), String> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(config.with_file_and_line)
        .with_line_number(config.with_file_and_line)
        .with_target(false);

    let result = match config.format {
        OutputFormat::Pretty => tracing_subscriber::registry()
            .with(layer.pretty().with_ansi(config.with_ansi).with_filter(env_filter))
            .try_init(),
        OutputFormat::Compact => tracing_subscriber::registry()
            .with(layer.compact().with_ansi(config.with_ansi).with_filter(env_filter))
            .try_init(),
        OutputFormat::Json => tracing_subscriber::registry()
            .with(layer.json().with_filter(env_filter))
            .try_init(),
    };

    result.or_else(|e| {
        // Already initialized is expected in tests
        if e.to_string().contains("global default trace dispatcher has already been set") {
            Ok(())
        } else {
            Err(format!("Failed to initialize logging: {}", e))
        }
    })
}

/// Parse log level string into tracing Level
pub fn parse_log_level(level: &str) -> Result<Level, String> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(format!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        )),
    }
}

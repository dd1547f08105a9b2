//! Application settings using Figment
//!
//! Settings are loaded from:
//! 1. a TOML file (default `config/scpi.toml`, optional)
//! 2. environment variables prefixed with `SCPI_`; nested keys use a double
//!    underscore, e.g. `SCPI_CONNECTION__TCP=192.168.1.50`
//!
//! # Example
//! ```no_run
//! use scpi_instrument::config::Settings;
//!
//! let settings = Settings::load()?;
//! settings.validate()?;
//! println!("log level: {}", settings.log_level);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::adapters::AdapterOptions;
use crate::logging::{self, OutputFormat};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default settings file.
pub const DEFAULT_CONFIG_PATH: &str = "config/scpi.toml";

/// Top-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: OutputFormat,
    /// Transport selection
    #[serde(default)]
    pub connection: ConnectionSettings,
    /// Model file; the built-in DM3058 table when absent
    #[serde(default)]
    pub model: Option<PathBuf>,
    /// Instrument option bag
    #[serde(default)]
    pub options: toml::Table,
}

/// Transport selection. At most one of `serial` and `tcp` may be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Serial port path
    #[serde(default)]
    pub serial: Option<String>,
    /// Serial baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// `host[:port]` of a raw SCPI socket
    #[serde(default)]
    pub tcp: Option<String>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            serial: None,
            baud_rate: default_baud_rate(),
            tcp: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: OutputFormat::default(),
            connection: ConnectionSettings::default(),
            model: None,
            options: toml::Table::new(),
        }
    }
}

impl Settings {
    /// Load settings from the default file and the environment
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load settings from a specific file and the environment.
    /// A missing file contributes nothing.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SCPI_").split("__"))
            .extract()
    }

    /// Validate settings after loading
    pub fn validate(&self) -> Result<(), String> {
        logging::parse_log_level(&self.log_level)?;

        if self.connection.serial.is_some() && self.connection.tcp.is_some() {
            return Err("connection: set either 'serial' or 'tcp', not both".to_string());
        }
        if self.connection.baud_rate == 0 {
            return Err("connection: baud_rate must be greater than 0".to_string());
        }

        AdapterOptions::from_table(&self.options).map_err(|e| format!("options: {}", e))?;
        Ok(())
    }
}

//! Startup configuration
//!
//! Everything can be set from the command line; a TOML file can provide the
//! same settings plus logging options, with flags taking precedence.

use crate::telemetry::LogConfig;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Runtime settings after merging file values and flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// NFQUEUE number to bind.
    pub queue_num: u16,
    /// Number of distinct marks to cycle through.
    pub marks: u32,
    /// Log each packet with interface, payload, and endpoint details.
    pub log_packet: bool,
    /// Log each mark selection.
    pub log_mark: bool,
    /// Logging setup.
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_num: 0,
            marks: 3,
            log_packet: false,
            log_mark: false,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Rejects settings that would make the mark arithmetic undefined.
    ///
    /// Runs once at startup so the per-packet path can assume a valid
    /// range.
    pub fn validate(&self) -> Result<()> {
        if self.marks == 0 {
            return Err(Error::Config(
                "marks must be at least 1 (a zero mark range leaves nothing to cycle through)"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from a TOML file.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    let config: Config = toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
    Ok(config)
}

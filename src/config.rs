//! Configuration module for Janus Cast
//!
//! Supports a JSON configuration file holding the dispatch settings (same
//! camelCase keys as the plugin property inspector) and the log/transport
//! policies.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transport::{DatagramOptions, StreamOptions};

/// Timeout used when the configured one is absent or not positive
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Dispatch settings
    #[serde(default)]
    pub settings: DispatchSettings,

    /// Log configuration
    #[serde(default)]
    pub log: LogConfig,

    /// TCP policy
    #[serde(default)]
    pub stream: StreamOptions,

    /// UDP policy
    #[serde(default)]
    pub datagram: DatagramOptions,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_json(&content)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Configuration with the plugin's defaults filled in
    pub fn default_settings() -> Self {
        Config {
            settings: DispatchSettings::default().with_defaults(),
            ..Config::default()
        }
    }
}

/// Raw, unvalidated dispatch fields as the user typed them
///
/// `port` and `type` stay loosely typed so that out-of-range or unknown
/// values reach validation and are reported instead of failing to parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSettings {
    pub name: Option<String>,

    /// Literal text, or a path to a file whose bytes are sent
    pub payload: Option<String>,

    /// Milliseconds; idle timeout for TCP replies, absolute for UDP
    pub timeout: Option<i64>,

    #[serde(rename = "type")]
    pub kind: Option<String>,

    pub ip: Option<String>,

    pub port: Option<i64>,

    /// Background image path restored after each dispatch
    pub bg_image: Option<String>,

    pub show_name: Option<bool>,
    pub show_ip: Option<bool>,
    pub show_port: Option<bool>,

    /// Wait for a reply (TCP idle wait / UDP single packet)
    pub expect_reply: Option<bool>,
}

impl DispatchSettings {
    /// Fill unset fields with the plugin defaults
    pub fn with_defaults(mut self) -> Self {
        self.name.get_or_insert_with(|| "Payload".to_string());
        self.ip.get_or_insert_with(|| "192.168.1.100".to_string());
        self.port.get_or_insert(1234);
        self.kind.get_or_insert_with(|| "TCP".to_string());
        self.timeout.get_or_insert(DEFAULT_TIMEOUT_MS as i64);
        self.show_name.get_or_insert(true);
        self.show_ip.get_or_insert(true);
        self.show_port.get_or_insert(true);
        self.derive_name();
        self
    }

    /// Name the button after the payload file when no name is set.
    /// Returns true when the name changed.
    pub fn derive_name(&mut self) -> bool {
        let has_name = self
            .name
            .as_deref()
            .map(|n| !n.trim().is_empty())
            .unwrap_or(false);
        if has_name {
            return false;
        }

        let stem = self.payload.as_deref().and_then(file_stem);
        match stem {
            Some(stem) => {
                self.name = Some(stem);
                true
            }
            None => false,
        }
    }

    /// Effective timeout in milliseconds
    pub fn timeout_ms(&self) -> u64 {
        match self.timeout {
            Some(ms) if ms > 0 => ms as u64,
            _ => DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn expect_reply(&self) -> bool {
        self.expect_reply.unwrap_or(true)
    }
}

/// Last path component without its extension, split on either separator
fn file_stem(payload: &str) -> Option<String> {
    let file = payload.rsplit(&['/', '\\'][..]).next().unwrap_or("");
    let stem = match file.rfind('.') {
        Some(dot) => &file[..dot],
        None => file,
    };
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

/// Log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory holding the rendered request log
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    /// File name of the rendered request log
    #[serde(default = "default_log_file")]
    pub file: String,

    /// Number of most recent records kept
    #[serde(default = "default_log_capacity")]
    pub capacity: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("janus-cast-logs")
}

fn default_log_file() -> String {
    "janus-cast-requests.html".to_string()
}

fn default_log_capacity() -> usize {
    crate::logstore::DEFAULT_CAPACITY
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
            file: default_log_file(),
            capacity: default_log_capacity(),
        }
    }
}

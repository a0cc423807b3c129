// src/config.rs
//! Optional JSON config (`flup-config.json` in the data directory).
//! Absence means built-in defaults; a malformed file is a hard error.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "flup-config.json";

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Rotate a live log to an archive once it reaches this many bytes.
    #[serde(default = "TrackerConfig::default_rotate_threshold_bytes")]
    pub rotate_threshold_bytes: u64,
    /// Chattier default log filter when set.
    #[serde(default)]
    pub verbose: bool,
    /// Whether the service pass drains `staged-amendments.jsonl`.
    #[serde(default = "TrackerConfig::default_true")]
    pub staging_enabled: bool,
    /// Advisory per-category lock around append-or-rotate. Disable only
    /// when a single writer is otherwise guaranteed.
    #[serde(default = "TrackerConfig::default_true")]
    pub locking_enabled: bool,
}

impl TrackerConfig {
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_str::<TrackerConfig>(&text)
                .with_context(|| format!("parsing config file {}", path.display()))
        } else {
            tracing::debug!(
                "no config file at {}, using built-in defaults",
                path.display()
            );
            Ok(TrackerConfig::default())
        }
    }

    fn default_rotate_threshold_bytes() -> u64 {
        512 * 1024
    }

    fn default_true() -> bool {
        true
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            rotate_threshold_bytes: Self::default_rotate_threshold_bytes(),
            verbose: false,
            staging_enabled: true,
            locking_enabled: true,
        }
    }
}

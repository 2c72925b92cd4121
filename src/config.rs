use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::GpxtxError;
use crate::gpx_types::WaypointFileType;

/// Generator definitions as read from the YAML config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenConfig {
    /// Seconds to wait between launching successive generators (default: 0)
    #[serde(default)]
    pub start_offset: u64,

    pub generators: Vec<GeneratorSpec>,
}

impl GenConfig {
    /// Load and validate a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GpxtxError> {
        let path = path.as_ref();
        let yml = std::fs::read_to_string(path).map_err(|source| GpxtxError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yml)
    }

    pub fn from_yaml(yml: &str) -> Result<Self, GpxtxError> {
        let cfg: Self = serde_yaml::from_str(yml)?;
        if cfg.generators.is_empty() {
            return Err(GpxtxError::NoGenerators);
        }
        Ok(cfg)
    }

    pub fn start_offset(&self) -> Duration {
        Duration::from_secs(self.start_offset)
    }
}

/// One simulated device.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorSpec {
    /// Label used in logs (default: empty)
    #[serde(default)]
    pub description: String,

    /// Seconds between sends (default: 1)
    #[serde(default = "default_frequency")]
    pub frequency: u64,

    pub waypoint_file: PathBuf,

    /// Which GPX points form the sequence (default: gpx)
    #[serde(default)]
    pub waypoint_file_type: WaypointFileType,

    /// Starting position into the waypoint sequence (default: 0)
    #[serde(default)]
    pub index_offset: usize,

    pub template: String,
}

impl GeneratorSpec {
    pub fn frequency(&self) -> Duration {
        Duration::from_secs(self.frequency)
    }
}

/// Settings shared read-only by every generator loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// `host:port` every message is sent to
    pub destination: String,
    /// Bound on each dial and each write; zero disables it
    pub timeout: Duration,
    /// Delay inserted between successive generator launches
    pub start_offset: Duration,
}

impl EngineConfig {
    pub fn new(destination: impl Into<String>, timeout: Duration) -> Self {
        Self {
            destination: destination.into(),
            timeout,
            start_offset: Duration::ZERO,
        }
    }

    pub fn with_start_offset(mut self, start_offset: Duration) -> Self {
        self.start_offset = start_offset;
        self
    }
}

fn default_frequency() -> u64 {
    1
}

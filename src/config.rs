//! Configuration for loading segment metadata.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Controls how `SegmentFileMeta` treats manifests that exist but cannot be read.
///
/// A missing manifest always means "no cached metadata". A manifest that is
/// present but unreadable is either a transient I/O failure (retried up to
/// `manifest_retry_count` times) or malformed content (governed by
/// `fallback_on_corrupt_manifest`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Number of re-attempts after an I/O error while reading an existing manifest.
    pub manifest_retry_count: u32,

    /// Pause between two manifest read attempts (in milliseconds).
    pub retry_interval_ms: u64,

    /// Degrade a malformed manifest or package meta to "no cached metadata"
    /// instead of returning a corruption error.
    pub fallback_on_corrupt_manifest: bool,

    /// Register `dir/` markers for ancestors the manifest did not list.
    pub synthesize_parent_directories: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        LoadConfig {
            manifest_retry_count: 2,
            retry_interval_ms: 10,
            fallback_on_corrupt_manifest: true,
            synthesize_parent_directories: true,
        }
    }
}

impl LoadConfig {
    /// Config that reports malformed manifests as errors and never retries.
    pub fn strict() -> Self {
        LoadConfig {
            manifest_retry_count: 0,
            fallback_on_corrupt_manifest: false,
            ..Default::default()
        }
    }

    /// Read a config from a JSON file. Missing keys take their default.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

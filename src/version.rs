//! Index versions: the ordered list of segments visible in a partition.

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SegmentError};
use crate::storage::Directory;

pub type SegmentId = i32;
pub type VersionId = i32;

pub const INVALID_SEGMENT_ID: SegmentId = -1;
pub const INVALID_VERSION_ID: VersionId = -1;

pub const VERSION_FILE_NAME_PREFIX: &str = "version";
pub const SEGMENT_FILE_NAME_PREFIX: &str = "segment";

/// Format from which segment directories carry a `_level_<n>` suffix.
pub const LEVEL_DIR_FORMAT_VERSION: u32 = 2;

lazy_static! {
    static ref VERSION_FILE_PATTERN: Regex = Regex::new(r"^version\.(\d+)$").unwrap();
}

/// A snapshot of the segments that make up one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    #[serde(rename = "versionid")]
    pub version_id: VersionId,

    #[serde(default)]
    pub segments: Vec<SegmentId>,

    #[serde(default)]
    pub timestamp: i64,

    #[serde(default)]
    pub locator: String,

    #[serde(default = "default_format_version")]
    pub format_version: u32,

    #[serde(default)]
    pub schema_version: u32,
}

fn default_format_version() -> u32 {
    LEVEL_DIR_FORMAT_VERSION
}

impl Default for Version {
    fn default() -> Self {
        Version::new(INVALID_VERSION_ID)
    }
}

impl Version {
    pub fn new(version_id: VersionId) -> Self {
        Version {
            version_id,
            segments: Vec::new(),
            timestamp: 0,
            locator: String::new(),
            format_version: LEVEL_DIR_FORMAT_VERSION,
            schema_version: 0,
        }
    }

    pub fn with_segments(version_id: VersionId, segments: &[SegmentId]) -> Self {
        let mut version = Version::new(version_id);
        version.segments = segments.to_vec();
        version
    }

    pub fn add_segment(&mut self, segment_id: SegmentId) {
        self.segments.push(segment_id);
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segment(&self, idx: usize) -> Option<SegmentId> {
        self.segments.get(idx).copied()
    }

    pub fn has_segment(&self, segment_id: SegmentId) -> bool {
        self.segments.contains(&segment_id)
    }

    pub fn is_valid(&self) -> bool {
        self.version_id != INVALID_VERSION_ID
    }

    /// Name of the directory holding `segment_id`.
    pub fn segment_dir_name(&self, segment_id: SegmentId) -> String {
        if self.format_version >= LEVEL_DIR_FORMAT_VERSION {
            format!("{SEGMENT_FILE_NAME_PREFIX}_{segment_id}_level_0")
        } else {
            format!("{SEGMENT_FILE_NAME_PREFIX}_{segment_id}")
        }
    }

    pub fn file_name(&self) -> String {
        version_file_name(self.version_id)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Load `version.<id>` from `directory`.
    pub fn load(directory: &dyn Directory, version_id: VersionId) -> Result<Self> {
        let file_name = version_file_name(version_id);
        let bytes = directory.load(&file_name)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            SegmentError::corruption(format!(
                "invalid version file [{}/{}]: {}",
                directory.root(),
                file_name,
                e
            ))
        })
    }

    /// Load the version with the highest id, `None` when the partition has
    /// no version yet.
    pub fn load_latest(directory: &dyn Directory) -> Result<Option<Self>> {
        let latest = directory
            .list_file("", false, true)?
            .iter()
            .filter_map(|name| parse_version_file_name(name))
            .max();
        match latest {
            Some(version_id) => {
                debug!("latest version of [{}] is {}", directory.root(), version_id);
                Self::load(directory, version_id).map(Some)
            }
            None => Ok(None),
        }
    }
}

pub fn version_file_name(version_id: VersionId) -> String {
    format!("{VERSION_FILE_NAME_PREFIX}.{version_id}")
}

/// Version id encoded in a `version.<id>` file name.
pub fn parse_version_file_name(name: &str) -> Option<VersionId> {
    VERSION_FILE_PATTERN
        .captures(name)
        .and_then(|caps| caps[1].parse().ok())
}

pub const SEGMENT_INFO_FILE_NAME: &str = "segment_info";

/// Content of the `segment_info` file of a segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    #[serde(default)]
    pub doc_count: u64,

    #[serde(default)]
    pub timestamp: i64,

    #[serde(default)]
    pub is_merged_segment: bool,

    /// Number of shard columns of a key-value segment, `1` when unsharded.
    #[serde(default = "default_sharding_column_count")]
    pub sharding_column_count: u32,
}

fn default_sharding_column_count() -> u32 {
    1
}

impl SegmentInfo {
    /// Read `segment_info`; an absent file yields `None`.
    pub fn load(directory: &dyn Directory) -> Result<Option<Self>> {
        if !directory.is_exist(SEGMENT_INFO_FILE_NAME) {
            return Ok(None);
        }
        let bytes = directory.load(SEGMENT_INFO_FILE_NAME)?;
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            SegmentError::corruption(format!(
                "invalid segment info in [{}]: {}",
                directory.root(),
                e
            ))
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

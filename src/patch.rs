//! Patch overlays of a partition.
//!
//! Two kinds of patches exist:
//!
//! - Patch indexes: whole segments built for a newer schema and stored
//!   outside the segment they belong to, under
//!   `patch_index_<schema_id>/<segment_dir_name>/`. The partition-level
//!   `patch_meta.<version_id>` file lists them.
//! - Patch files: attribute updates (`<src>_<dst>.patch`) and deletion maps
//!   (`data_<dst>`) written by segment `src` for an older segment `dst`.
//!   They are located by [`PatchFileFinder`].

use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SegmentError};
use crate::schema::SchemaId;
use crate::storage::{Directory, join_path};
use crate::version::{SegmentId, Version, VersionId};

pub mod finder;

pub use finder::{PatchFileFinder, PatchFileInfo, PatchInfos};

pub const PATCH_INDEX_DIR_PREFIX: &str = "patch_index_";
pub const PATCH_META_FILE_NAME_PREFIX: &str = "patch_meta";

/// Patched content of one segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentPatchMeta {
    pub segment_id: SegmentId,
    #[serde(default)]
    pub indexes: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<String>,
}

/// Patch segments built for one schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaPatchInfo {
    pub schema_id: SchemaId,
    #[serde(default)]
    pub segments: Vec<SegmentPatchMeta>,
}

impl SchemaPatchInfo {
    pub fn has_segment(&self, segment_id: SegmentId) -> bool {
        self.segments.iter().any(|s| s.segment_id == segment_id)
    }
}

/// Content of `patch_meta.<version_id>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionPatchMeta {
    #[serde(default)]
    pub patch_metas: Vec<SchemaPatchInfo>,
}

impl PartitionPatchMeta {
    pub fn file_name(version_id: VersionId) -> String {
        format!("{PATCH_META_FILE_NAME_PREFIX}.{version_id}")
    }

    /// Read the patch meta of `version_id`, `None` when the partition has none.
    pub fn load(directory: &dyn Directory, version_id: VersionId) -> Result<Option<Self>> {
        let file_name = Self::file_name(version_id);
        if !directory.is_exist(&file_name) {
            return Ok(None);
        }
        let bytes = directory.load(&file_name)?;
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            SegmentError::corruption(format!(
                "invalid patch meta [{}/{}]: {}",
                directory.root(),
                file_name,
                e
            ))
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn add_segment_patch(&mut self, schema_id: SchemaId, patch: SegmentPatchMeta) {
        match self.patch_metas.iter_mut().find(|p| p.schema_id == schema_id) {
            Some(info) => info.segments.push(patch),
            None => self.patch_metas.push(SchemaPatchInfo {
                schema_id,
                segments: vec![patch],
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchemaPatchInfo> {
        self.patch_metas.iter()
    }
}

/// Name of the directory holding patch segments built for `schema_id`.
pub fn patch_index_dir_name(schema_id: SchemaId) -> String {
    format!("{PATCH_INDEX_DIR_PREFIX}{schema_id}")
}

/// Resolves patch segments of one partition.
#[derive(Debug, Clone)]
pub struct PatchIndexAccessor {
    root: Arc<dyn Directory>,
    version: Version,
    patch_meta: PartitionPatchMeta,
}

impl PatchIndexAccessor {
    /// Open the patch meta of `version` in the partition `root`.
    ///
    /// Returns `Ok(None)` when the version has no patches.
    pub fn open(root: Arc<dyn Directory>, version: &Version) -> Result<Option<Self>> {
        if !version.is_valid() {
            return Ok(None);
        }
        let Some(patch_meta) = PartitionPatchMeta::load(root.as_ref(), version.version_id)? else {
            return Ok(None);
        };
        debug!(
            "opened patch meta of version {} in [{}] with {} schemas",
            version.version_id,
            root.root(),
            patch_meta.patch_metas.len()
        );
        Ok(Some(PatchIndexAccessor {
            root,
            version: version.clone(),
            patch_meta,
        }))
    }

    pub fn root(&self) -> &Arc<dyn Directory> {
        &self.root
    }

    pub fn patch_meta(&self) -> &PartitionPatchMeta {
        &self.patch_meta
    }

    /// Schemas that carry a patch segment for `segment_id`.
    pub fn patch_schema_ids(&self, segment_id: SegmentId) -> Vec<SchemaId> {
        self.patch_meta
            .iter()
            .filter(|info| info.has_segment(segment_id))
            .map(|info| info.schema_id)
            .collect()
    }

    /// Path of the patch segment of `segment_id` for `schema_id`, relative
    /// to the partition root.
    pub fn patch_segment_path(&self, schema_id: SchemaId, segment_id: SegmentId) -> String {
        join_path(
            &patch_index_dir_name(schema_id),
            &self.version.segment_dir_name(segment_id),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryDirectory;

    #[test]
    fn test_patch_meta_json() {
        let meta: PartitionPatchMeta = serde_json::from_str(
            r#"{"patch_metas": [{"schema_id": 1, "segments": [{"segment_id": 3, "attributes": ["price"]}]}]}"#,
        )
        .unwrap();
        assert_eq!(meta.patch_metas[0].segments[0].attributes, vec!["price"]);
        assert!(meta.patch_metas[0].has_segment(3));
        assert_eq!(PartitionPatchMeta::file_name(4), "patch_meta.4");
    }

    #[test]
    fn test_accessor() {
        let root = Arc::new(MemoryDirectory::new_default());
        let version = Version::with_segments(2, &[0, 3]);
        assert!(PatchIndexAccessor::open(root.clone(), &version)
            .unwrap()
            .is_none());

        let mut meta = PartitionPatchMeta::default();
        meta.add_segment_patch(
            1,
            SegmentPatchMeta {
                segment_id: 3,
                ..Default::default()
            },
        );
        meta.add_segment_patch(
            2,
            SegmentPatchMeta {
                segment_id: 0,
                ..Default::default()
            },
        );
        root.write_file("patch_meta.2", meta.to_bytes().unwrap());

        let accessor = PatchIndexAccessor::open(root, &version).unwrap().unwrap();
        assert_eq!(accessor.patch_schema_ids(3), vec![1]);
        assert!(accessor.patch_schema_ids(5).is_empty());
        assert_eq!(
            accessor.patch_segment_path(1, 3),
            "patch_index_1/segment_3_level_0"
        );
    }

    #[test]
    fn test_invalid_version_has_no_patches() {
        let root = Arc::new(MemoryDirectory::new_default());
        root.write_file("patch_meta.-1", b"{}".to_vec());
        assert!(PatchIndexAccessor::open(root, &Version::default())
            .unwrap()
            .is_none());
    }
}

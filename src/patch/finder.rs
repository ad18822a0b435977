use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::error::{Result, SegmentError};
use crate::file_view::file_view;
use crate::segment_directory::{MultiPartSegmentDirectory, ResolvedSegment};
use crate::size_calculator::{ATTRIBUTE_DIR_NAME, ATTRIBUTE_PATCH_FILE_SUFFIX};
use crate::storage::{Directory, join_path};
use crate::version::{INVALID_SEGMENT_ID, SegmentId};

pub const DELETION_MAP_DIR_NAME: &str = "deletionmap";

lazy_static! {
    static ref ATTRIBUTE_PATCH_PATTERN: Regex = Regex::new(r"^(\d+)_(\d+)\.\w*patch$").unwrap();
    static ref DELETION_MAP_PATTERN: Regex = Regex::new(r"^data_(\d+)$").unwrap();
}

/// A patch file written by one segment for an older one.
#[derive(Debug, Clone)]
pub struct PatchFileInfo {
    /// Virtual id of the segment holding the patch.
    pub src_segment: SegmentId,
    /// Virtual id of the patched segment.
    pub dst_segment: SegmentId,
    /// Directory of the source segment.
    pub directory: Arc<dyn Directory>,
    /// Path of the patch file inside `directory`.
    pub path: String,
}

/// Patch files grouped by patched segment, each group ordered by source.
pub type PatchInfos = BTreeMap<SegmentId, Vec<PatchFileInfo>>;

/// Locates patch files across all segments of a [`MultiPartSegmentDirectory`].
///
/// File names carry physical segment ids of the partition they live in;
/// results are expressed in virtual ids. Patches for segments that are no
/// longer part of the version are skipped.
#[derive(Debug, Clone, Copy)]
pub struct PatchFileFinder<'a> {
    segment_directory: &'a MultiPartSegmentDirectory,
}

impl<'a> PatchFileFinder<'a> {
    pub fn new(segment_directory: &'a MultiPartSegmentDirectory) -> Self {
        PatchFileFinder { segment_directory }
    }

    /// Find every patch file of attribute `attr_name`.
    ///
    /// A patch whose source is not newer than its destination, or two
    /// patches from the same source for the same destination, mean the
    /// index is broken and are reported as [`SegmentError::IndexCollapsed`].
    pub fn find_attribute_patch_files(&self, attr_name: &str) -> Result<PatchInfos> {
        let attr_dir = join_path(ATTRIBUTE_DIR_NAME, attr_name);
        let mut patch_infos = PatchInfos::new();

        self.for_each_segment(|src_segment, resolved| {
            let view = file_view(resolved.directory.as_ref(), resolved.file_meta.as_deref());
            for name in view.list_file(&attr_dir, false) {
                if !name.ends_with(ATTRIBUTE_PATCH_FILE_SUFFIX) {
                    continue;
                }
                let path = join_path(&attr_dir, &name);
                let (src_physical, dst_physical) = parse_attribute_patch_file_name(&name)
                    .ok_or_else(|| {
                        SegmentError::index_collapsed(format!(
                            "invalid attribute patch file [{}/{}]",
                            resolved.directory.root(),
                            path
                        ))
                    })?;
                if src_physical <= dst_physical {
                    return Err(SegmentError::index_collapsed(format!(
                        "patch source segment {} is not newer than destination {} in [{}/{}]",
                        src_physical,
                        dst_physical,
                        resolved.directory.root(),
                        path
                    )));
                }

                let dst_segment = self
                    .segment_directory
                    .encode_to_virtual_segment_id(resolved.partition_idx, dst_physical);
                if dst_segment == INVALID_SEGMENT_ID {
                    debug!("skip patch [{}] for segment outside the version", path);
                    continue;
                }

                let patches = patch_infos.entry(dst_segment).or_default();
                if patches.iter().any(|p| p.src_segment == src_segment) {
                    return Err(SegmentError::index_collapsed(format!(
                        "duplicate patch from segment {} for segment {} in [{}/{}]",
                        src_physical,
                        dst_physical,
                        resolved.directory.root(),
                        attr_dir
                    )));
                }
                patches.push(PatchFileInfo {
                    src_segment,
                    dst_segment,
                    directory: Arc::clone(&resolved.directory),
                    path,
                });
            }
            Ok(())
        })?;

        for patches in patch_infos.values_mut() {
            patches.sort_by_key(|p| p.src_segment);
        }
        Ok(patch_infos)
    }

    /// Find the deletion map of every segment; the newest source wins.
    pub fn find_deletion_map_files(&self) -> Result<BTreeMap<SegmentId, PatchFileInfo>> {
        let mut deletion_maps = BTreeMap::new();

        self.for_each_segment(|src_segment, resolved| {
            let view = file_view(resolved.directory.as_ref(), resolved.file_meta.as_deref());
            for name in view.list_file(DELETION_MAP_DIR_NAME, false) {
                let Some(dst_physical) = parse_deletion_map_file_name(&name) else {
                    continue;
                };
                let dst_segment = self
                    .segment_directory
                    .encode_to_virtual_segment_id(resolved.partition_idx, dst_physical);
                if dst_segment == INVALID_SEGMENT_ID {
                    continue;
                }
                let info = PatchFileInfo {
                    src_segment,
                    dst_segment,
                    directory: Arc::clone(&resolved.directory),
                    path: join_path(DELETION_MAP_DIR_NAME, &name),
                };
                match deletion_maps.entry(dst_segment) {
                    Entry::Vacant(slot) => {
                        slot.insert(info);
                    }
                    Entry::Occupied(mut slot) => {
                        if slot.get().src_segment < src_segment {
                            slot.insert(info);
                        }
                    }
                }
            }
            Ok(())
        })?;
        Ok(deletion_maps)
    }

    fn for_each_segment(
        &self,
        mut visit: impl FnMut(SegmentId, &ResolvedSegment) -> Result<()>,
    ) -> Result<()> {
        for &segment_id in &self.segment_directory.version().segments {
            if let Some(resolved) = self.segment_directory.get_segment_fs_directory(segment_id)? {
                visit(segment_id, &resolved)?;
            }
        }
        Ok(())
    }
}

/// Source and destination segment ids encoded in `<src>_<dst>.patch`.
pub fn parse_attribute_patch_file_name(name: &str) -> Option<(SegmentId, SegmentId)> {
    let caps = ATTRIBUTE_PATCH_PATTERN.captures(name)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// Destination segment id encoded in `data_<dst>`.
pub fn parse_deletion_map_file_name(name: &str) -> Option<SegmentId> {
    DELETION_MAP_PATTERN
        .captures(name)
        .and_then(|caps| caps[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attribute_patch_file_name() {
        assert_eq!(parse_attribute_patch_file_name("3_5.patch"), Some((3, 5)));
        assert_eq!(parse_attribute_patch_file_name("3_5.attr_patch"), Some((3, 5)));
        assert_eq!(parse_attribute_patch_file_name("3-5.patch"), None);
        assert_eq!(parse_attribute_patch_file_name("data"), None);
    }

    #[test]
    fn test_parse_deletion_map_file_name() {
        assert_eq!(parse_deletion_map_file_name("data_12"), Some(12));
        assert_eq!(parse_deletion_map_file_name("data_"), None);
        assert_eq!(parse_deletion_map_file_name("offset"), None);
    }
}

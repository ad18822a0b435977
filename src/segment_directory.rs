//! Segment directories of a partition.
//!
//! A [`SegmentDirectory`] binds a partition root to the [`Version`] that
//! names its segments. [`MultiPartSegmentDirectory`] stitches several of
//! them into one virtual segment id space.

use std::sync::Arc;

use crate::error::Result;
use crate::file_view::{SegmentFileView, file_view};
use crate::patch::PatchIndexAccessor;
use crate::segment_file_meta::SegmentFileMeta;
use crate::storage::Directory;
use crate::version::{SegmentId, SegmentInfo, Version};

pub mod multi_part;

pub use multi_part::MultiPartSegmentDirectory;

/// One physical partition: its root directory and current version.
#[derive(Debug, Clone)]
pub struct SegmentDirectory {
    root: Arc<dyn Directory>,
    version: Version,
    patch_index_accessor: Option<Arc<PatchIndexAccessor>>,
}

impl SegmentDirectory {
    /// Open a partition. Without an explicit version the latest
    /// `version.<id>` is loaded; a partition without versions is empty.
    pub fn open(root: Arc<dyn Directory>, version: Option<Version>) -> Result<Self> {
        let version = match version {
            Some(version) => version,
            None => Version::load_latest(root.as_ref())?.unwrap_or_default(),
        };
        let patch_index_accessor = PatchIndexAccessor::open(Arc::clone(&root), &version)?.map(Arc::new);
        Ok(SegmentDirectory {
            root,
            version,
            patch_index_accessor,
        })
    }

    pub fn root(&self) -> &Arc<dyn Directory> {
        &self.root
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn patch_index_accessor(&self) -> Option<&Arc<PatchIndexAccessor>> {
        self.patch_index_accessor.as_ref()
    }

    /// Directory name of a physical segment of this partition.
    pub fn segment_path(&self, segment_id: SegmentId) -> String {
        self.version.segment_dir_name(segment_id)
    }
}

/// A virtual segment resolved to its physical location.
#[derive(Debug, Clone)]
pub struct ResolvedSegment {
    pub directory: Arc<dyn Directory>,
    /// Cached metadata, `None` when the segment has no usable manifest.
    pub file_meta: Option<Arc<SegmentFileMeta>>,
    pub physical_segment_id: SegmentId,
    pub partition_idx: usize,
}

/// Everything needed to account for one segment.
#[derive(Debug, Clone)]
pub struct SegmentData {
    /// Virtual segment id.
    pub segment_id: SegmentId,
    pub physical_segment_id: SegmentId,
    pub partition_idx: usize,
    pub directory: Arc<dyn Directory>,
    pub file_meta: Option<Arc<SegmentFileMeta>>,
    pub segment_info: Option<SegmentInfo>,
    pub sub_segment_data: Option<Box<SegmentData>>,
    pub patch_index_accessor: Option<Arc<PatchIndexAccessor>>,
}

impl SegmentData {
    pub fn file_view(&self) -> Box<dyn SegmentFileView + '_> {
        file_view(self.directory.as_ref(), self.file_meta.as_deref())
    }

    pub fn sharding_column_count(&self) -> u32 {
        self.segment_info
            .as_ref()
            .map_or(1, |info| info.sharding_column_count)
    }

    pub fn is_merged_segment(&self) -> bool {
        self.segment_info
            .as_ref()
            .is_some_and(|info| info.is_merged_segment)
    }
}

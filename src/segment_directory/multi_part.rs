use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::LoadConfig;
use crate::error::{Result, SegmentError};
use crate::package_file::PACKAGE_FILE_PREFIX;
use crate::segment_directory::{ResolvedSegment, SegmentData, SegmentDirectory};
use crate::segment_file_meta::{SUB_SEGMENT_DIR_NAME, SegmentFileMeta};
use crate::storage::{Directory, get_directory};
use crate::version::{INVALID_SEGMENT_ID, SegmentId, SegmentInfo, Version};

/// Several partitions addressed through one dense virtual segment id space.
///
/// Virtual ids are assigned partition by partition, in the order of each
/// partition's version. Virtual id `v` belongs to partition `i` iff
/// `end_segment_ids[i - 1] <= v < end_segment_ids[i]`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use segmeta::config::LoadConfig;
/// use segmeta::segment_directory::MultiPartSegmentDirectory;
/// use segmeta::storage::{Directory, MemoryDirectory};
/// use segmeta::version::Version;
///
/// # fn main() -> segmeta::error::Result<()> {
/// let roots: Vec<Arc<dyn Directory>> = vec![
///     Arc::new(MemoryDirectory::new_default()),
///     Arc::new(MemoryDirectory::new_default()),
/// ];
/// let versions = vec![Version::with_segments(0, &[1, 2]), Version::with_segments(1, &[1, 2])];
/// let multi_part = MultiPartSegmentDirectory::init(roots, Some(versions), false, LoadConfig::default())?;
///
/// assert_eq!(multi_part.encode_to_virtual_segment_id(1, 2), 3);
/// assert_eq!(multi_part.decode_virtual_segment_id(2), Some((1, 1)));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MultiPartSegmentDirectory {
    segment_directories: Vec<SegmentDirectory>,
    end_segment_ids: Vec<SegmentId>,
    version: Version,
    is_sub_segment_dir: bool,
    sub_segment_directory: Option<Box<MultiPartSegmentDirectory>>,
    config: LoadConfig,
}

impl MultiPartSegmentDirectory {
    /// Build the virtual segment space over `roots`.
    ///
    /// When `versions` is `None` every partition loads its latest version.
    /// Timestamp, locator and schema version of the virtual version come
    /// from the last partition, so partitions should be passed oldest first.
    pub fn init(
        roots: Vec<Arc<dyn Directory>>,
        versions: Option<Vec<Version>>,
        has_sub: bool,
        config: LoadConfig,
    ) -> Result<Self> {
        if let Some(versions) = &versions {
            if versions.len() != roots.len() {
                return Err(SegmentError::invalid_argument(format!(
                    "got {} versions for {} partitions",
                    versions.len(),
                    roots.len()
                )));
            }
        }
        let mut versions = versions.map(|v| v.into_iter());

        let mut segment_directories = Vec::with_capacity(roots.len());
        let mut end_segment_ids = Vec::with_capacity(roots.len());
        let mut version = Version::default();
        let mut next_virtual_id: SegmentId = 0;

        for root in roots {
            let partition_version = versions.as_mut().and_then(|v| v.next());
            let partition = SegmentDirectory::open(root, partition_version)?;
            let partition_version = partition.version();
            for _ in &partition_version.segments {
                version.add_segment(next_virtual_id);
                next_virtual_id += 1;
            }
            end_segment_ids.push(next_virtual_id);

            version.version_id = partition_version.version_id;
            version.timestamp = partition_version.timestamp;
            version.locator = partition_version.locator.clone();
            version.schema_version = partition_version.schema_version;
            segment_directories.push(partition);
        }

        let mut multi_part = MultiPartSegmentDirectory {
            segment_directories,
            end_segment_ids,
            version,
            is_sub_segment_dir: false,
            sub_segment_directory: None,
            config,
        };
        if has_sub {
            let mut sub = multi_part.clone();
            sub.is_sub_segment_dir = true;
            multi_part.sub_segment_directory = Some(Box::new(sub));
        }
        info!(
            "initialized {} partitions with {} segments",
            multi_part.partition_count(),
            multi_part.version.segment_count()
        );
        Ok(multi_part)
    }

    /// Virtual id of `physical_segment_id` in partition `partition_idx`,
    /// [`INVALID_SEGMENT_ID`] when the partition or segment is unknown.
    pub fn encode_to_virtual_segment_id(
        &self,
        partition_idx: usize,
        physical_segment_id: SegmentId,
    ) -> SegmentId {
        let Some(partition) = self.segment_directories.get(partition_idx) else {
            return INVALID_SEGMENT_ID;
        };
        partition
            .version()
            .segments
            .iter()
            .position(|&id| id == physical_segment_id)
            .map_or(INVALID_SEGMENT_ID, |pos| {
                self.partition_begin(partition_idx) + pos as SegmentId
            })
    }

    /// Physical segment id and partition index of a virtual id.
    pub fn decode_virtual_segment_id(
        &self,
        virtual_segment_id: SegmentId,
    ) -> Option<(SegmentId, usize)> {
        if virtual_segment_id < 0 {
            return None;
        }
        let partition_idx = self
            .end_segment_ids
            .partition_point(|&end| end <= virtual_segment_id);
        let partition = self.segment_directories.get(partition_idx)?;
        let offset = virtual_segment_id - self.partition_begin(partition_idx);
        let physical_segment_id = partition.version().segment(offset as usize)?;
        Some((physical_segment_id, partition_idx))
    }

    /// Resolve the directory of a virtual segment.
    ///
    /// Returns `Ok(None)` for ids outside the virtual range. The package
    /// file is mounted whenever the segment has no cached metadata or the
    /// metadata reports one. A segment directory missing from its partition
    /// is reported as [`SegmentError::IndexCollapsed`], as is a missing
    /// sub-segment directory in a sub-segment view.
    pub fn get_segment_fs_directory(
        &self,
        virtual_segment_id: SegmentId,
    ) -> Result<Option<ResolvedSegment>> {
        let Some((physical_segment_id, partition_idx)) =
            self.decode_virtual_segment_id(virtual_segment_id)
        else {
            debug!("virtual segment {} is out of range", virtual_segment_id);
            return Ok(None);
        };
        let partition = &self.segment_directories[partition_idx];
        let segment_path = partition.segment_path(physical_segment_id);
        let segment_directory =
            get_directory(partition.root(), &segment_path, false)?.ok_or_else(|| {
                SegmentError::index_collapsed(format!(
                    "segment directory [{}/{}] does not exist",
                    partition.root().root(),
                    segment_path
                ))
            })?;

        let file_meta = SegmentFileMeta::create(
            segment_directory.as_ref(),
            self.is_sub_segment_dir,
            &self.config,
        )?;

        let directory = if self.is_sub_segment_dir {
            get_directory(&segment_directory, SUB_SEGMENT_DIR_NAME, false)?.ok_or_else(|| {
                SegmentError::index_collapsed(format!(
                    "sub segment directory [{}/{}] does not exist",
                    segment_directory.root(),
                    SUB_SEGMENT_DIR_NAME
                ))
            })?
        } else {
            segment_directory
        };

        if file_meta.as_ref().is_none_or(|meta| meta.has_package_file()) {
            match directory.mount_package_file(PACKAGE_FILE_PREFIX) {
                Ok(_) => {}
                Err(e) if e.is_corruption() && self.config.fallback_on_corrupt_manifest => {
                    warn!(
                        "serving segment [{}] without its package file: {}",
                        directory.root(),
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Some(ResolvedSegment {
            directory,
            file_meta: file_meta.map(Arc::new),
            physical_segment_id,
            partition_idx,
        }))
    }

    /// Resolve a virtual segment together with its segment info, its
    /// sub-segment and the patch accessor of its partition.
    pub fn segment_data(&self, virtual_segment_id: SegmentId) -> Result<Option<SegmentData>> {
        let Some(resolved) = self.get_segment_fs_directory(virtual_segment_id)? else {
            return Ok(None);
        };
        let segment_info = SegmentInfo::load(resolved.directory.as_ref())?;
        let sub_segment_data = match &self.sub_segment_directory {
            Some(sub) => sub.segment_data(virtual_segment_id)?.map(Box::new),
            None => None,
        };
        let patch_index_accessor = if self.is_sub_segment_dir {
            None
        } else {
            self.segment_directories[resolved.partition_idx]
                .patch_index_accessor()
                .cloned()
        };

        Ok(Some(SegmentData {
            segment_id: virtual_segment_id,
            physical_segment_id: resolved.physical_segment_id,
            partition_idx: resolved.partition_idx,
            directory: resolved.directory,
            file_meta: resolved.file_meta,
            segment_info,
            sub_segment_data,
            patch_index_accessor,
        }))
    }

    pub fn sub_segment_directory(&self) -> Option<&MultiPartSegmentDirectory> {
        self.sub_segment_directory.as_deref()
    }

    pub fn is_sub_segment_dir(&self) -> bool {
        self.is_sub_segment_dir
    }

    /// The virtual version: segment ids `0..segment_count`.
    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn partition_count(&self) -> usize {
        self.segment_directories.len()
    }

    pub fn partition(&self, partition_idx: usize) -> Option<&SegmentDirectory> {
        self.segment_directories.get(partition_idx)
    }

    pub fn end_segment_ids(&self) -> &[SegmentId] {
        &self.end_segment_ids
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    fn partition_begin(&self, partition_idx: usize) -> SegmentId {
        if partition_idx == 0 {
            0
        } else {
            self.end_segment_ids[partition_idx - 1]
        }
    }
}

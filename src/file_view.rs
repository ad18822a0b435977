//! Uniform read access to the files of one segment.
//!
//! Consumers that only need lengths and listings work against
//! [`SegmentFileView`] and never check whether cached metadata is
//! available. [`MetaFileView`] answers from a loaded [`SegmentFileMeta`];
//! [`LiveFileView`] asks the [`Directory`] directly.

use log::warn;

use crate::segment_file_meta::SegmentFileMeta;
use crate::storage::{Directory, join_path, normalize_path};

/// Read-only view over the logical files of a segment.
///
/// Absence is never an error: missing files have no length and missing
/// directories list as empty.
pub trait SegmentFileView: Send + Sync {
    /// Length of the file at `path`, `None` when it does not exist.
    fn file_length(&self, path: &str) -> Option<u64>;

    fn is_exist(&self, path: &str) -> bool;

    /// Names below `dir`, relative to it. Recursive listings keep a trailing
    /// `/` on directories.
    fn list_file(&self, dir: &str, recursive: bool) -> Vec<String>;

    /// Total length of every file below `dir`.
    fn directory_size(&self, dir: &str) -> u64;
}

/// View answered from cached segment metadata.
#[derive(Debug, Clone, Copy)]
pub struct MetaFileView<'a> {
    meta: &'a SegmentFileMeta,
}

impl<'a> MetaFileView<'a> {
    pub fn new(meta: &'a SegmentFileMeta) -> Self {
        MetaFileView { meta }
    }
}

impl SegmentFileView for MetaFileView<'_> {
    fn file_length(&self, path: &str) -> Option<u64> {
        // Directory markers exist but have no length of their own.
        if self.meta.is_exist(path) {
            Some(self.meta.get_file_length(path, true))
        } else {
            None
        }
    }

    fn is_exist(&self, path: &str) -> bool {
        self.meta.is_exist(path)
    }

    fn list_file(&self, dir: &str, recursive: bool) -> Vec<String> {
        self.meta.list_file(dir, recursive)
    }

    fn directory_size(&self, dir: &str) -> u64 {
        self.meta.calculate_directory_size(dir)
    }
}

/// View answered by the directory backend.
#[derive(Debug, Clone, Copy)]
pub struct LiveFileView<'a> {
    directory: &'a dyn Directory,
}

impl<'a> LiveFileView<'a> {
    pub fn new(directory: &'a dyn Directory) -> Self {
        LiveFileView { directory }
    }
}

impl SegmentFileView for LiveFileView<'_> {
    fn file_length(&self, path: &str) -> Option<u64> {
        if !self.directory.is_exist(path) {
            return None;
        }
        if self.directory.is_dir(path) {
            return Some(0);
        }
        match self.directory.file_length(path) {
            Ok(length) => Some(length),
            Err(e) => {
                warn!(
                    "failed to get length of [{}/{}]: {}",
                    self.directory.root(),
                    path,
                    e
                );
                None
            }
        }
    }

    fn is_exist(&self, path: &str) -> bool {
        self.directory.is_exist(path)
    }

    fn list_file(&self, dir: &str, recursive: bool) -> Vec<String> {
        let dir = normalize_path(dir);
        if !dir.is_empty() && !self.directory.is_dir(&dir) {
            return Vec::new();
        }
        self.directory
            .list_file(&dir, recursive, false)
            .unwrap_or_else(|e| {
                warn!(
                    "failed to list [{}/{}]: {}",
                    self.directory.root(),
                    dir,
                    e
                );
                Vec::new()
            })
    }

    fn directory_size(&self, dir: &str) -> u64 {
        let dir = normalize_path(dir);
        self.list_file(&dir, true)
            .iter()
            .filter(|name| !name.ends_with('/'))
            .filter_map(|name| self.file_length(&join_path(&dir, name)))
            .sum()
    }
}

/// The cached view when metadata is loaded, the live one otherwise.
pub fn file_view<'a>(
    directory: &'a dyn Directory,
    meta: Option<&'a SegmentFileMeta>,
) -> Box<dyn SegmentFileView + 'a> {
    match meta {
        Some(meta) => Box::new(MetaFileView::new(meta)),
        None => Box::new(LiveFileView::new(directory)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoadConfig;
    use crate::index_file_list::IndexFileList;
    use crate::index_file_list::SEGMENT_FILE_LIST;
    use crate::storage::memory::MemoryDirectory;

    fn segment() -> MemoryDirectory {
        let directory = MemoryDirectory::new_default();
        directory.write_file("attribute/price/data", vec![0u8; 40]);
        directory.write_file("attribute/price/offset", vec![0u8; 8]);
        directory.write_file("attribute/price/3_5.patch", vec![0u8; 3]);
        directory.make_directory("summary");
        directory
    }

    fn with_manifest(directory: &MemoryDirectory) -> SegmentFileMeta {
        let mut file_list = IndexFileList::new();
        file_list.append("attribute/", -1);
        file_list.append("attribute/price/", -1);
        file_list.append("attribute/price/data", 40);
        file_list.append("attribute/price/offset", 8);
        file_list.append("attribute/price/3_5.patch", 3);
        file_list.append("summary/", -1);
        directory.write_file(SEGMENT_FILE_LIST, file_list.to_bytes().unwrap());
        SegmentFileMeta::create(directory, false, &LoadConfig::default())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_views_agree() {
        let directory = segment();
        let meta = with_manifest(&directory);
        let live = LiveFileView::new(&directory);
        let cached = MetaFileView::new(&meta);

        let views: [&dyn SegmentFileView; 2] = [&live, &cached];
        for view in views {
            assert_eq!(view.file_length("attribute/price/data"), Some(40));
            assert_eq!(view.file_length("attribute/price/missing"), None);
            assert!(view.is_exist("summary"));
            assert_eq!(view.file_length("summary"), Some(0));
            assert_eq!(
                view.list_file("attribute/price", false),
                vec!["3_5.patch", "data", "offset"]
            );
            assert_eq!(view.directory_size("attribute"), 51);
            assert!(view.list_file("index", true).is_empty());
            assert_eq!(view.directory_size("index"), 0);
        }
    }

    #[test]
    fn test_live_size_of_segment_root() {
        let directory = segment();
        directory.write_file("segment_info", vec![0u8; 5]);
        let live = LiveFileView::new(&directory);
        assert_eq!(live.directory_size(""), 56);
        assert_eq!(live.directory_size("/attribute/"), 51);
    }

    #[test]
    fn test_file_view_selection() {
        let directory = segment();
        assert!(file_view(&directory, None).is_exist("attribute/price/offset"));

        let meta = with_manifest(&directory);
        directory.remove_file("attribute/price/offset");
        // Cached metadata is authoritative once loaded.
        assert_eq!(
            file_view(&directory, Some(&meta)).file_length("attribute/price/offset"),
            Some(8)
        );
        assert_eq!(
            file_view(&directory, None).file_length("attribute/price/offset"),
            None
        );
    }
}

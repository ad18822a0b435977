use std::sync::Arc;

use crate::error::Result;
use crate::storage::{Directory, FileEntry, join_path, normalize_path};

/// Directory facade that transparently prefixes all paths.
///
/// This is how a segment directory (or a sub-segment inside it) is handed
/// out: every call is forwarded to the owning backend, so package mounts and
/// registered lengths are shared with it.
#[derive(Debug, Clone)]
pub struct PrefixedDirectory {
    prefix: String,
    inner: Arc<dyn Directory>,
}

impl PrefixedDirectory {
    /// Create a new prefixed view.
    pub fn new(prefix: impl Into<String>, inner: Arc<dyn Directory>) -> Self {
        let prefix = normalize_path(&prefix.into());
        Self { prefix, inner }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn map_name(&self, name: &str) -> String {
        join_path(&self.prefix, name)
    }
}

impl Directory for PrefixedDirectory {
    fn root(&self) -> String {
        let root = self.inner.root();
        if root.ends_with('/') {
            format!("{root}{}", self.prefix)
        } else {
            format!("{root}/{}", self.prefix)
        }
    }

    fn is_exist(&self, path: &str) -> bool {
        self.inner.is_exist(&self.map_name(path))
    }

    fn is_dir(&self, path: &str) -> bool {
        self.inner.is_dir(&self.map_name(path))
    }

    fn file_length(&self, path: &str) -> Result<u64> {
        self.inner.file_length(&self.map_name(path))
    }

    fn list_file(&self, path: &str, recursive: bool, physical: bool) -> Result<Vec<String>> {
        // Listings are already relative to the listed path.
        self.inner
            .list_file(&self.map_name(path), recursive, physical)
    }

    fn load(&self, path: &str) -> Result<Vec<u8>> {
        self.inner.load(&self.map_name(path))
    }

    fn set_path_lifecycle(&self, path: &str, lifecycle: &str) -> bool {
        self.inner.set_path_lifecycle(&self.map_name(path), lifecycle)
    }

    fn path_lifecycle(&self, path: &str) -> Option<String> {
        self.inner.path_lifecycle(&self.map_name(path))
    }

    fn add_solid_path_file_infos(&self, base: &str, infos: &[FileEntry]) {
        self.inner
            .add_solid_path_file_infos(&self.map_name(base), infos)
    }

    fn mount_package_file(&self, prefix: &str) -> Result<bool> {
        self.inner.mount_package_file(&self.map_name(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::get_directory;
    use crate::storage::memory::MemoryDirectory;

    #[test]
    fn isolates_paths() {
        let base = Arc::new(MemoryDirectory::new_default());
        base.write_file("segment_0_level_0/index/pk/data", vec![0u8; 16]);
        base.write_file("segment_1_level_0/index/pk/data", vec![0u8; 8]);
        let base: Arc<dyn Directory> = base;

        let segment = PrefixedDirectory::new("segment_0_level_0/", base.clone());
        assert_eq!(segment.prefix(), "segment_0_level_0");
        assert_eq!(segment.file_length("index/pk/data").unwrap(), 16);
        assert_eq!(segment.list_file("", false, false).unwrap(), vec!["index"]);
        assert_eq!(segment.root(), "memory://segment_0_level_0");
    }

    #[test]
    fn nested_views_share_state() {
        let base: Arc<dyn Directory> = Arc::new(MemoryDirectory::new_default());
        let segment: Arc<dyn Directory> = Arc::new(PrefixedDirectory::new("seg", base.clone()));

        assert!(segment.set_lifecycle("hot"));
        assert_eq!(base.path_lifecycle("seg").as_deref(), Some("hot"));

        segment.add_solid_path_file_infos("", &[FileEntry::new("index/pk/data", 5)]);
        assert_eq!(base.file_length("seg/index/pk/data").unwrap(), 5);
        assert!(get_directory(&segment, "index", false).unwrap().is_none());
    }
}

//! In-memory directory implementation for testing and tooling.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;

use crate::error::{Result, SegmentError};
use crate::storage::{
    Directory, DirectoryState, FileEntry, add_listing_entry, collect_listing, normalize_path,
};

/// Configuration for [`MemoryDirectory`].
#[derive(Debug, Clone)]
pub struct MemoryDirectoryConfig {
    /// Name reported by [`Directory::root`].
    pub name: String,
}

impl Default for MemoryDirectoryConfig {
    fn default() -> Self {
        MemoryDirectoryConfig {
            name: "memory://".to_string(),
        }
    }
}

/// An in-memory directory.
///
/// Directories exist implicitly as ancestors of stored files, or explicitly
/// through [`MemoryDirectory::make_directory`].
#[derive(Debug)]
pub struct MemoryDirectory {
    files: RwLock<BTreeMap<String, Box<[u8]>>>,
    directories: RwLock<BTreeSet<String>>,
    state: DirectoryState,
    config: MemoryDirectoryConfig,
}

impl MemoryDirectory {
    pub fn new(config: MemoryDirectoryConfig) -> Self {
        MemoryDirectory {
            files: RwLock::new(BTreeMap::new()),
            directories: RwLock::new(BTreeSet::new()),
            state: DirectoryState::default(),
            config,
        }
    }

    pub fn new_default() -> Self {
        Self::new(MemoryDirectoryConfig::default())
    }

    /// Store a file, replacing any previous content.
    pub fn write_file(&self, path: &str, data: impl Into<Vec<u8>>) {
        let data: Vec<u8> = data.into();
        self.files
            .write()
            .insert(normalize_path(path), data.into_boxed_slice());
    }

    /// Create an empty directory (and its ancestors).
    pub fn make_directory(&self, path: &str) {
        let path = normalize_path(path);
        if !path.is_empty() {
            self.directories.write().insert(path);
        }
    }

    pub fn remove_file(&self, path: &str) -> bool {
        self.files.write().remove(&normalize_path(path)).is_some()
    }

    /// Get the number of files stored.
    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    /// Get the total size of all files.
    pub fn total_size(&self) -> u64 {
        self.files.read().values().map(|data| data.len() as u64).sum()
    }

    fn physical_is_file(&self, path: &str) -> bool {
        self.files.read().contains_key(path)
    }

    fn physical_is_dir(&self, path: &str) -> bool {
        if path.is_empty() || self.directories.read().contains(path) {
            return true;
        }
        let prefix = format!("{path}/");
        let has_child = |key: &String| key.starts_with(&prefix);
        self.files.read().range(prefix.clone()..).next().is_some_and(|(k, _)| has_child(k))
            || self
                .directories
                .read()
                .range(prefix.clone()..)
                .next()
                .is_some_and(has_child)
    }

    fn physical_load(&self, path: &str) -> Result<Vec<u8>> {
        self.files
            .read()
            .get(path)
            .map(|data| data.to_vec())
            .ok_or_else(|| SegmentError::not_found(format!("{}{}", self.config.name, path)))
    }

    fn read_range(&self, path: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
        let files = self.files.read();
        let data = files
            .get(path)
            .ok_or_else(|| SegmentError::not_found(format!("{}{}", self.config.name, path)))?;
        let end = offset
            .checked_add(length)
            .filter(|&end| end <= data.len() as u64)
            .ok_or_else(|| {
                SegmentError::corruption(format!(
                    "range {offset}+{length} is outside package data file [{path}] of {} bytes",
                    data.len()
                ))
            })?;
        Ok(data[offset as usize..end as usize].to_vec())
    }
}

impl Directory for MemoryDirectory {
    fn root(&self) -> String {
        self.config.name.clone()
    }

    fn is_exist(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.physical_is_file(&path)
            || self.physical_is_dir(&path)
            || self.state.mounted(&path).is_some()
            || self.state.has_mounted_children(&path)
    }

    fn is_dir(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.physical_is_dir(&path)
            || self.state.mounted(&path).is_some_and(|m| m.is_dir)
            || self.state.has_mounted_children(&path)
    }

    fn file_length(&self, path: &str) -> Result<u64> {
        let path = normalize_path(path);
        if let Some(length) = self.state.solid_length(&path) {
            return Ok(length);
        }
        if let Some(data) = self.files.read().get(&path) {
            return Ok(data.len() as u64);
        }
        match self.state.mounted(&path) {
            Some(mounted) if !mounted.is_dir => Ok(mounted.length),
            _ => Err(SegmentError::not_found(format!(
                "{}{}",
                self.config.name, path
            ))),
        }
    }

    fn list_file(&self, path: &str, recursive: bool, physical: bool) -> Result<Vec<String>> {
        let path = normalize_path(path);
        let mut entries = BTreeMap::new();
        for name in self.files.read().keys() {
            add_listing_entry(&mut entries, name, false);
        }
        for name in self.directories.read().iter() {
            add_listing_entry(&mut entries, name, true);
        }
        if !physical {
            self.state.add_mounted_entries(&mut entries);
        }
        Ok(collect_listing(&path, &entries, recursive))
    }

    fn load(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize_path(path);
        if self.physical_is_file(&path) {
            return self.physical_load(&path);
        }
        match self.state.mounted(&path) {
            Some(mounted) if !mounted.is_dir => {
                self.read_range(&mounted.data_file, mounted.offset, mounted.length)
            }
            _ => Err(SegmentError::not_found(format!(
                "{}{}",
                self.config.name, path
            ))),
        }
    }

    fn set_path_lifecycle(&self, path: &str, lifecycle: &str) -> bool {
        self.state.set_lifecycle(path, lifecycle)
    }

    fn path_lifecycle(&self, path: &str) -> Option<String> {
        self.state.lifecycle(path)
    }

    fn add_solid_path_file_infos(&self, base: &str, infos: &[FileEntry]) {
        self.state.add_solid_lengths(base, infos);
    }

    fn mount_package_file(&self, prefix: &str) -> Result<bool> {
        self.state.mount_package(
            prefix,
            |path| self.physical_is_file(path),
            |path| self.physical_load(path),
        )
    }
}

//! Directory abstraction layer for segmeta.
//!
//! Segments are addressed through the [`Directory`] trait: a read-mostly,
//! hierarchical view over `/`-separated logical paths. Backends differ only
//! in where bytes physically live:
//!
//! - [`FileDirectory`]: files on the local file system
//! - [`MemoryDirectory`]: files held in memory, for tests and tooling
//! - [`PrefixedDirectory`]: a sub-directory view over another directory
//!
//! Every backend can *mount* a package file. Once mounted, the logical files
//! packed inside it answer `is_exist`, `file_length`, `load` and `list_file`
//! exactly like loose files.
//!
//! # Example
//!
//! ```
//! use segmeta::storage::{DirectoryConfig, DirectoryFactory, get_directory};
//! use segmeta::storage::memory::MemoryDirectoryConfig;
//!
//! # fn main() -> segmeta::error::Result<()> {
//! let root = DirectoryFactory::create(DirectoryConfig::Memory(MemoryDirectoryConfig::default()))?;
//! assert!(get_directory(&root, "segment_0_level_0", false)?.is_none());
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SegmentError};
use crate::package_file::PackageFileMeta;

pub mod file;
pub mod memory;
pub mod prefixed;

pub use file::{FileDirectory, FileDirectoryConfig};
pub use memory::{MemoryDirectory, MemoryDirectoryConfig};
pub use prefixed::PrefixedDirectory;

/// Length and timestamps of one logical file.
///
/// `-1` marks an unknown value. A path ending with `/` names a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub length: i64,
    pub create_time: i64,
    pub modify_time: i64,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, length: i64) -> Self {
        FileEntry {
            path: path.into(),
            length,
            create_time: 0,
            modify_time: 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.path.ends_with('/')
    }

    /// Stored length with unknown lengths reported as zero.
    pub fn effective_length(&self) -> u64 {
        self.length.max(0) as u64
    }
}

/// A hierarchical, read-mostly view over segment files.
///
/// All paths are relative to the directory and use `/` as separator.
pub trait Directory: Send + Sync + std::fmt::Debug {
    /// Human readable location of this directory, used in logs and errors.
    fn root(&self) -> String;

    /// Check if a file or directory exists.
    fn is_exist(&self, path: &str) -> bool;

    /// Check if `path` names a directory.
    fn is_dir(&self, path: &str) -> bool;

    /// Get the length of a file in bytes.
    ///
    /// Lengths registered through [`Directory::add_solid_path_file_infos`]
    /// are answered without touching the backend.
    fn file_length(&self, path: &str) -> Result<u64>;

    /// List the entries below `path`.
    ///
    /// Names are relative to `path`. In a recursive listing directories keep
    /// a trailing `/`; a shallow listing returns plain names. When
    /// `physical` is set, files mounted from package files are left out.
    fn list_file(&self, path: &str, recursive: bool, physical: bool) -> Result<Vec<String>>;

    /// Read a whole file.
    fn load(&self, path: &str) -> Result<Vec<u8>>;

    /// Attach an opaque storage-tiering tag to a sub-directory.
    fn set_path_lifecycle(&self, path: &str, lifecycle: &str) -> bool;

    /// Tag previously attached with [`Directory::set_path_lifecycle`].
    fn path_lifecycle(&self, path: &str) -> Option<String>;

    /// Register known file lengths below `base`.
    fn add_solid_path_file_infos(&self, base: &str, infos: &[FileEntry]);

    /// Mount the package file whose meta lives at `<prefix>.__meta__`.
    ///
    /// Returns `Ok(false)` when no such package exists.
    fn mount_package_file(&self, prefix: &str) -> Result<bool>;

    fn set_lifecycle(&self, lifecycle: &str) -> bool {
        self.set_path_lifecycle("", lifecycle)
    }

    fn lifecycle(&self) -> Option<String> {
        self.path_lifecycle("")
    }
}

/// Resolve a sub-directory of `parent`.
///
/// Returns `Ok(None)` when the sub-directory is absent, unless
/// `throw_if_absent` is set.
pub fn get_directory(
    parent: &Arc<dyn Directory>,
    path: &str,
    throw_if_absent: bool,
) -> Result<Option<Arc<dyn Directory>>> {
    let path = normalize_path(path);
    if path.is_empty() {
        return Ok(Some(Arc::clone(parent)));
    }
    if parent.is_dir(&path) {
        return Ok(Some(Arc::new(PrefixedDirectory::new(
            path,
            Arc::clone(parent),
        ))));
    }
    if throw_if_absent {
        return Err(SegmentError::not_found(format!(
            "directory [{}] does not exist in [{}]",
            path,
            parent.root()
        )));
    }
    Ok(None)
}

/// Normalize a logical path: no empty or `.` components, no leading or
/// trailing `/`.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Join two logical paths and normalize the result.
pub fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        normalize_path(name)
    } else if name.is_empty() {
        normalize_path(base)
    } else {
        normalize_path(&format!("{base}/{name}"))
    }
}

/// Parent of a normalized path, `""` for top-level entries.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}

/// Add `path` and all of its ancestors to a listing candidate map.
pub(crate) fn add_listing_entry(entries: &mut BTreeMap<String, bool>, path: &str, is_dir: bool) {
    let mut ancestor = parent_path(path);
    while !ancestor.is_empty() {
        entries.insert(ancestor.to_string(), true);
        ancestor = parent_path(ancestor);
    }
    entries
        .entry(path.to_string())
        .and_modify(|dir| *dir |= is_dir)
        .or_insert(is_dir);
}

/// Select the entries of `entries` (full path → is directory) below `dir`.
pub(crate) fn collect_listing(
    dir: &str,
    entries: &BTreeMap<String, bool>,
    recursive: bool,
) -> Vec<String> {
    let prefix = if dir.is_empty() {
        String::new()
    } else {
        format!("{dir}/")
    };

    entries
        .range(prefix.clone()..)
        .take_while(|(path, _)| path.starts_with(&prefix))
        .filter_map(|(path, is_dir)| {
            let relative = &path[prefix.len()..];
            if relative.is_empty() || (!recursive && relative.contains('/')) {
                return None;
            }
            if *is_dir && recursive {
                Some(format!("{relative}/"))
            } else {
                Some(relative.to_string())
            }
        })
        .collect()
}

/// Location of a logical file inside a mounted package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MountedFile {
    pub data_file: String,
    pub offset: u64,
    pub length: u64,
    pub is_dir: bool,
}

/// Side tables shared by the concrete backends.
///
/// Paths are full, normalized paths relative to the backend root.
#[derive(Debug, Default)]
pub(crate) struct DirectoryState {
    lifecycles: RwLock<HashMap<String, String>>,
    solid_lengths: RwLock<HashMap<String, u64>>,
    mounts: RwLock<BTreeMap<String, MountedFile>>,
    mounted_packages: RwLock<HashSet<String>>,
}

impl DirectoryState {
    pub fn set_lifecycle(&self, path: &str, lifecycle: &str) -> bool {
        self.lifecycles
            .write()
            .insert(normalize_path(path), lifecycle.to_string());
        true
    }

    pub fn lifecycle(&self, path: &str) -> Option<String> {
        self.lifecycles.read().get(&normalize_path(path)).cloned()
    }

    pub fn add_solid_lengths(&self, base: &str, infos: &[FileEntry]) {
        let mut lengths = self.solid_lengths.write();
        for info in infos.iter().filter(|info| !info.is_dir() && info.length >= 0) {
            lengths.insert(join_path(base, &info.path), info.length as u64);
        }
    }

    pub fn solid_length(&self, path: &str) -> Option<u64> {
        self.solid_lengths.read().get(path).copied()
    }

    pub fn mounted(&self, path: &str) -> Option<MountedFile> {
        self.mounts.read().get(path).cloned()
    }

    /// Whether any mounted file lives below `path`.
    pub fn has_mounted_children(&self, path: &str) -> bool {
        let prefix = format!("{path}/");
        self.mounts
            .read()
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(&prefix))
    }

    pub fn add_mounted_entries(&self, entries: &mut BTreeMap<String, bool>) {
        for (path, mounted) in self.mounts.read().iter() {
            add_listing_entry(entries, path, mounted.is_dir);
        }
    }

    /// Parse the package meta found at `<prefix>.__meta__` and register its
    /// inner files.
    pub fn mount_package(
        &self,
        prefix: &str,
        exists: impl Fn(&str) -> bool,
        load: impl Fn(&str) -> Result<Vec<u8>>,
    ) -> Result<bool> {
        let prefix = normalize_path(prefix);
        if self.mounted_packages.read().contains(&prefix) {
            return Ok(true);
        }

        let meta_path = PackageFileMeta::meta_file_path(&prefix);
        if !exists(&meta_path) {
            return Ok(false);
        }
        let meta = PackageFileMeta::from_bytes(&load(&meta_path)?)?;
        let base = parent_path(&prefix);

        let mut mounts = self.mounts.write();
        for inner in &meta.inner_files {
            let data_file = meta.data_file_name(inner.file_idx).ok_or_else(|| {
                SegmentError::corruption(format!(
                    "package [{meta_path}] references unknown data file index {}",
                    inner.file_idx
                ))
            })?;
            mounts.insert(
                join_path(base, &inner.path),
                MountedFile {
                    data_file: join_path(base, &data_file),
                    offset: inner.offset,
                    length: inner.length,
                    is_dir: inner.is_dir,
                },
            );
        }
        self.mounted_packages.write().insert(prefix.clone());
        debug!(
            "mounted package [{}] with {} inner files",
            prefix,
            meta.inner_files.len()
        );
        Ok(true)
    }
}

/// Configuration for directory backends.
#[derive(Debug, Clone)]
pub enum DirectoryConfig {
    /// File-based directory configuration (includes path)
    File(FileDirectoryConfig),

    /// Memory-based directory configuration
    Memory(MemoryDirectoryConfig),
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        DirectoryConfig::Memory(MemoryDirectoryConfig::default())
    }
}

/// A factory for creating directory instances.
pub struct DirectoryFactory;

impl DirectoryFactory {
    /// Create a directory backend for the given configuration.
    pub fn create(config: DirectoryConfig) -> Result<Arc<dyn Directory>> {
        match config {
            DirectoryConfig::Memory(mem_config) => Ok(Arc::new(MemoryDirectory::new(mem_config))),
            DirectoryConfig::File(file_config) => Ok(Arc::new(FileDirectory::new(file_config)?)),
        }
    }
}

//! In-memory metadata index of one segment.
//!
//! [`SegmentFileMeta`] merges the segment manifest and, when present, the
//! package file table of contents into one ordered map from logical path to
//! [`FileEntry`]. Existence checks, length lookups and listings are answered
//! from that map without touching the directory.
//!
//! Directories are stored with a trailing `/` so that an empty directory is
//! distinguishable from a file of the same name. Because the map is ordered
//! byte-lexicographically, the children of `dir` are the contiguous run of
//! keys starting with `dir/`.
//!
//! A segment may nest a joined child table under `sub_segment/`. Loading with
//! `is_sub` keeps only those entries, re-rooted at the sub-segment.
//!
//! # Example
//!
//! ```
//! use segmeta::config::LoadConfig;
//! use segmeta::index_file_list::{IndexFileList, SEGMENT_FILE_LIST};
//! use segmeta::segment_file_meta::SegmentFileMeta;
//! use segmeta::storage::memory::MemoryDirectory;
//!
//! # fn main() -> segmeta::error::Result<()> {
//! let directory = MemoryDirectory::new_default();
//! let mut file_list = IndexFileList::new();
//! file_list.append("attribute/", -1);
//! file_list.append("attribute/long1/", -1);
//! file_list.append("attribute/long1/data", 100);
//! directory.write_file(SEGMENT_FILE_LIST, file_list.to_bytes()?);
//!
//! let meta = SegmentFileMeta::create(&directory, false, &LoadConfig::default())?
//!     .expect("manifest present");
//! assert_eq!(meta.get_file_length("attribute/long1/data", true), 100);
//! assert_eq!(meta.list_file("attribute", false), vec!["long1"]);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use log::{debug, warn};

use crate::config::LoadConfig;
use crate::error::Result;
use crate::index_file_list::IndexFileList;
use crate::package_file::{PACKAGE_FILE_PREFIX, PackageFileMeta};
use crate::storage::{Directory, FileEntry, join_path, normalize_path, parent_path};

/// Directory holding the joined child table of a segment.
pub const SUB_SEGMENT_DIR_NAME: &str = "sub_segment";

/// Cached file layout of one segment.
#[derive(Debug, Clone, Default)]
pub struct SegmentFileMeta {
    root: String,
    file_metas: BTreeMap<String, FileEntry>,
    has_package_file: bool,
    is_sub: bool,
}

impl SegmentFileMeta {
    /// Load the metadata of the segment rooted at `directory`.
    ///
    /// `Ok(None)` means the segment has no usable manifest and callers must
    /// query the directory directly.
    pub fn create(
        directory: &dyn Directory,
        is_sub: bool,
        config: &LoadConfig,
    ) -> Result<Option<Self>> {
        let mut meta = SegmentFileMeta::default();
        match meta.load(directory, is_sub, config) {
            Ok(true) => Ok(Some(meta)),
            Ok(false) => Ok(None),
            Err(e) if e.is_corruption() && config.fallback_on_corrupt_manifest => {
                warn!(
                    "ignoring unreadable segment metadata in [{}]: {}",
                    directory.root(),
                    e
                );
                Ok(None)
            }
            Err(e) if !e.is_corruption() && !e.is_index_collapsed() => {
                // Retries are exhausted at this point, fall back to live reads.
                warn!(
                    "failed to load segment metadata in [{}]: {}",
                    directory.root(),
                    e
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Populate this instance from `directory`.
    ///
    /// On `Ok(false)` or `Err` the instance is left in an unspecified state
    /// and must be discarded.
    pub fn load(
        &mut self,
        directory: &dyn Directory,
        is_sub: bool,
        config: &LoadConfig,
    ) -> Result<bool> {
        self.root = directory.root();
        self.file_metas.clear();
        self.has_package_file = false;
        self.is_sub = is_sub;

        let Some(loaded) = IndexFileList::load(directory, config)? else {
            return Ok(false);
        };

        let entries = loaded.file_list.file_entries();
        for entry in &entries {
            self.insert(entry.clone());
        }

        // The manifest is not part of its own file list.
        self.insert(FileEntry::new(
            loaded.file_name.as_str(),
            loaded.byte_size as i64,
        ));
        if let Some(lifecycle) = &loaded.file_list.lifecycle {
            if !directory.set_lifecycle(lifecycle) {
                warn!(
                    "directory [{}] rejected lifecycle [{}]",
                    self.root, lifecycle
                );
            }
        }
        directory.add_solid_path_file_infos("", &entries);

        if !self.load_package_file_meta(directory, false)? {
            return Ok(false);
        }
        if directory.is_exist(SUB_SEGMENT_DIR_NAME)
            && !self.load_package_file_meta(directory, true)?
        {
            return Ok(false);
        }

        if config.synthesize_parent_directories {
            self.synthesize_parent_directories();
        }
        if is_sub {
            self.retain_sub_segment();
        }
        debug!(
            "loaded {} file metas for [{}] (package: {}, sub: {})",
            self.file_metas.len(),
            self.root,
            self.has_package_file,
            self.is_sub
        );
        Ok(true)
    }

    /// Merge the package table of contents found in `directory` (or in its
    /// sub-segment when `append_sub_name` is set).
    ///
    /// A missing package is not an error. Malformed package metadata is
    /// returned as a corruption error.
    pub fn load_package_file_meta(
        &mut self,
        directory: &dyn Directory,
        append_sub_name: bool,
    ) -> Result<bool> {
        let prefix = if append_sub_name {
            join_path(SUB_SEGMENT_DIR_NAME, PACKAGE_FILE_PREFIX)
        } else {
            PACKAGE_FILE_PREFIX.to_string()
        };
        let Some(package_meta) = PackageFileMeta::load(directory, &prefix)? else {
            return Ok(true);
        };
        self.has_package_file = true;

        let base = parent_path(&prefix);
        for inner in &package_meta.inner_files {
            let mut path = join_path(base, &inner.path);
            if inner.is_dir {
                path.push('/');
            }
            let length = if inner.is_dir { -1 } else { inner.length as i64 };
            self.file_metas.insert(
                path.clone(),
                FileEntry {
                    path,
                    length,
                    create_time: -1,
                    modify_time: -1,
                },
            );
        }

        for physical in package_meta.physical_paths(base, PACKAGE_FILE_PREFIX) {
            self.file_metas.remove(&physical);
        }
        Ok(true)
    }

    /// Names below `dir_path`, relative to it, in lexicographic order.
    pub fn list_file(&self, dir_path: &str, recursive: bool) -> Vec<String> {
        self.scan(dir_path, recursive)
            .map(|(name, _)| name)
            .collect()
    }

    /// Like [`SegmentFileMeta::list_file`], paired with each entry's length.
    pub fn list_file_with_length(&self, dir_path: &str, recursive: bool) -> Vec<(String, u64)> {
        self.scan(dir_path, recursive)
            .map(|(name, entry)| (name, entry.effective_length()))
            .collect()
    }

    /// Total length of everything below `dir_path`.
    pub fn calculate_directory_size(&self, dir_path: &str) -> u64 {
        self.list_file_with_length(dir_path, true)
            .iter()
            .map(|(_, length)| length)
            .sum()
    }

    pub fn is_exist(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.file_metas.contains_key(&path) || self.file_metas.contains_key(&format!("{path}/"))
    }

    /// Length of the file at `path`, `0` when it is unknown.
    pub fn get_file_length(&self, path: &str, ignore_no_entry: bool) -> u64 {
        let path = normalize_path(path);
        match self.file_metas.get(&path) {
            Some(entry) => entry.effective_length(),
            None => {
                if !ignore_no_entry {
                    warn!("file [{}] not found in segment meta of [{}]", path, self.root);
                }
                0
            }
        }
    }

    pub fn has_package_file(&self) -> bool {
        self.has_package_file
    }

    pub fn is_sub(&self) -> bool {
        self.is_sub
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.file_metas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_metas.is_empty()
    }

    /// All entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.file_metas.values()
    }

    fn insert(&mut self, mut entry: FileEntry) {
        let is_dir = entry.is_dir();
        let mut path = normalize_path(&entry.path);
        if path.is_empty() {
            return;
        }
        if is_dir {
            path.push('/');
        }
        entry.path = path.clone();
        self.file_metas.insert(path, entry);
    }

    fn synthesize_parent_directories(&mut self) {
        let mut parents = Vec::new();
        for path in self.file_metas.keys() {
            let mut parent = parent_path(path.trim_end_matches('/'));
            while !parent.is_empty() {
                parents.push(format!("{parent}/"));
                parent = parent_path(parent);
            }
        }
        for parent in parents {
            if let Entry::Vacant(slot) = self.file_metas.entry(parent.clone()) {
                slot.insert(FileEntry::new(parent, -1));
            }
        }
    }

    fn retain_sub_segment(&mut self) {
        let prefix = format!("{SUB_SEGMENT_DIR_NAME}/");
        let file_metas = std::mem::take(&mut self.file_metas);
        self.file_metas = file_metas
            .into_iter()
            .filter_map(|(key, mut entry)| {
                let stripped = key.strip_prefix(&prefix)?;
                if stripped.is_empty() {
                    return None;
                }
                entry.path = stripped.to_string();
                Some((entry.path.clone(), entry))
            })
            .collect();
    }

    /// Prefix range scan applying the directory-membership rules.
    fn scan<'a>(
        &'a self,
        dir_path: &str,
        recursive: bool,
    ) -> impl Iterator<Item = (String, &'a FileEntry)> + 'a {
        let dir = normalize_path(dir_path);
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };

        self.file_metas
            .range(prefix.clone()..)
            .take_while({
                let prefix = prefix.clone();
                move |(key, _)| key.starts_with(&prefix)
            })
            .filter_map(move |(key, entry)| {
                is_sub_directory(&prefix, key, recursive).map(|name| (name, entry))
            })
    }
}

/// Relative name of `path` inside the directory `prefix` (which ends with
/// `/` unless it is the root), or `None` when `path` is not listed.
fn is_sub_directory(prefix: &str, path: &str, recursive: bool) -> Option<String> {
    let relative = path.strip_prefix(prefix)?;
    // The directory marker itself.
    if relative.is_empty() {
        return None;
    }
    let is_dir = relative.ends_with('/');
    let name = relative.trim_end_matches('/');
    if !recursive && name.contains('/') {
        return None;
    }
    if is_dir && !recursive {
        Some(name.to_string())
    } else {
        Some(relative.to_string())
    }
}

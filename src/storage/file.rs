//! File-based directory implementation.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{Result, SegmentError};
use crate::storage::{
    Directory, DirectoryState, FileEntry, add_listing_entry, collect_listing, join_path,
    normalize_path,
};

/// Configuration for [`FileDirectory`].
#[derive(Debug, Clone)]
pub struct FileDirectoryConfig {
    /// Root of the directory on the local file system.
    pub path: PathBuf,

    /// Create the root when it does not exist yet.
    pub create_if_missing: bool,
}

impl FileDirectoryConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileDirectoryConfig {
            path: path.as_ref().to_path_buf(),
            create_if_missing: false,
        }
    }
}

/// A directory backed by the local file system.
#[derive(Debug)]
pub struct FileDirectory {
    directory: PathBuf,
    state: DirectoryState,
}

impl FileDirectory {
    pub fn new(config: FileDirectoryConfig) -> Result<Self> {
        let directory = config.path;

        if !directory.exists() {
            if !config.create_if_missing {
                return Err(SegmentError::not_found(format!(
                    "directory does not exist: {}",
                    directory.display()
                )));
            }
            std::fs::create_dir_all(&directory)
                .map_err(|e| SegmentError::storage(format!("Failed to create directory: {e}")))?;
        }

        if !directory.is_dir() {
            return Err(SegmentError::storage(format!(
                "Path is not a directory: {}",
                directory.display()
            )));
        }

        Ok(FileDirectory {
            directory,
            state: DirectoryState::default(),
        })
    }

    /// Open an existing directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(FileDirectoryConfig::new(path))
    }

    /// Write a file, creating parent directories as needed.
    pub fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.file_path(&normalize_path(path));
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(full_path, data)?;
        Ok(())
    }

    pub fn make_directory(&self, path: &str) -> Result<()> {
        std::fs::create_dir_all(self.file_path(&normalize_path(path)))?;
        Ok(())
    }

    /// Get the full path for a logical name.
    fn file_path(&self, name: &str) -> PathBuf {
        if name.is_empty() {
            self.directory.clone()
        } else {
            self.directory.join(name)
        }
    }

    fn physical_is_file(&self, path: &str) -> bool {
        self.file_path(path).is_file()
    }

    fn physical_load(&self, path: &str) -> Result<Vec<u8>> {
        std::fs::read(self.file_path(path)).map_err(|e| map_io_error(path, e))
    }

    fn read_range(&self, path: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
        let mut file = File::open(self.file_path(path)).map_err(|e| map_io_error(path, e))?;
        let file_length = file.metadata()?.len();
        if offset.checked_add(length).is_none_or(|end| end > file_length) {
            return Err(SegmentError::corruption(format!(
                "range {offset}+{length} is outside package data file [{path}] of {file_length} bytes"
            )));
        }
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; length as usize];
        file.read_exact(&mut buffer).map_err(|e| {
            SegmentError::corruption(format!(
                "failed to read {length} bytes at {offset} from package data file [{path}]: {e}"
            ))
        })?;
        Ok(buffer)
    }

    fn walk(&self, base: &str, recursive: bool, entries: &mut BTreeMap<String, bool>) -> Result<()> {
        let read_dir = match std::fs::read_dir(self.file_path(base)) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(map_io_error(base, e)),
        };

        for entry in read_dir {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let path = join_path(base, &name);
            let is_dir = entry.file_type()?.is_dir();
            add_listing_entry(entries, &path, is_dir);
            if is_dir && recursive {
                self.walk(&path, recursive, entries)?;
            }
        }
        Ok(())
    }
}

fn map_io_error(path: &str, e: std::io::Error) -> SegmentError {
    if e.kind() == std::io::ErrorKind::NotFound {
        SegmentError::not_found(path.to_string())
    } else {
        SegmentError::Io(e)
    }
}

impl Directory for FileDirectory {
    fn root(&self) -> String {
        self.directory.display().to_string()
    }

    fn is_exist(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.file_path(&path).exists()
            || self.state.mounted(&path).is_some()
            || self.state.has_mounted_children(&path)
    }

    fn is_dir(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.file_path(&path).is_dir()
            || self.state.mounted(&path).is_some_and(|m| m.is_dir)
            || self.state.has_mounted_children(&path)
    }

    fn file_length(&self, path: &str) -> Result<u64> {
        let path = normalize_path(path);
        if let Some(length) = self.state.solid_length(&path) {
            return Ok(length);
        }
        match std::fs::metadata(self.file_path(&path)) {
            Ok(metadata) if metadata.is_file() => return Ok(metadata.len()),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        match self.state.mounted(&path) {
            Some(mounted) if !mounted.is_dir => Ok(mounted.length),
            _ => Err(SegmentError::not_found(path)),
        }
    }

    fn list_file(&self, path: &str, recursive: bool, physical: bool) -> Result<Vec<String>> {
        let path = normalize_path(path);
        // Full paths are collected so that mounted entries merge in one sorted set.
        let mut entries = BTreeMap::new();
        if self.file_path(&path).is_dir() {
            self.walk(&path, recursive, &mut entries)?;
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
            _ => Err(SegmentError::not_found(path)),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package_file::{InnerFileMeta, PackageFileMeta};
    use tempfile::TempDir;

    fn create_test_directory() -> (TempDir, FileDirectory) {
        let temp_dir = TempDir::new().unwrap();
        let directory = FileDirectory::open(temp_dir.path()).unwrap();
        (temp_dir, directory)
    }

    #[test]
    fn test_open_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");

        assert!(FileDirectory::open(&missing).unwrap_err().is_not_found());

        let mut config = FileDirectoryConfig::new(&missing);
        config.create_if_missing = true;
        assert!(FileDirectory::new(config).is_ok());
        assert!(missing.is_dir());
    }

    #[test]
    fn test_file_operations() {
        let (_temp_dir, directory) = create_test_directory();

        assert!(!directory.is_exist("index/title/posting"));
        directory.write_file("index/title/posting", b"Test content").unwrap();

        assert!(directory.is_exist("index/title/posting"));
        assert!(directory.is_dir("index/title"));
        assert_eq!(directory.file_length("index/title/posting").unwrap(), 12);
        assert_eq!(directory.load("index/title/posting").unwrap(), b"Test content");
        assert!(directory.file_length("index/title").unwrap_err().is_not_found());
    }

    #[test]
    fn test_listing() {
        let (_temp_dir, directory) = create_test_directory();
        directory.write_file("attribute/long1/data", b"0123").unwrap();
        directory.write_file("attribute/long1/offset", b"01").unwrap();
        directory.make_directory("attribute/empty").unwrap();

        assert_eq!(
            directory.list_file("attribute", false, true).unwrap(),
            vec!["empty", "long1"]
        );
        assert_eq!(
            directory.list_file("attribute", true, true).unwrap(),
            vec!["empty/", "long1/", "long1/data", "long1/offset"]
        );
        assert!(directory.list_file("missing", true, true).unwrap().is_empty());
    }

    #[test]
    fn test_lifecycle() {
        let (_temp_dir, directory) = create_test_directory();

        assert_eq!(directory.lifecycle(), None);
        assert!(directory.set_lifecycle("hot"));
        assert_eq!(directory.lifecycle().as_deref(), Some("hot"));
        assert!(directory.set_path_lifecycle("segment_1_level_0", "cold"));
        assert_eq!(
            directory.path_lifecycle("segment_1_level_0/").as_deref(),
            Some("cold")
        );
    }

    #[test]
    fn test_package_range_outside_data_file() {
        let (_temp_dir, directory) = create_test_directory();
        let meta = PackageFileMeta {
            inner_files: vec![
                InnerFileMeta {
                    path: "index/pk/data".to_string(),
                    offset: 1,
                    length: 2,
                    is_dir: false,
                    file_idx: 0,
                },
                InnerFileMeta {
                    path: "index/pk/huge".to_string(),
                    offset: 2,
                    length: u64::MAX,
                    is_dir: false,
                    file_idx: 0,
                },
            ],
            file_names: vec![],
            tags: vec![String::new()],
            alignment: 1,
        };
        directory
            .write_file("package_file.__meta__", &meta.to_bytes().unwrap())
            .unwrap();
        directory.write_file("package_file.__data__0", b"xpkz").unwrap();
        assert!(directory.mount_package_file("package_file").unwrap());

        assert_eq!(directory.load("index/pk/data").unwrap(), b"pk");
        assert!(directory.load("index/pk/huge").unwrap_err().is_corruption());
    }
}

//! Per-segment manifest (`segment_file_list`, legacy `deploy_index`).
//!
//! The manifest is written when a segment is sealed and lists every file the
//! segment contains together with its length. Directory entries end with
//! `/` and carry a length of `-1`.

use std::thread;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::LoadConfig;
use crate::error::{Result, SegmentError};
use crate::storage::{Directory, FileEntry};

pub const SEGMENT_FILE_LIST: &str = "segment_file_list";
pub const DEPLOY_INDEX_FILE_NAME: &str = "deploy_index";

/// One manifest record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployFileMeta {
    pub path: String,
    #[serde(default = "unknown_length")]
    pub file_length: i64,
    #[serde(default)]
    pub modify_time: i64,
}

fn unknown_length() -> i64 {
    -1
}

/// Parsed manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFileList {
    #[serde(default)]
    pub deploy_file_metas: Vec<DeployFileMeta>,

    /// Files written after the segment was dumped (e.g. by an end-merge).
    #[serde(default)]
    pub final_deploy_file_metas: Vec<DeployFileMeta>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<String>,
}

/// A manifest read from a segment directory.
#[derive(Debug, Clone)]
pub struct LoadedFileList {
    pub file_list: IndexFileList,
    /// Name of the manifest file that was read.
    pub file_name: String,
    /// Serialized size of the manifest file.
    pub byte_size: u64,
}

impl IndexFileList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, path: impl Into<String>, file_length: i64) {
        self.deploy_file_metas.push(DeployFileMeta {
            path: path.into(),
            file_length,
            modify_time: 0,
        });
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| SegmentError::corruption(format!("invalid index file list: {e}")))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// All records as file entries, declared files first.
    pub fn file_entries(&self) -> Vec<FileEntry> {
        self.deploy_file_metas
            .iter()
            .chain(self.final_deploy_file_metas.iter())
            .map(|meta| FileEntry {
                path: meta.path.clone(),
                length: meta.file_length,
                create_time: 0,
                modify_time: meta.modify_time,
            })
            .collect()
    }

    /// Read the manifest of a segment.
    ///
    /// Returns `Ok(None)` when the segment carries no manifest. An I/O error
    /// on an existing manifest is retried `manifest_retry_count` times before
    /// being returned; malformed content is returned as a corruption error
    /// immediately.
    pub fn load(directory: &dyn Directory, config: &LoadConfig) -> Result<Option<LoadedFileList>> {
        let Some(file_name) = [SEGMENT_FILE_LIST, DEPLOY_INDEX_FILE_NAME]
            .into_iter()
            .find(|name| directory.is_exist(name))
        else {
            debug!("no index file list in [{}]", directory.root());
            return Ok(None);
        };

        let mut attempt = 0;
        let bytes = loop {
            match directory.load(file_name) {
                Ok(bytes) => break bytes,
                Err(e) if e.is_not_found() => return Ok(None),
                Err(e) if attempt < config.manifest_retry_count => {
                    attempt += 1;
                    warn!(
                        "reading [{}/{}] failed ({}), retry {}/{}",
                        directory.root(),
                        file_name,
                        e,
                        attempt,
                        config.manifest_retry_count
                    );
                    thread::sleep(config.retry_interval());
                }
                Err(e) => return Err(e),
            }
        };

        let file_list = Self::from_bytes(&bytes)?;
        Ok(Some(LoadedFileList {
            file_list,
            file_name: file_name.to_string(),
            byte_size: bytes.len() as u64,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::segment_file_meta::SegmentFileMeta;
    use crate::storage::memory::MemoryDirectory;

    /// Memory directory whose manifest reads fail the first `failures` times.
    #[derive(Debug)]
    struct FlakyDirectory {
        inner: MemoryDirectory,
        failures: u32,
        attempts: AtomicU32,
    }

    impl FlakyDirectory {
        fn new(failures: u32) -> Self {
            let inner = MemoryDirectory::new_default();
            let mut file_list = IndexFileList::new();
            file_list.append("index/pk/data", 8);
            inner.write_file(SEGMENT_FILE_LIST, file_list.to_bytes().unwrap());
            FlakyDirectory {
                inner,
                failures,
                attempts: AtomicU32::new(0),
            }
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl Directory for FlakyDirectory {
        fn root(&self) -> String {
            self.inner.root()
        }

        fn is_exist(&self, path: &str) -> bool {
            self.inner.is_exist(path)
        }

        fn is_dir(&self, path: &str) -> bool {
            self.inner.is_dir(path)
        }

        fn file_length(&self, path: &str) -> Result<u64> {
            self.inner.file_length(path)
        }

        fn list_file(&self, path: &str, recursive: bool, physical: bool) -> Result<Vec<String>> {
            self.inner.list_file(path, recursive, physical)
        }

        fn load(&self, path: &str) -> Result<Vec<u8>> {
            if path == SEGMENT_FILE_LIST {
                let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
                if attempt < self.failures {
                    return Err(io::Error::other("connection reset").into());
                }
            }
            self.inner.load(path)
        }

        fn set_path_lifecycle(&self, path: &str, lifecycle: &str) -> bool {
            self.inner.set_path_lifecycle(path, lifecycle)
        }

        fn path_lifecycle(&self, path: &str) -> Option<String> {
            self.inner.path_lifecycle(path)
        }

        fn add_solid_path_file_infos(&self, base: &str, infos: &[FileEntry]) {
            self.inner.add_solid_path_file_infos(base, infos)
        }

        fn mount_package_file(&self, prefix: &str) -> Result<bool> {
            self.inner.mount_package_file(prefix)
        }
    }

    fn quick_retries(count: u32) -> LoadConfig {
        LoadConfig {
            manifest_retry_count: count,
            retry_interval_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_defaults() {
        let list = IndexFileList::from_bytes(
            br#"{"deploy_file_metas":[{"path":"index/"},{"path":"index/pk/data","file_length":8}]}"#,
        )
        .unwrap();

        let entries = list.file_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].length, -1);
        assert!(entries[0].is_dir());
        assert_eq!(entries[1].length, 8);
        assert_eq!(list.lifecycle, None);
    }

    #[test]
    fn test_load_prefers_segment_file_list() {
        let directory = MemoryDirectory::new_default();
        let mut legacy = IndexFileList::new();
        legacy.append("legacy", 1);
        directory.write_file(DEPLOY_INDEX_FILE_NAME, legacy.to_bytes().unwrap());

        let loaded = IndexFileList::load(&directory, &LoadConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(loaded.file_name, DEPLOY_INDEX_FILE_NAME);

        let mut current = IndexFileList::new();
        current.append("current", 2);
        current.lifecycle = Some("hot".to_string());
        let bytes = current.to_bytes().unwrap();
        directory.write_file(SEGMENT_FILE_LIST, bytes.clone());

        let loaded = IndexFileList::load(&directory, &LoadConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(loaded.file_name, SEGMENT_FILE_LIST);
        assert_eq!(loaded.byte_size, bytes.len() as u64);
        assert_eq!(loaded.file_list, current);
    }

    #[test]
    fn test_missing_and_corrupt() {
        let directory = MemoryDirectory::new_default();
        assert!(IndexFileList::load(&directory, &LoadConfig::default())
            .unwrap()
            .is_none());

        directory.write_file(SEGMENT_FILE_LIST, b"[broken".to_vec());
        let err = IndexFileList::load(&directory, &LoadConfig::default()).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_load_retries_io_errors() {
        let directory = FlakyDirectory::new(2);
        let loaded = IndexFileList::load(&directory, &quick_retries(2))
            .unwrap()
            .unwrap();
        assert_eq!(directory.attempts(), 3);
        assert_eq!(loaded.file_list.file_entries()[0].path, "index/pk/data");
    }

    #[test]
    fn test_exhausted_retries_fall_back_to_live_reads() {
        let directory = FlakyDirectory::new(u32::MAX);
        let err = IndexFileList::load(&directory, &quick_retries(2)).unwrap_err();
        assert!(!err.is_corruption());
        assert_eq!(directory.attempts(), 3);

        let meta = SegmentFileMeta::create(&directory, false, &quick_retries(2)).unwrap();
        assert!(meta.is_none());
        assert_eq!(directory.attempts(), 6);
    }

    #[test]
    fn test_strict_config_does_not_retry() {
        let directory = FlakyDirectory::new(1);
        assert!(IndexFileList::load(&directory, &LoadConfig::strict()).is_err());
        assert_eq!(directory.attempts(), 1);
    }
}

//! Package file table of contents.
//!
//! A package file concatenates many logical files into one or more physical
//! data shards. A small JSON meta file next to the shards describes where
//! every logical file lives:
//!
//! ```text
//! package_file.__meta__          table of contents
//! package_file.__data__0         shard with an empty tag
//! package_file.__data__.HOT.1    shard tagged "HOT"
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, SegmentError};
use crate::storage::{Directory, join_path, normalize_path};

/// Prefix shared by every package file of a segment.
pub const PACKAGE_FILE_PREFIX: &str = "package_file";
pub const PACKAGE_FILE_META_SUFFIX: &str = ".__meta__";
pub const PACKAGE_FILE_DATA_SUFFIX: &str = ".__data__";

/// One logical file (or directory) stored inside a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerFileMeta {
    pub path: String,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub length: u64,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub file_idx: usize,
}

/// Parsed content of a `<prefix>.__meta__` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFileMeta {
    pub inner_files: Vec<InnerFileMeta>,

    /// Physical data shard names as written by the packer.
    #[serde(default)]
    pub file_names: Vec<String>,

    /// Physical tag of every data shard, indexed like `file_names`.
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub alignment: u64,
}

impl PackageFileMeta {
    /// Path of the meta file for a package prefix.
    pub fn meta_file_path(prefix: &str) -> String {
        format!("{}{}", normalize_path(prefix), PACKAGE_FILE_META_SUFFIX)
    }

    /// Derive the name of a data shard from the package prefix, its physical
    /// tag and its index.
    pub fn data_file_path(prefix: &str, tag: &str, idx: usize) -> String {
        let prefix = normalize_path(prefix);
        if tag.is_empty() {
            format!("{prefix}{PACKAGE_FILE_DATA_SUFFIX}{idx}")
        } else {
            format!("{prefix}{PACKAGE_FILE_DATA_SUFFIX}.{tag}.{idx}")
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            SegmentError::corruption(format!("invalid package file meta: {e}"))
        })
    }

    /// Read `<prefix>.__meta__` from `directory`.
    ///
    /// Returns `Ok(None)` when the package does not exist.
    pub fn load(directory: &dyn Directory, prefix: &str) -> Result<Option<Self>> {
        let meta_path = Self::meta_file_path(prefix);
        if !directory.is_exist(&meta_path) {
            return Ok(None);
        }
        let bytes = directory.load(&meta_path)?;
        Self::from_bytes(&bytes).map(Some)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn physical_file_count(&self) -> usize {
        self.file_names.len().max(self.tags.len())
    }

    /// Name of data shard `idx`, relative to the directory holding the package.
    ///
    /// The stored name wins; otherwise the name is derived from the tag.
    pub fn data_file_name(&self, idx: usize) -> Option<String> {
        if let Some(name) = self.file_names.get(idx) {
            return Some(name.clone());
        }
        self.tags
            .get(idx)
            .map(|tag| Self::data_file_path(PACKAGE_FILE_PREFIX, tag, idx))
    }

    /// Every physical path this package occupies below `base`: the meta file,
    /// the derived shard names and the stored shard names.
    pub fn physical_paths(&self, base: &str, prefix: &str) -> Vec<String> {
        let mut paths = vec![join_path(base, &Self::meta_file_path(prefix))];
        for (idx, tag) in self.tags.iter().enumerate() {
            paths.push(join_path(base, &Self::data_file_path(prefix, tag, idx)));
        }
        for name in &self.file_names {
            paths.push(join_path(base, name));
        }
        paths.sort();
        paths.dedup();
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_meta() -> PackageFileMeta {
        PackageFileMeta {
            inner_files: vec![
                InnerFileMeta {
                    path: "attribute".to_string(),
                    offset: 0,
                    length: 0,
                    is_dir: true,
                    file_idx: 0,
                },
                InnerFileMeta {
                    path: "attribute/long1/data".to_string(),
                    offset: 0,
                    length: 100,
                    is_dir: false,
                    file_idx: 1,
                },
            ],
            file_names: vec![],
            tags: vec![String::new(), "HOT".to_string()],
            alignment: 4096,
        }
    }

    #[test]
    fn test_file_names() {
        assert_eq!(
            PackageFileMeta::meta_file_path("package_file"),
            "package_file.__meta__"
        );
        assert_eq!(
            PackageFileMeta::data_file_path("package_file", "", 0),
            "package_file.__data__0"
        );
        assert_eq!(
            PackageFileMeta::data_file_path("sub_segment/package_file", "HOT", 3),
            "sub_segment/package_file.__data__.HOT.3"
        );
    }

    #[test]
    fn test_data_file_name_prefers_stored_names() {
        let mut meta = sample_meta();
        assert_eq!(
            meta.data_file_name(1).as_deref(),
            Some("package_file.__data__.HOT.1")
        );

        meta.file_names = vec!["package_file.__data__0".into(), "renamed".into()];
        assert_eq!(meta.data_file_name(1).as_deref(), Some("renamed"));
        assert_eq!(meta.data_file_name(2), None);
    }

    #[test]
    fn test_physical_paths() {
        let mut meta = sample_meta();
        meta.file_names = vec!["package_file.__data__0".into(), "legacy_shard".into()];

        let paths = meta.physical_paths("sub_segment", "package_file");
        assert_eq!(
            paths,
            vec![
                "sub_segment/legacy_shard",
                "sub_segment/package_file.__data__.HOT.1",
                "sub_segment/package_file.__data__0",
                "sub_segment/package_file.__meta__",
            ]
        );
    }

    #[test]
    fn test_parse() {
        let meta = sample_meta();
        let parsed = PackageFileMeta::from_bytes(&meta.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.inner_files.len(), 2);
        assert_eq!(parsed.physical_file_count(), 2);

        let err = PackageFileMeta::from_bytes(b"{not json").unwrap_err();
        assert!(err.is_corruption());
    }
}

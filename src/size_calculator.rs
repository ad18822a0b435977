//! On-disk size accounting of segments.
//!
//! [`OnDiskSegmentSizeCalculator`] walks the schema and sums the lengths of
//! the files each index, attribute and summary group owns. Every length
//! goes through a [`SegmentFileView`], so the same code serves segments
//! with and without cached metadata. Missing files count as zero.
//!
//! Sizes are also recorded per schema item in a [`SizeInfoMap`]:
//!
//! | key | item |
//! |---|---|
//! | `inverted_index.<name>` | an index of a normal table |
//! | `attribute.<name>` | attribute or pack attribute data |
//! | `attribute.<name>(patch)` | attribute patch files |
//! | `summary` | all summary groups |
//! | `kv.<name>`, `kkv.<name>` | key-value indexes |
//! | `custom` | customized tables |

use std::collections::BTreeMap;

use log::{debug, warn};
use rayon::prelude::*;

use crate::config::LoadConfig;
use crate::error::{Result, SegmentError};
use crate::file_view::{SegmentFileView, file_view};
use crate::schema::{IndexConfig, IndexType, Schema, TableType};
use crate::segment_directory::{MultiPartSegmentDirectory, SegmentData};
use crate::segment_file_meta::SegmentFileMeta;
use crate::storage::{Directory, get_directory, join_path};
use crate::version::SegmentId;

pub const INDEX_DIR_NAME: &str = "index";
pub const ATTRIBUTE_DIR_NAME: &str = "attribute";
pub const SUMMARY_DIR_NAME: &str = "summary";
pub const CUSTOM_DIR_NAME: &str = "custom";

pub const POSTING_FILE_NAME: &str = "posting";
pub const DICTIONARY_FILE_NAME: &str = "dictionary";
pub const BITMAP_DICTIONARY_FILE_NAME: &str = "bitmap_dictionary";
pub const BITMAP_POSTING_FILE_NAME: &str = "bitmap_posting";
pub const SECTION_DIR_NAME_SUFFIX: &str = "_section";
pub const PRIMARY_KEY_DATA_FILE_NAME: &str = "data";
pub const PK_ATTRIBUTE_DIR_NAME_PREFIX: &str = "attribute_";
pub const ATTRIBUTE_DATA_FILE_NAME: &str = "data";
pub const ATTRIBUTE_OFFSET_FILE_NAME: &str = "offset";
pub const ATTRIBUTE_PATCH_FILE_SUFFIX: &str = "patch";
pub const SUMMARY_DATA_FILE_NAME: &str = "data";
pub const SUMMARY_OFFSET_FILE_NAME: &str = "offset";
pub const KV_KEY_FILE_NAME: &str = "key";
pub const KV_VALUE_FILE_NAME: &str = "value";
pub const KKV_PKEY_FILE_NAME: &str = "pkey";
pub const KKV_SKEY_FILE_NAME: &str = "skey";
pub const KKV_VALUE_FILE_NAME: &str = "value";
pub const SHARDING_COLUMN_DIR_PREFIX: &str = "column_";

/// Size per schema item, accumulated over repeated writes.
pub type SizeInfoMap = BTreeMap<String, u64>;

/// Length of `<index_path>/<file_name>`, `0` when it does not exist.
pub fn get_file_length(view: &dyn SegmentFileView, index_path: &str, file_name: &str) -> u64 {
    view.file_length(&join_path(index_path, file_name))
        .unwrap_or(0)
}

fn add_size(size_infos: &mut SizeInfoMap, key: String, size: u64) {
    *size_infos.entry(key).or_insert(0) += size;
}

/// Computes the on-disk footprint of segments.
#[derive(Debug, Clone, Default)]
pub struct OnDiskSegmentSizeCalculator {
    config: LoadConfig,
}

impl OnDiskSegmentSizeCalculator {
    pub fn new(config: LoadConfig) -> Self {
        OnDiskSegmentSizeCalculator { config }
    }

    /// Total size of one segment, dispatched on the table type.
    pub fn collect_segment_size_info(
        &self,
        segment_data: &SegmentData,
        schema: &Schema,
        size_infos: &mut SizeInfoMap,
    ) -> u64 {
        match schema.table_type {
            TableType::Kv | TableType::Kkv => {
                self.get_key_value_segment_size(segment_data, schema, size_infos)
            }
            TableType::Customized => {
                let size = segment_data.file_view().directory_size(CUSTOM_DIR_NAME);
                add_size(size_infos, CUSTOM_DIR_NAME.to_string(), size);
                size
            }
            TableType::Normal => {
                let mut total =
                    self.collect_directory_size_info(segment_data.file_view().as_ref(), schema, size_infos);
                if let (Some(sub_schema), Some(sub_data)) =
                    (schema.sub_schema(), segment_data.sub_segment_data.as_deref())
                {
                    total += self.collect_directory_size_info(
                        sub_data.file_view().as_ref(),
                        sub_schema,
                        size_infos,
                    );
                }
                total += self.collect_patch_segment_size_info(segment_data, schema, size_infos);
                total
            }
        }
    }

    /// Size of a kv or kkv segment. Unmerged segments written with several
    /// sharding columns keep each shard in a `column_<i>/` directory.
    pub fn get_key_value_segment_size(
        &self,
        segment_data: &SegmentData,
        schema: &Schema,
        size_infos: &mut SizeInfoMap,
    ) -> u64 {
        let view = segment_data.file_view();
        let column_count = segment_data.sharding_column_count();
        if column_count > 1 && !segment_data.is_merged_segment() {
            (0..column_count)
                .map(|column| {
                    let column_dir = format!("{SHARDING_COLUMN_DIR_PREFIX}{column}");
                    key_value_size(view.as_ref(), &column_dir, schema, size_infos)
                })
                .sum()
        } else {
            key_value_size(view.as_ref(), "", schema, size_infos)
        }
    }

    /// Size of every index of a normal table.
    pub fn get_segment_index_size(
        &self,
        view: &dyn SegmentFileView,
        schema: &Schema,
        size_infos: &mut SizeInfoMap,
    ) -> u64 {
        let mut total = 0;
        for index in schema.index_configs() {
            let size = index_size(view, index);
            debug!("index [{}] of type {:?}: {} bytes", index.name, index.index_type, size);
            add_size(size_infos, format!("inverted_index.{}", index.name), size);
            total += size;
        }
        total
    }

    /// Size of every attribute and pack attribute, with their patches.
    pub fn get_segment_attribute_size(
        &self,
        view: &dyn SegmentFileView,
        schema: &Schema,
        size_infos: &mut SizeInfoMap,
    ) -> u64 {
        let names = schema
            .single_attribute_configs()
            .map(|attribute| attribute.name.as_str())
            .chain(schema.pack_attribute_configs().map(|pack| pack.name.as_str()));

        let mut total = 0;
        for name in names {
            let attr_path = join_path(ATTRIBUTE_DIR_NAME, name);
            let size = self.calculate_single_attribute_size(view, &attr_path);
            let patch_size = self.calculate_single_attribute_patch_size(view, &attr_path);
            add_size(size_infos, format!("attribute.{name}"), size);
            add_size(size_infos, format!("attribute.{name}(patch)"), patch_size);
            total += size + patch_size;
        }
        total
    }

    /// Data plus offset file of one attribute directory.
    pub fn calculate_single_attribute_size(&self, view: &dyn SegmentFileView, attr_path: &str) -> u64 {
        get_file_length(view, attr_path, ATTRIBUTE_DATA_FILE_NAME)
            + get_file_length(view, attr_path, ATTRIBUTE_OFFSET_FILE_NAME)
    }

    /// Every patch file directly inside one attribute directory.
    pub fn calculate_single_attribute_patch_size(
        &self,
        view: &dyn SegmentFileView,
        attr_path: &str,
    ) -> u64 {
        view.list_file(attr_path, false)
            .iter()
            .filter(|name| name.ends_with(ATTRIBUTE_PATCH_FILE_SUFFIX))
            .map(|name| get_file_length(view, attr_path, name))
            .sum()
    }

    /// Offset and data files of the default summary group and of every
    /// other declared group.
    pub fn get_segment_summary_size(
        &self,
        view: &dyn SegmentFileView,
        schema: &Schema,
        size_infos: &mut SizeInfoMap,
    ) -> u64 {
        let Some(summary) = schema.summary_schema() else {
            return 0;
        };
        let mut total = 0;
        for group in summary.groups() {
            let group_path = if group.is_default {
                SUMMARY_DIR_NAME.to_string()
            } else {
                join_path(SUMMARY_DIR_NAME, &group.name)
            };
            total += get_file_length(view, &group_path, SUMMARY_OFFSET_FILE_NAME)
                + get_file_length(view, &group_path, SUMMARY_DATA_FILE_NAME);
        }
        add_size(size_infos, SUMMARY_DIR_NAME.to_string(), total);
        total
    }

    /// Size of the patch segments the partition keeps for this segment.
    ///
    /// A patch segment listed in the patch meta but missing on disk is
    /// logged and counts as zero.
    pub fn collect_patch_segment_size_info(
        &self,
        segment_data: &SegmentData,
        schema: &Schema,
        size_infos: &mut SizeInfoMap,
    ) -> u64 {
        let Some(accessor) = &segment_data.patch_index_accessor else {
            return 0;
        };
        let segment_id = segment_data.physical_segment_id;
        let mut total = 0;
        for schema_id in accessor.patch_schema_ids(segment_id) {
            let patch_path = accessor.patch_segment_path(schema_id, segment_id);
            let patch_directory = match get_directory(accessor.root(), &patch_path, false) {
                Ok(Some(directory)) => directory,
                Ok(None) => {
                    warn!(
                        "patch segment [{}/{}] listed in patch meta does not exist",
                        accessor.root().root(),
                        patch_path
                    );
                    continue;
                }
                Err(e) => {
                    warn!(
                        "failed to open patch segment [{}/{}]: {}",
                        accessor.root().root(),
                        patch_path,
                        e
                    );
                    continue;
                }
            };
            total += self.collect_patch_directory_size_info(patch_directory.as_ref(), schema, size_infos);
        }
        total
    }

    /// Size every virtual segment of `segment_directory` in parallel.
    pub fn collect_all(
        &self,
        segment_directory: &MultiPartSegmentDirectory,
        schema: &Schema,
    ) -> Result<Vec<(SegmentId, u64, SizeInfoMap)>> {
        segment_directory
            .version()
            .segments
            .par_iter()
            .map(|&segment_id| {
                let segment_data = segment_directory.segment_data(segment_id)?.ok_or_else(|| {
                    SegmentError::not_found(format!("virtual segment {segment_id}"))
                })?;
                let mut size_infos = SizeInfoMap::new();
                let total = self.collect_segment_size_info(&segment_data, schema, &mut size_infos);
                Ok((segment_id, total, size_infos))
            })
            .collect()
    }

    fn collect_directory_size_info(
        &self,
        view: &dyn SegmentFileView,
        schema: &Schema,
        size_infos: &mut SizeInfoMap,
    ) -> u64 {
        self.get_segment_index_size(view, schema, size_infos)
            + self.get_segment_attribute_size(view, schema, size_infos)
            + self.get_segment_summary_size(view, schema, size_infos)
    }

    fn collect_patch_directory_size_info(
        &self,
        directory: &dyn Directory,
        schema: &Schema,
        size_infos: &mut SizeInfoMap,
    ) -> u64 {
        let file_meta = match SegmentFileMeta::create(directory, false, &self.config) {
            Ok(file_meta) => file_meta,
            Err(e) => {
                warn!("ignoring segment metadata of patch segment [{}]: {}", directory.root(), e);
                None
            }
        };
        let view = file_view(directory, file_meta.as_ref());
        self.collect_directory_size_info(view.as_ref(), schema, size_infos)
    }
}

fn index_size(view: &dyn SegmentFileView, index: &IndexConfig) -> u64 {
    let index_path = join_path(INDEX_DIR_NAME, &index.name);
    match index.index_type {
        IndexType::Pack
        | IndexType::Expack
        | IndexType::Text
        | IndexType::String
        | IndexType::Spatial
        | IndexType::Date
        | IndexType::Number(_) => {
            let mut size = text_index_size(view, &index_path);
            if index.index_type.has_section_attribute() {
                let section_path = format!("{index_path}{SECTION_DIR_NAME_SUFFIX}");
                size += get_file_length(view, &section_path, ATTRIBUTE_DATA_FILE_NAME)
                    + get_file_length(view, &section_path, ATTRIBUTE_OFFSET_FILE_NAME);
            }
            size
        }
        IndexType::PrimaryKey64 | IndexType::PrimaryKey128 | IndexType::Trie => {
            let attribute_size = index.primary_key_field().map_or(0, |field| {
                let pk_attribute_path =
                    join_path(&index_path, &format!("{PK_ATTRIBUTE_DIR_NAME_PREFIX}{field}"));
                get_file_length(view, &pk_attribute_path, ATTRIBUTE_DATA_FILE_NAME)
            });
            get_file_length(view, &index_path, PRIMARY_KEY_DATA_FILE_NAME) + attribute_size
        }
        IndexType::Customized => view.directory_size(&index_path),
        IndexType::Range => {
            text_index_size(view, &join_path(&index_path, &index.range_bottom_level_name()))
                + text_index_size(view, &join_path(&index_path, &index.range_high_level_name()))
        }
        IndexType::Kv => kv_index_size(view, &index_path),
        IndexType::Kkv => kkv_index_size(view, &index_path),
    }
}

fn text_index_size(view: &dyn SegmentFileView, index_path: &str) -> u64 {
    [
        POSTING_FILE_NAME,
        DICTIONARY_FILE_NAME,
        BITMAP_DICTIONARY_FILE_NAME,
        BITMAP_POSTING_FILE_NAME,
    ]
    .iter()
    .map(|file_name| get_file_length(view, index_path, file_name))
    .sum()
}

fn kv_index_size(view: &dyn SegmentFileView, index_path: &str) -> u64 {
    get_file_length(view, index_path, KV_KEY_FILE_NAME)
        + get_file_length(view, index_path, KV_VALUE_FILE_NAME)
}

fn kkv_index_size(view: &dyn SegmentFileView, index_path: &str) -> u64 {
    get_file_length(view, index_path, KKV_PKEY_FILE_NAME)
        + get_file_length(view, index_path, KKV_SKEY_FILE_NAME)
        + get_file_length(view, index_path, KKV_VALUE_FILE_NAME)
}

/// Key-value indexes found below `base` (a segment or a shard column).
fn key_value_size(
    view: &dyn SegmentFileView,
    base: &str,
    schema: &Schema,
    size_infos: &mut SizeInfoMap,
) -> u64 {
    let mut total = 0;
    for index in schema.index_configs() {
        let index_path = join_path(base, &join_path(INDEX_DIR_NAME, &index.name));
        let (key, size) = match index.index_type {
            IndexType::Kv => (format!("kv.{}", index.name), kv_index_size(view, &index_path)),
            IndexType::Kkv => (format!("kkv.{}", index.name), kkv_index_size(view, &index_path)),
            _ => continue,
        };
        add_size(size_infos, key, size);
        total += size;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_view::LiveFileView;
    use crate::schema::{AttributeConfig, PackAttributeConfig, SummarySchema};
    use crate::storage::memory::MemoryDirectory;

    fn calculator() -> OnDiskSegmentSizeCalculator {
        OnDiskSegmentSizeCalculator::default()
    }

    #[test]
    fn test_index_size_by_type() {
        let directory = MemoryDirectory::new_default();
        directory.write_file("index/title/posting", vec![0u8; 10]);
        directory.write_file("index/title/dictionary", vec![0u8; 5]);
        directory.write_file("index/title_section/data", vec![0u8; 3]);
        directory.write_file("index/title_section/offset", vec![0u8; 2]);
        directory.write_file("index/pk/data", vec![0u8; 16]);
        directory.write_file("index/pk/attribute_id/data", vec![0u8; 8]);
        directory.write_file("index/price/price_@_bottom/posting", vec![0u8; 7]);
        directory.write_file("index/price/price_@_high/bitmap_posting", vec![0u8; 4]);
        directory.write_file("index/plugin/a/b", vec![0u8; 9]);
        let view = LiveFileView::new(&directory);

        let mut schema = Schema::new("mainse", TableType::Normal);
        schema.add_index(IndexConfig::new("title", IndexType::Pack)).unwrap();
        schema
            .add_index(IndexConfig::new("pk", IndexType::PrimaryKey64).with_fields(&["id"]))
            .unwrap();
        schema.add_index(IndexConfig::new("price", IndexType::Range)).unwrap();
        schema
            .add_index(IndexConfig::new("plugin", IndexType::Customized))
            .unwrap();
        schema.add_index(IndexConfig::new("missing", IndexType::Text)).unwrap();

        let mut size_infos = SizeInfoMap::new();
        let total = calculator().get_segment_index_size(&view, &schema, &mut size_infos);

        assert_eq!(size_infos["inverted_index.title"], 20);
        assert_eq!(size_infos["inverted_index.pk"], 24);
        assert_eq!(size_infos["inverted_index.price"], 11);
        assert_eq!(size_infos["inverted_index.plugin"], 9);
        assert_eq!(size_infos["inverted_index.missing"], 0);
        assert_eq!(total, 64);
    }

    #[test]
    fn test_section_attribute_only_for_pack_indexes() {
        let directory = MemoryDirectory::new_default();
        for name in ["body", "title"] {
            directory.write_file(&format!("index/{name}/posting"), vec![0u8; 10]);
            directory.write_file(&format!("index/{name}_section/data"), vec![0u8; 3]);
            directory.write_file(&format!("index/{name}_section/offset"), vec![0u8; 2]);
        }
        let view = LiveFileView::new(&directory);

        let mut schema = Schema::new("mainse", TableType::Normal);
        schema.add_index(IndexConfig::new("body", IndexType::Text)).unwrap();
        schema.add_index(IndexConfig::new("title", IndexType::Expack)).unwrap();

        let mut size_infos = SizeInfoMap::new();
        let total = calculator().get_segment_index_size(&view, &schema, &mut size_infos);
        assert_eq!(size_infos["inverted_index.body"], 10);
        assert_eq!(size_infos["inverted_index.title"], 15);
        assert_eq!(total, 25);
    }

    #[test]
    fn test_attribute_size() {
        let directory = MemoryDirectory::new_default();
        directory.write_file("attribute/price/data", vec![0u8; 40]);
        directory.write_file("attribute/price/offset", vec![0u8; 8]);
        directory.write_file("attribute/price/3_5.attr_patch", vec![0u8; 6]);
        directory.write_file("attribute/price/4_5.patch", vec![0u8; 2]);
        directory.write_file("attribute/pack_a/data", vec![0u8; 30]);
        directory.write_file("attribute/color/data", vec![0u8; 99]);
        let view = LiveFileView::new(&directory);

        let mut schema = Schema::new("mainse", TableType::Normal);
        schema.add_attribute(AttributeConfig::new("price")).unwrap();
        schema
            .add_attribute(AttributeConfig::new("color").in_pack("pack_a"))
            .unwrap();
        schema.add_pack_attribute(PackAttributeConfig::new("pack_a")).unwrap();

        let mut size_infos = SizeInfoMap::new();
        let total = calculator().get_segment_attribute_size(&view, &schema, &mut size_infos);

        assert_eq!(size_infos["attribute.price"], 48);
        assert_eq!(size_infos["attribute.price(patch)"], 8);
        assert_eq!(size_infos["attribute.pack_a"], 30);
        assert_eq!(size_infos["attribute.pack_a(patch)"], 0);
        assert!(!size_infos.contains_key("attribute.color"));
        assert_eq!(total, 86);
    }

    #[test]
    fn test_summary_size() {
        let directory = MemoryDirectory::new_default();
        directory.write_file("summary/data", vec![0u8; 50]);
        directory.write_file("summary/offset", vec![0u8; 10]);
        directory.write_file("summary/extra/data", vec![0u8; 5]);
        let view = LiveFileView::new(&directory);

        let mut schema = Schema::new("mainse", TableType::Normal);
        let mut size_infos = SizeInfoMap::new();
        assert_eq!(calculator().get_segment_summary_size(&view, &schema, &mut size_infos), 0);
        assert!(size_infos.is_empty());

        let mut summary = SummarySchema::default();
        summary.add_group("extra");
        schema.set_summary(summary);
        assert_eq!(calculator().get_segment_summary_size(&view, &schema, &mut size_infos), 65);
        assert_eq!(size_infos["summary"], 65);
    }

    #[test]
    fn test_add_size_accumulates() {
        let mut size_infos = SizeInfoMap::new();
        add_size(&mut size_infos, "kv.key".to_string(), 3);
        add_size(&mut size_infos, "kv.key".to_string(), 4);
        assert_eq!(size_infos["kv.key"], 7);
    }
}

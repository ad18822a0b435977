//! Index, attribute and summary configs.

use serde::{Deserialize, Serialize};

/// Width of a number index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
}

/// Every index kind a segment can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    Text,
    Pack,
    Expack,
    String,
    Spatial,
    Date,
    Number(NumberType),
    #[serde(rename = "primarykey64")]
    PrimaryKey64,
    #[serde(rename = "primarykey128")]
    PrimaryKey128,
    Trie,
    Customized,
    Range,
    /// Key-value index of a kv table.
    Kv,
    /// Prefix/suffix key index of a kkv table.
    Kkv,
}

impl IndexType {
    pub fn is_primary_key(&self) -> bool {
        matches!(
            self,
            IndexType::PrimaryKey64 | IndexType::PrimaryKey128 | IndexType::Trie
        )
    }

    /// Indexes that keep a section attribute next to their postings.
    pub fn has_section_attribute(&self) -> bool {
        matches!(self, IndexType::Pack | IndexType::Expack)
    }
}

/// Config of one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub index_type: IndexType,

    /// Indexed fields. Primary keys use the first one.
    #[serde(default)]
    pub fields: Vec<String>,

    /// Virtual indexes are maintained by the engine rather than declared.
    #[serde(default)]
    pub is_virtual: bool,
}

pub const RANGE_BOTTOM_LEVEL_SUFFIX: &str = "_@_bottom";
pub const RANGE_HIGH_LEVEL_SUFFIX: &str = "_@_high";

impl IndexConfig {
    pub fn new(name: impl Into<String>, index_type: IndexType) -> Self {
        IndexConfig {
            name: name.into(),
            index_type,
            fields: Vec::new(),
            is_virtual: false,
        }
    }

    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|field| field.to_string()).collect();
        self
    }

    pub fn primary_key_field(&self) -> Option<&str> {
        self.fields.first().map(String::as_str)
    }

    /// Name of the bottom-level sub-index of a range index.
    pub fn range_bottom_level_name(&self) -> String {
        format!("{}{}", self.name, RANGE_BOTTOM_LEVEL_SUFFIX)
    }

    /// Name of the high-level sub-index of a range index.
    pub fn range_high_level_name(&self) -> String {
        format!("{}{}", self.name, RANGE_HIGH_LEVEL_SUFFIX)
    }
}

/// Config of one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub name: String,

    /// Pack attribute this attribute is stored in, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_name: Option<String>,
}

impl AttributeConfig {
    pub fn new(name: impl Into<String>) -> Self {
        AttributeConfig {
            name: name.into(),
            pack_name: None,
        }
    }

    pub fn in_pack(mut self, pack_name: impl Into<String>) -> Self {
        self.pack_name = Some(pack_name.into());
        self
    }
}

/// A group of attributes stored in one data file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackAttributeConfig {
    pub name: String,
}

impl PackAttributeConfig {
    pub fn new(name: impl Into<String>) -> Self {
        PackAttributeConfig { name: name.into() }
    }
}

pub const DEFAULT_SUMMARY_GROUP_NAME: &str = "__default__";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryGroupConfig {
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Summary groups of a table. The default group lives directly in
/// `summary/`, every other group in `summary/<group>/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarySchema {
    pub groups: Vec<SummaryGroupConfig>,
}

impl Default for SummarySchema {
    fn default() -> Self {
        SummarySchema {
            groups: vec![SummaryGroupConfig {
                name: DEFAULT_SUMMARY_GROUP_NAME.to_string(),
                is_default: true,
            }],
        }
    }
}

impl SummarySchema {
    pub fn add_group(&mut self, name: impl Into<String>) {
        self.groups.push(SummaryGroupConfig {
            name: name.into(),
            is_default: false,
        });
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn groups(&self) -> impl Iterator<Item = &SummaryGroupConfig> {
        self.groups.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_type_json() {
        let config: IndexConfig =
            serde_json::from_str(r#"{"name": "pk", "type": "primarykey64", "fields": ["id"]}"#)
                .unwrap();
        assert_eq!(config.index_type, IndexType::PrimaryKey64);
        assert!(config.index_type.is_primary_key());
        assert_eq!(config.primary_key_field(), Some("id"));

        let config: IndexConfig =
            serde_json::from_str(r#"{"name": "age", "type": {"number": "uint16"}}"#).unwrap();
        assert_eq!(config.index_type, IndexType::Number(NumberType::UInt16));
        assert!(config.primary_key_field().is_none());
    }

    #[test]
    fn test_range_names() {
        let config = IndexConfig::new("price", IndexType::Range);
        assert_eq!(config.range_bottom_level_name(), "price_@_bottom");
        assert_eq!(config.range_high_level_name(), "price_@_high");
    }

    #[test]
    fn test_summary_schema() {
        let mut summary = SummarySchema::default();
        summary.add_group("mainse");

        assert_eq!(summary.group_count(), 2);
        let defaults: Vec<bool> = summary.groups().map(|g| g.is_default).collect();
        assert_eq!(defaults, vec![true, false]);
    }
}

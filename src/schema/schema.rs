//! Table schema.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SegmentError};
use crate::schema::config::{
    AttributeConfig, IndexConfig, IndexType, PackAttributeConfig, SummarySchema,
};

pub type SchemaId = u32;

/// Layout family of a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    /// Inverted indexes, attributes and summaries.
    #[default]
    Normal,
    /// Key-value table.
    Kv,
    /// Prefix-key/suffix-key table.
    Kkv,
    /// Opaque table maintained by a plugin under `custom/`.
    Customized,
}

/// Schema of a table, optionally with a sub-document schema.
///
/// Only the parts that determine the on-disk layout of a segment are kept:
/// the index, attribute and summary definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub schema_name: String,

    /// Id of the schema. Patch indexes are stored per schema id.
    #[serde(default)]
    pub schema_id: SchemaId,

    #[serde(default)]
    pub table_type: TableType,

    #[serde(default)]
    pub indexes: Vec<IndexConfig>,

    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,

    #[serde(default)]
    pub pack_attributes: Vec<PackAttributeConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummarySchema>,

    /// Schema of the sub documents, stored in `sub_segment/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_schema: Option<Box<Schema>>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new(schema_name: impl Into<String>, table_type: TableType) -> Self {
        Schema {
            schema_name: schema_name.into(),
            table_type,
            ..Default::default()
        }
    }

    /// Add an index. Index names must be unique.
    pub fn add_index(&mut self, config: IndexConfig) -> Result<()> {
        if self.index_config(&config.name).is_some() {
            return Err(SegmentError::schema(format!(
                "Index '{}' already exists",
                config.name
            )));
        }
        self.indexes.push(config);
        Ok(())
    }

    /// Add an attribute. Attribute names must be unique.
    pub fn add_attribute(&mut self, config: AttributeConfig) -> Result<()> {
        if self.attributes.iter().any(|a| a.name == config.name) {
            return Err(SegmentError::schema(format!(
                "Attribute '{}' already exists",
                config.name
            )));
        }
        self.attributes.push(config);
        Ok(())
    }

    pub fn add_pack_attribute(&mut self, config: PackAttributeConfig) -> Result<()> {
        if self.pack_attributes.iter().any(|p| p.name == config.name) {
            return Err(SegmentError::schema(format!(
                "Pack attribute '{}' already exists",
                config.name
            )));
        }
        self.pack_attributes.push(config);
        Ok(())
    }

    pub fn set_summary(&mut self, summary: SummarySchema) {
        self.summary = Some(summary);
    }

    pub fn set_sub_schema(&mut self, sub_schema: Schema) {
        self.sub_schema = Some(Box::new(sub_schema));
    }

    pub fn index_config(&self, name: &str) -> Option<&IndexConfig> {
        self.indexes.iter().find(|index| index.name == name)
    }

    pub fn index_configs(&self) -> impl Iterator<Item = &IndexConfig> {
        self.indexes.iter()
    }

    /// Attributes that are stored on their own, outside any pack.
    pub fn single_attribute_configs(&self) -> impl Iterator<Item = &AttributeConfig> {
        self.attributes.iter().filter(|a| a.pack_name.is_none())
    }

    pub fn pack_attribute_configs(&self) -> impl Iterator<Item = &PackAttributeConfig> {
        self.pack_attributes.iter()
    }

    pub fn summary_schema(&self) -> Option<&SummarySchema> {
        self.summary.as_ref()
    }

    pub fn sub_schema(&self) -> Option<&Schema> {
        self.sub_schema.as_deref()
    }

    /// Check the schema for dangling references and layout mismatches.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for index in &self.indexes {
            if !names.insert(index.name.as_str()) {
                return Err(SegmentError::schema(format!(
                    "Index '{}' is defined twice",
                    index.name
                )));
            }
            if index.index_type.is_primary_key() && index.primary_key_field().is_none() {
                return Err(SegmentError::schema(format!(
                    "Primary key index '{}' has no field",
                    index.name
                )));
            }
            let key_value_index = matches!(index.index_type, IndexType::Kv | IndexType::Kkv);
            let key_value_table = matches!(self.table_type, TableType::Kv | TableType::Kkv);
            if key_value_index != key_value_table {
                return Err(SegmentError::schema(format!(
                    "Index '{}' of type {:?} does not fit a {:?} table",
                    index.name, index.index_type, self.table_type
                )));
            }
        }

        for attribute in &self.attributes {
            if let Some(pack_name) = &attribute.pack_name {
                if !self.pack_attributes.iter().any(|p| &p.name == pack_name) {
                    return Err(SegmentError::schema(format!(
                        "Attribute '{}' refers to unknown pack attribute '{}'",
                        attribute.name, pack_name
                    )));
                }
            }
        }

        if let Some(sub_schema) = &self.sub_schema {
            if sub_schema.sub_schema.is_some() {
                return Err(SegmentError::schema(
                    "Sub schema cannot have a sub schema of its own",
                ));
            }
            sub_schema.validate()?;
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let schema: Schema = serde_json::from_str(json)
            .map_err(|e| SegmentError::schema(format!("Invalid schema: {e}")))?;
        schema.validate()?;
        Ok(schema)
    }

    /// Load and validate a schema from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

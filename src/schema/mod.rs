//! Schema module for segmeta.
//!
//! The schema tells the size calculator which indexes, attributes and
//! summary groups a segment is expected to contain, and how the table is
//! laid out on disk.

pub mod config;
#[allow(clippy::module_inception)]
pub mod schema;

// Re-export commonly used types
pub use config::*;
pub use schema::*;

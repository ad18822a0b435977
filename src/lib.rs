//! # segmeta
//!
//! The segment file-meta layer of an on-disk search index.
//!
//! A segment is an immutable directory of index files. Its files may be
//! stored loose or concatenated into a package file, and a segment may nest
//! a joined child table under `sub_segment/`. This crate gives one logical
//! view over all of these layouts:
//!
//! - [`segment_file_meta::SegmentFileMeta`] caches a segment's manifest and
//!   package table of contents for existence checks, lengths and listings
//! - [`segment_directory::MultiPartSegmentDirectory`] numbers the segments
//!   of several partitions with one dense virtual id space
//! - [`size_calculator::OnDiskSegmentSizeCalculator`] breaks a segment's
//!   on-disk size down per index, attribute and summary group
//! - [`patch::PatchFileFinder`] locates attribute patches and deletion maps

pub mod cli;
pub mod config;
pub mod error;
pub mod file_view;
pub mod index_file_list;
pub mod package_file;
pub mod patch;
pub mod schema;
pub mod segment_directory;
pub mod segment_file_meta;
pub mod size_calculator;
pub mod storage;
pub mod version;

pub mod prelude {
    pub use crate::config::LoadConfig;
    pub use crate::error::{Result, SegmentError};
    pub use crate::file_view::SegmentFileView;
    pub use crate::schema::Schema;
    pub use crate::segment_directory::MultiPartSegmentDirectory;
    pub use crate::segment_file_meta::SegmentFileMeta;
    pub use crate::size_calculator::{OnDiskSegmentSizeCalculator, SizeInfoMap};
    pub use crate::storage::Directory;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

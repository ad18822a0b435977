//! Command implementations for the segmeta CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};

use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::LoadConfig;
use crate::error::{Result, SegmentError};
use crate::file_view::{LiveFileView, SegmentFileView};
use crate::schema::Schema;
use crate::segment_directory::MultiPartSegmentDirectory;
use crate::segment_file_meta::{SUB_SEGMENT_DIR_NAME, SegmentFileMeta};
use crate::size_calculator::{OnDiskSegmentSizeCalculator, SizeInfoMap};
use crate::storage::{
    Directory, DirectoryConfig, DirectoryFactory, FileDirectoryConfig, get_directory, join_path,
};
use crate::version::SegmentId;

/// Execute a CLI command.
pub fn execute_command(args: SegmetaArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    match &args.command {
        Command::Ls(ls_args) => list_segment(ls_args, &config, &args),
        Command::Segments(segments_args) => show_segments(segments_args, &config, &args),
        Command::Size(size_args) => show_size(size_args, &config, &args),
    }
}

fn load_config(path: Option<&Path>) -> Result<LoadConfig> {
    match path {
        Some(path) => {
            debug!("loading config from {}", path.display());
            LoadConfig::from_file(path)
        }
        None => Ok(LoadConfig::default()),
    }
}

fn open_directory(path: &Path) -> Result<Arc<dyn Directory>> {
    DirectoryFactory::create(DirectoryConfig::File(FileDirectoryConfig::new(path)))
}

fn open_partitions(paths: &[PathBuf]) -> Result<Vec<Arc<dyn Directory>>> {
    paths.iter().map(|path| open_directory(path)).collect()
}

/// List the logical files of one segment.
fn list_segment(args: &LsArgs, config: &LoadConfig, cli_args: &SegmetaArgs) -> Result<()> {
    let segment = open_directory(&args.segment_dir)?;

    let file_meta = if args.live {
        None
    } else {
        let file_meta = SegmentFileMeta::create(segment.as_ref(), args.sub, config)?;
        if file_meta.is_none() {
            warn!(
                "no segment file list in {}, listing the file system",
                args.segment_dir.display()
            );
        }
        file_meta
    };

    let result = match &file_meta {
        Some(meta) => FileListResult {
            root: meta.root().to_string(),
            source: "meta".to_string(),
            has_package_file: meta.has_package_file(),
            entries: meta
                .list_file_with_length(&args.path, args.recursive)
                .into_iter()
                .map(|(path, length)| FileListEntry { path, length })
                .collect(),
        },
        None => {
            let directory = if args.sub {
                get_directory(&segment, SUB_SEGMENT_DIR_NAME, true)?.ok_or_else(|| {
                    SegmentError::not_found(format!(
                        "{} has no sub segment",
                        args.segment_dir.display()
                    ))
                })?
            } else {
                segment
            };
            let view = LiveFileView::new(directory.as_ref());
            FileListResult {
                root: directory.root(),
                source: "live".to_string(),
                has_package_file: false,
                entries: view
                    .list_file(&args.path, args.recursive)
                    .into_iter()
                    .map(|path| {
                        let length = view.file_length(&join_path(&args.path, &path)).unwrap_or(0);
                        FileListEntry { path, length }
                    })
                    .collect(),
            }
        }
    };

    output_result("Segment files", &result, cli_args)
}

/// Show how partitions map onto the virtual segment id space.
fn show_segments(args: &SegmentsArgs, config: &LoadConfig, cli_args: &SegmetaArgs) -> Result<()> {
    let roots = open_partitions(&args.partitions)?;
    let multi_part = MultiPartSegmentDirectory::init(roots, None, false, config.clone())?;

    let mut partitions = Vec::with_capacity(multi_part.partition_count());
    for (partition_idx, path) in args.partitions.iter().enumerate() {
        let Some(partition) = multi_part.partition(partition_idx) else {
            continue;
        };
        let segments = partition
            .version()
            .segments
            .iter()
            .map(|&physical_id| SegmentMapping {
                virtual_id: multi_part.encode_to_virtual_segment_id(partition_idx, physical_id),
                physical_id,
                dir_name: partition.segment_path(physical_id),
            })
            .collect();
        partitions.push(PartitionInfo {
            path: path.display().to_string(),
            version_id: partition.version().version_id,
            segments,
        });
    }

    let result = SegmentMapResult {
        partitions,
        segment_count: multi_part.version().segment_count(),
    };
    output_result("Virtual segments", &result, cli_args)
}

/// Break down the on-disk size of one or all virtual segments.
fn show_size(args: &SizeArgs, config: &LoadConfig, cli_args: &SegmetaArgs) -> Result<()> {
    let schema = Schema::from_file(&args.schema)?;
    let roots = open_partitions(&args.partitions)?;
    let has_sub = schema.sub_schema().is_some();
    let multi_part = MultiPartSegmentDirectory::init(roots, None, has_sub, config.clone())?;
    let calculator = OnDiskSegmentSizeCalculator::new(config.clone());

    let sizes: Vec<(SegmentId, u64, SizeInfoMap)> = match args.segment {
        Some(segment_id) => {
            let segment_data = multi_part.segment_data(segment_id)?.ok_or_else(|| {
                SegmentError::invalid_argument(format!(
                    "virtual segment {} out of range (0..{})",
                    segment_id,
                    multi_part.version().segment_count()
                ))
            })?;
            let mut size_infos = SizeInfoMap::new();
            let total = calculator.collect_segment_size_info(&segment_data, &schema, &mut size_infos);
            vec![(segment_id, total, size_infos)]
        }
        None => calculator.collect_all(&multi_part, &schema)?,
    };

    let segments: Vec<SegmentSize> = sizes
        .into_iter()
        .map(|(segment_id, total_bytes, items)| SegmentSize {
            segment_id,
            total_bytes,
            items,
        })
        .collect();
    let result = SizeReport {
        total_bytes: segments.iter().map(|s| s.total_bytes).sum(),
        segments,
    };
    output_result("Segment sizes", &result, cli_args)
}

//! Command line argument parsing for the segmeta CLI using clap.

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::version::SegmentId;

/// segmeta - inspect the file layout and on-disk size of index segments
#[derive(Parser, Debug, Clone)]
#[command(name = "segmeta")]
#[command(about = "Inspect the file layout and on-disk size of index segments")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct SegmetaArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Load config file (JSON)
    #[arg(long, value_name = "LOAD_CONFIG", env = "SEGMETA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl SegmetaArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1, // Default to normal
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List the logical files of a segment
    Ls(LsArgs),

    /// Show how segments of several partitions map to virtual ids
    Segments(SegmentsArgs),

    /// Break down the on-disk size of segments per schema item
    Size(SizeArgs),
}

/// Arguments for listing a segment
#[derive(Parser, Debug, Clone)]
pub struct LsArgs {
    /// Path to the segment directory
    #[arg(value_name = "SEGMENT_DIR")]
    pub segment_dir: PathBuf,

    /// Directory inside the segment to list
    #[arg(value_name = "PATH", default_value = "")]
    pub path: String,

    /// List recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// List the sub segment instead of the main one
    #[arg(long)]
    pub sub: bool,

    /// Ignore the manifest and ask the file system
    #[arg(long)]
    pub live: bool,
}

/// Arguments for showing the virtual segment map
#[derive(Parser, Debug, Clone)]
pub struct SegmentsArgs {
    /// Partition directories, oldest first
    #[arg(value_name = "PARTITION_DIR", required = true)]
    pub partitions: Vec<PathBuf>,
}

/// Arguments for size accounting
#[derive(Parser, Debug, Clone)]
pub struct SizeArgs {
    /// Partition directories, oldest first
    #[arg(value_name = "PARTITION_DIR", required = true)]
    pub partitions: Vec<PathBuf>,

    /// Schema definition file path (JSON)
    #[arg(short, long, value_name = "SCHEMA_FILE")]
    pub schema: PathBuf,

    /// Only size this virtual segment
    #[arg(long, value_name = "VIRTUAL_ID")]
    pub segment: Option<SegmentId>,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ls_command() {
        let args = SegmetaArgs::try_parse_from([
            "segmeta",
            "ls",
            "/data/segment_0_level_0",
            "attribute",
            "--recursive",
            "--sub",
        ])
        .unwrap();

        if let Command::Ls(ls_args) = args.command {
            assert_eq!(ls_args.segment_dir, PathBuf::from("/data/segment_0_level_0"));
            assert_eq!(ls_args.path, "attribute");
            assert!(ls_args.recursive);
            assert!(ls_args.sub);
            assert!(!ls_args.live);
        } else {
            panic!("Expected Ls command");
        }
    }

    #[test]
    fn test_size_command() {
        let args = SegmetaArgs::try_parse_from([
            "segmeta",
            "size",
            "/data/p0",
            "/data/p1",
            "--schema",
            "schema.json",
            "--segment",
            "3",
        ])
        .unwrap();

        if let Command::Size(size_args) = args.command {
            assert_eq!(size_args.partitions.len(), 2);
            assert_eq!(size_args.schema, PathBuf::from("schema.json"));
            assert_eq!(size_args.segment, Some(3));
        } else {
            panic!("Expected Size command");
        }
    }

    #[test]
    fn test_segments_requires_partition() {
        assert!(SegmetaArgs::try_parse_from(["segmeta", "segments"]).is_err());
    }

    #[test]
    fn test_verbosity_levels() {
        let args = SegmetaArgs::try_parse_from(["segmeta", "segments", "p0"]).unwrap();
        assert_eq!(args.verbosity(), 1);

        let args = SegmetaArgs::try_parse_from(["segmeta", "-vv", "segments", "p0"]).unwrap();
        assert_eq!(args.verbosity(), 2);

        let args = SegmetaArgs::try_parse_from(["segmeta", "--quiet", "segments", "p0"]).unwrap();
        assert_eq!(args.verbosity(), 0);
    }

    #[test]
    fn test_output_format() {
        let args =
            SegmetaArgs::try_parse_from(["segmeta", "--format", "json", "segments", "p0"]).unwrap();
        assert_eq!(args.output_format, OutputFormat::Json);
    }
}

//! Output formatting for CLI commands.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cli::args::{OutputFormat, SegmetaArgs};
use crate::error::Result;
use crate::version::SegmentId;

/// Result types that know how to print themselves for humans.
pub trait HumanOutput {
    fn print_human(&self);
}

/// One listed file.
#[derive(Debug, Serialize, Deserialize)]
pub struct FileListEntry {
    pub path: String,
    pub length: u64,
}

/// Result structure for `ls`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FileListResult {
    pub root: String,
    /// `meta` when answered from the manifest, `live` otherwise.
    pub source: String,
    pub has_package_file: bool,
    pub entries: Vec<FileListEntry>,
}

/// One segment of a partition.
#[derive(Debug, Serialize, Deserialize)]
pub struct SegmentMapping {
    pub virtual_id: SegmentId,
    pub physical_id: SegmentId,
    pub dir_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub path: String,
    pub version_id: i32,
    pub segments: Vec<SegmentMapping>,
}

/// Result structure for `segments`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SegmentMapResult {
    pub partitions: Vec<PartitionInfo>,
    pub segment_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SegmentSize {
    pub segment_id: SegmentId,
    pub total_bytes: u64,
    pub items: BTreeMap<String, u64>,
}

/// Result structure for `size`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SizeReport {
    pub segments: Vec<SegmentSize>,
    pub total_bytes: u64,
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize + HumanOutput>(
    message: &str,
    result: &T,
    args: &SegmetaArgs,
) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => {
            if args.verbosity() > 1 {
                println!("{message}");
                println!();
            }
            result.print_human();
            Ok(())
        }
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &SegmetaArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };

    println!("{json}");
    Ok(())
}

impl HumanOutput for FileListResult {
    fn print_human(&self) {
        println!("{} ({})", self.root, self.source);
        if self.has_package_file {
            println!("package file: yes");
        }
        let width = self
            .entries
            .iter()
            .map(|entry| entry.path.len())
            .max()
            .unwrap_or(0);
        for entry in &self.entries {
            if entry.path.ends_with('/') {
                println!("  {}", entry.path);
            } else {
                println!(
                    "  {:<width$}  {:>10}",
                    entry.path,
                    format_bytes(entry.length),
                    width = width
                );
            }
        }
    }
}

impl HumanOutput for SegmentMapResult {
    fn print_human(&self) {
        for (idx, partition) in self.partitions.iter().enumerate() {
            println!(
                "Partition {}: {} (version {})",
                idx, partition.path, partition.version_id
            );
            for segment in &partition.segments {
                println!(
                    "  {:>5} -> {:<5} {}",
                    segment.virtual_id, segment.physical_id, segment.dir_name
                );
            }
        }
        println!("Total segments: {}", self.segment_count);
    }
}

impl HumanOutput for SizeReport {
    fn print_human(&self) {
        for segment in &self.segments {
            println!(
                "Segment {}: {}",
                segment.segment_id,
                format_bytes(segment.total_bytes)
            );
            for (item, size) in &segment.items {
                println!("  {:<40} {:>10}", item, format_bytes(*size));
            }
        }
        println!("Total: {}", format_bytes(self.total_bytes));
    }
}

/// Format bytes into human-readable format.
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    let unit = UNITS[unit_index];
    if unit_index == 0 {
        format!("{bytes} {unit}")
    } else {
        format!("{size:.1} {unit}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1048576), "1.0 MB");
    }

    #[test]
    fn test_size_report_json() {
        let report = SizeReport {
            segments: vec![SegmentSize {
                segment_id: 0,
                total_bytes: 48,
                items: BTreeMap::from([("attribute.price".to_string(), 48)]),
            }],
            total_bytes: 48,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["segments"][0]["items"]["attribute.price"], 48);
        assert_eq!(value["total_bytes"], 48);
    }
}

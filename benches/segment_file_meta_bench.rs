//! Criterion benchmarks for segment metadata.
//!
//! Covers loading a large manifest into [`SegmentFileMeta`], the lookups
//! served from it, and a full size accounting pass over several segments.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use segmeta::config::LoadConfig;
use segmeta::index_file_list::{IndexFileList, SEGMENT_FILE_LIST};
use segmeta::schema::{AttributeConfig, IndexConfig, IndexType, Schema, TableType};
use segmeta::segment_directory::MultiPartSegmentDirectory;
use segmeta::segment_file_meta::SegmentFileMeta;
use segmeta::size_calculator::OnDiskSegmentSizeCalculator;
use segmeta::storage::{Directory, MemoryDirectory};
use segmeta::version::Version;

/// Build a manifest with `attribute_count` attributes and as many indexes.
fn generate_manifest(attribute_count: usize) -> IndexFileList {
    let mut file_list = IndexFileList::new();
    file_list.append("attribute/", -1);
    file_list.append("index/", -1);
    for i in 0..attribute_count {
        file_list.append(format!("attribute/attr_{i}/"), -1);
        file_list.append(format!("attribute/attr_{i}/data"), (i * 8) as i64);
        file_list.append(format!("attribute/attr_{i}/offset"), (i * 2) as i64);
        file_list.append(format!("index/idx_{i}/posting"), (i * 16) as i64);
        file_list.append(format!("index/idx_{i}/dictionary"), (i * 4) as i64);
    }
    file_list
}

fn segment_with_manifest(attribute_count: usize) -> MemoryDirectory {
    let directory = MemoryDirectory::new_default();
    let file_list = generate_manifest(attribute_count);
    directory.write_file(SEGMENT_FILE_LIST, file_list.to_bytes().unwrap());
    directory
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_file_meta_load");
    group.sample_size(20);

    for count in [100, 1000, 10000].iter() {
        let directory = segment_with_manifest(*count);
        group.throughput(Throughput::Elements(*count as u64 * 4));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| {
                let meta = SegmentFileMeta::create(&directory, false, &LoadConfig::default())
                    .unwrap();
                black_box(meta)
            })
        });
    }

    group.finish();
}

fn bench_lookups(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_file_meta_lookup");
    let directory = segment_with_manifest(10000);
    let meta = SegmentFileMeta::create(&directory, false, &LoadConfig::default())
        .unwrap()
        .unwrap();

    group.bench_function("get_file_length", |b| {
        b.iter(|| black_box(meta.get_file_length(black_box("attribute/attr_5000/data"), true)))
    });

    group.bench_function("is_exist_missing", |b| {
        b.iter(|| black_box(meta.is_exist(black_box("attribute/attr_99999/data"))))
    });

    group.bench_function("list_file_shallow", |b| {
        b.iter(|| black_box(meta.list_file(black_box("attribute"), false)))
    });

    group.bench_function("list_file_recursive", |b| {
        b.iter(|| black_box(meta.list_file(black_box("index"), true)))
    });

    group.bench_function("calculate_directory_size", |b| {
        b.iter(|| black_box(meta.calculate_directory_size(black_box("attribute"))))
    });

    group.finish();
}

fn bench_size_calculation(c: &mut Criterion) {
    let mut group = c.benchmark_group("size_calculation");
    group.sample_size(10);

    let root = Arc::new(MemoryDirectory::new_default());
    let segment_count = 16;
    let file_list = generate_manifest(200).to_bytes().unwrap();
    for segment_id in 0..segment_count {
        root.write_file(
            &format!("segment_{segment_id}_level_0/{SEGMENT_FILE_LIST}"),
            file_list.clone(),
        );
    }
    let segments: Vec<i32> = (0..segment_count).collect();
    let multi_part = MultiPartSegmentDirectory::init(
        vec![root as Arc<dyn Directory>],
        Some(vec![Version::with_segments(0, &segments)]),
        false,
        LoadConfig::default(),
    )
    .unwrap();

    let mut schema = Schema::new("bench", TableType::Normal);
    for i in 0..200 {
        schema
            .add_index(IndexConfig::new(format!("idx_{i}"), IndexType::Text))
            .unwrap();
        schema
            .add_attribute(AttributeConfig::new(format!("attr_{i}")))
            .unwrap();
    }
    let calculator = OnDiskSegmentSizeCalculator::default();

    group.throughput(Throughput::Elements(segment_count as u64));
    group.bench_function("collect_all", |b| {
        b.iter(|| black_box(calculator.collect_all(&multi_part, &schema).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, bench_load, bench_lookups, bench_size_calculation);
criterion_main!(benches);

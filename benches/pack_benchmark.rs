// benches/pack_benchmark.rs
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use zlite::codec::{Codec, Lzma2Codec};
use zlite::compress::{self, CompressOptions};
use zlite::extract::{self, Layout};

const PAYLOAD_SIZE: usize = 1 << 20;

/// Half random bytes, half repeated text, so every level has something to work on.
fn mixed_payload(seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; PAYLOAD_SIZE / 2];
    rng.fill(&mut data[..]);
    let text = b"the quick brown fox jumps over the lazy dog. ";
    while data.len() < PAYLOAD_SIZE {
        data.extend_from_slice(text);
    }
    data.truncate(PAYLOAD_SIZE);
    data
}

fn make_tree(root: &Path, files: usize) {
    fs::create_dir_all(root.join("nested")).unwrap();
    for i in 0..files {
        let dir = if i % 2 == 0 { root.to_path_buf() } else { root.join("nested") };
        fs::write(dir.join(format!("file_{i}.bin")), mixed_payload(i as u64)).unwrap();
    }
}

fn bench_codec_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/compress");
    group.throughput(Throughput::Bytes(PAYLOAD_SIZE as u64));
    group.sample_size(10);

    let codec = Lzma2Codec::default();
    let data = mixed_payload(0xdead_beef);
    for level in [0u32, 3, 5, 9] {
        group.bench_with_input(BenchmarkId::from_parameter(level), &level, |b, &level| {
            b.iter(|| black_box(codec.compress(black_box(&data), level).unwrap()))
        });
    }
    group.finish();
}

fn bench_add_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("archive");
    group.sample_size(10);
    group.throughput(Throughput::Bytes((PAYLOAD_SIZE * 8) as u64));

    let work = tempdir().unwrap();
    let src = work.path().join("src");
    make_tree(&src, 8);
    let archive = work.path().join("bench.7z");
    let options = CompressOptions { level: 1, ..CompressOptions::default() };

    group.bench_function("add", |b| {
        b.iter(|| compress::run(&[src.clone()], &archive, &options).unwrap())
    });

    compress::run(&[src.clone()], &archive, &options).unwrap();
    let out = work.path().join("out");
    group.bench_function("extract", |b| {
        b.iter(|| {
            let report = extract::extract(&archive, &out, Layout::FullPaths).unwrap();
            assert!(report.is_clean());
        })
    });
    group.bench_function("test", |b| {
        b.iter(|| black_box(extract::test(&archive).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_codec_levels, bench_add_extract);
criterion_main!(benches);

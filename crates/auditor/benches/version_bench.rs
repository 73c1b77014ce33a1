//! 버전 매칭 벤치마크
//!
//! 버전 비교, 제약 파싱/매칭, 후보 중 최선 버전 선택 성능을 측정합니다.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use depwatch_auditor::manifest::{ManifestReader, NpmManifestReader};
use depwatch_auditor::types::Ecosystem;
use depwatch_auditor::version::{self, Constraint, Version};

const NPM_CONSTRAINTS: &[&str] = &[
    "4.17.21",
    "^4.17.0",
    "~4.17.0",
    ">=1.2.3 <2.0.0",
    "1.x || >=2.5.0 <3",
    "1.2.3 - 2.3.4",
    "*",
];

const MAVEN_CONSTRAINTS: &[&str] = &["1.9", "[1.0,2.0)", "(,1.5]", "[1.2]", "[1.0,1.2),[1.5,)"];

/// major.minor.patch 후보 목록
fn candidates(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("{}.{}.{}", i / 100, (i / 10) % 10, i % 10))
        .collect()
}

fn bench_compare(c: &mut Criterion) {
    let pairs = [
        ("1.2.3", "1.2.4"),
        ("4.17.21", "4.18.0-beta.1"),
        ("1.0.0-SNAPSHOT", "1.0.0"),
        ("2.0.0.Final", "2.0.0.RC1"),
    ];
    let parsed: Vec<(Version, Version)> = pairs
        .iter()
        .map(|(a, b)| (Version::parse(a), Version::parse(b)))
        .collect();

    c.bench_function("compare_mixed_versions", |b| {
        b.iter(|| {
            for (a, v) in &parsed {
                black_box(version::compare(black_box(a), black_box(v)));
            }
        });
    });
}

fn bench_constraint_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("constraint_parse");
    group.bench_function("npm", |b| {
        b.iter(|| {
            for raw in NPM_CONSTRAINTS {
                let _ = black_box(Constraint::parse(Ecosystem::Npm, black_box(raw)));
            }
        });
    });
    group.bench_function("maven", |b| {
        b.iter(|| {
            for raw in MAVEN_CONSTRAINTS {
                let _ = black_box(Constraint::parse(Ecosystem::Maven, black_box(raw)));
            }
        });
    });
    group.finish();
}

fn bench_best_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("best_match");
    for count in [10usize, 100, 1000] {
        let list = candidates(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("caret", count), &list, |b, list| {
            b.iter(|| {
                black_box(version::best_match(
                    Ecosystem::Npm,
                    "^1.2.0",
                    black_box(list),
                    |s| s.as_str(),
                ))
            });
        });
    }
    group.finish();
}

fn bench_npm_reader(c: &mut Criterion) {
    let mut manifest = String::from("{\n  \"dependencies\": {\n");
    for i in 0..200 {
        let sep = if i == 199 { "" } else { "," };
        manifest.push_str(&format!("    \"pkg-{i}\": \"^{}.0.0\"{sep}\n", i % 7 + 1));
    }
    manifest.push_str("  }\n}\n");
    let reader = NpmManifestReader::default();
    let path = std::path::Path::new("package.json");

    c.bench_function("npm_reader_200_deps", |b| {
        b.iter(|| black_box(reader.run(path, black_box(&manifest))));
    });
}

criterion_group!(
    benches,
    bench_compare,
    bench_constraint_parse,
    bench_best_match,
    bench_npm_reader
);
criterion_main!(benches);

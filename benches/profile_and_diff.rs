use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use csv_quality::{
    cardinality, compare, completeness,
    distribution::{self, DistributionOptions},
    ingest::{IngestOptions, Table, read_table},
};
use tempfile::TempDir;

fn generate_visits(rows: usize, name: &str, shift: usize) -> (TempDir, PathBuf) {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let csv_path = temp_dir.path().join(name);
    let mut file = File::create(&csv_path).expect("create csv");
    writeln!(file, "id,clinic,visited_on,fee,attendance,note").expect("header");
    for i in 0..rows {
        let clinic = match i % 4 {
            0 => "north",
            1 => "south",
            2 => "east",
            _ => "west",
        };
        let day = (i % 28) + 1;
        let fee = 100 + ((i + shift) % 250);
        let note = if i % 17 == 0 { "NA" } else { "seen" };
        writeln!(
            file,
            "{i},{clinic},2024-02-{day:02},£{fee},{}%,{note}",
            50 + (i % 50)
        )
        .expect("row");
    }
    (temp_dir, csv_path)
}

fn load(path: &Path) -> Table {
    read_table(path, &IngestOptions::default())
        .expect("read table")
        .table
}

fn bench_profiles(c: &mut Criterion) {
    let (old_dir, old_path) = generate_visits(20_000, "old.csv", 0);
    let (new_dir, new_path) = generate_visits(20_000, "new.csv", 3);
    let old = load(&old_path);
    let new = load(&new_path);

    let mut group = c.benchmark_group("profile");
    group.bench_function("ingest", |b| {
        b.iter_batched(|| (), |_| load(&old_path), BatchSize::SmallInput);
    });
    group.bench_function("completeness", |b| {
        b.iter(|| completeness::analyze(&old, 90.0));
    });
    group.bench_function("cardinality", |b| {
        b.iter(|| cardinality::analyze(&old));
    });
    group.bench_function("distribution", |b| {
        let options = DistributionOptions::default();
        b.iter(|| distribution::analyze(&old, &options).expect("distribution"));
    });
    group.finish();

    let mut group = c.benchmark_group("diff");
    let key = vec!["id".to_string()];
    group.bench_function("keyed", |b| {
        b.iter(|| compare::diff_by_key(&old, &new, &key).expect("keyed diff"));
    });
    group.bench_function("multiset", |b| {
        b.iter(|| compare::diff_multiset(&old, &new));
    });
    group.finish();

    drop(old_dir);
    drop(new_dir);
}

criterion_group!(benches, bench_profiles);
criterion_main!(benches);

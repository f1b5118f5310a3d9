use app_export::manifest;
use app_export::normalize::normalize_resource;
use criterion::{criterion_group, criterion_main, Criterion};
use std::fs;
use tempfile::tempdir;

fn bench_filelist(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = dir.path();

    for i in 0..10 {
        let sub = path.join(format!("dir_{}", i));
        fs::create_dir_all(&sub).unwrap();
        for j in 0..10 {
            fs::write(sub.join(format!("file_{}.txt", j)), format!("content {} {}", i, j)).unwrap();
        }
    }

    c.bench_function("filelist generation", |b| {
        b.iter(|| {
            let _ = manifest::generate(path);
        })
    });
}

fn bench_normalize(c: &mut Criterion) {
    let manifest = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n  namespace: prod\n  uid: abc\n  resourceVersion: \"1\"\nspec:\n  replicas: 3\n";

    c.bench_function("resource normalization", |b| {
        b.iter(|| {
            let _ = normalize_resource(0, manifest);
        })
    });
}

criterion_group!(benches, bench_filelist, bench_normalize);
criterion_main!(benches);

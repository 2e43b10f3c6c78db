//! Solver benchmarks over synthetic dependency chains and diamonds.

use criterion::{Criterion, criterion_group, criterion_main};
use rondo_core::{Package, Selector, Version};
use rondo_database::InMemoryDatabase;
use rondo_solver::{Request, SolveOptions, solve};

fn chain_world(depth: usize) -> InMemoryDatabase {
    let mut packages = Vec::with_capacity(depth);
    for i in 0..depth {
        let mut p = Package::new("bench", format!("pkg{i:04}"), Version::new(vec![1, 0]));
        if i + 1 < depth {
            p.requires
                .push(Selector::any("bench", format!("pkg{:04}", i + 1)));
        }
        packages.push(p);
    }
    InMemoryDatabase::with_packages(packages).unwrap()
}

fn diamond_world(width: usize) -> InMemoryDatabase {
    let mut root = Package::new("bench", "root", Version::new(vec![1, 0]));
    let mut packages = Vec::with_capacity(width + 2);
    let shared = Package::new("bench", "shared", Version::new(vec![1, 0]));
    for i in 0..width {
        let mut mid = Package::new("bench", format!("mid{i:04}"), Version::new(vec![1, 0]));
        mid.requires.push(Selector::any("bench", "shared"));
        root.requires
            .push(Selector::any("bench", format!("mid{i:04}")));
        packages.push(mid);
    }
    packages.push(root);
    packages.push(shared);
    InMemoryDatabase::with_packages(packages).unwrap()
}

fn bench_chain(c: &mut Criterion) {
    let world = chain_world(64);
    let system = InMemoryDatabase::new();
    let request = Request::new().install(Selector::parse("bench/pkg0000").unwrap());
    let options = SolveOptions::default();

    c.bench_function("solve_chain_64", |b| {
        b.iter(|| solve(&world, &system, &request, &options).unwrap());
    });
}

fn bench_diamond(c: &mut Criterion) {
    let world = diamond_world(32);
    let system = InMemoryDatabase::new();
    let request = Request::new().install(Selector::parse("bench/root").unwrap());
    let options = SolveOptions::default();

    c.bench_function("solve_diamond_32", |b| {
        b.iter(|| solve(&world, &system, &request, &options).unwrap());
    });
}

criterion_group!(benches, bench_chain, bench_diamond);
criterion_main!(benches);

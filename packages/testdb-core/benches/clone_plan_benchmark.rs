//! Clone plan generation benchmark.
//!
//! Measures plan building over synthetic catalogs shaped as chains (every
//! table references the next one, listed child-first) and stars (every table
//! references one hub), plus rendering the plan as a MySQL script.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use testdb_core::catalog::{ForeignKeyDescriptor, ReferentialRule};
use testdb_core::clone::CloneGenerator;
use testdb_core::ident::Ident;

fn ident(name: &str) -> Ident {
    Ident::new(name).expect("valid identifier")
}

fn fk(child: usize, parent: usize) -> ForeignKeyDescriptor {
    ForeignKeyDescriptor {
        table: ident(&format!("t{child:04}")),
        constraint: ident(&format!("fk_{child}_{parent}")),
        column: ident("parent_id"),
        referenced_table: ident(&format!("t{parent:04}")),
        referenced_column: ident("id"),
        update_rule: ReferentialRule::NoAction,
        delete_rule: ReferentialRule::Cascade,
    }
}

fn tables(n: usize) -> Vec<Ident> {
    (0..n).map(|i| ident(&format!("t{i:04}"))).collect()
}

fn chain(n: usize) -> (Vec<Ident>, Vec<ForeignKeyDescriptor>) {
    (tables(n), (0..n.saturating_sub(1)).map(|i| fk(i, i + 1)).collect())
}

fn star(n: usize) -> (Vec<Ident>, Vec<ForeignKeyDescriptor>) {
    (tables(n), (0..n.saturating_sub(1)).map(|i| fk(i, n - 1)).collect())
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("clone_plan");
    let source = ident("tmpl");
    let target = ident("clone");

    for &n in &[10usize, 100, 500] {
        let (chain_tables, chain_fks) = chain(n);
        group.bench_with_input(BenchmarkId::new("chain", n), &n, |b, _| {
            b.iter(|| {
                let plan = CloneGenerator::new(&chain_tables, &chain_fks).plan(&source, &target);
                black_box(plan)
            })
        });

        let (star_tables, star_fks) = star(n);
        group.bench_with_input(BenchmarkId::new("star", n), &n, |b, _| {
            b.iter(|| {
                let plan = CloneGenerator::new(&star_tables, &star_fks).plan(&source, &target);
                black_box(plan)
            })
        });
    }
    group.finish();
}

#[cfg(feature = "mysql")]
fn bench_render(c: &mut Criterion) {
    use testdb_core::mysql::statements::clone_script;

    let (tables, fks) = chain(100);
    let plan = CloneGenerator::new(&tables, &fks).plan(&ident("tmpl"), &ident("clone"));
    c.bench_function("clone_script_100", |b| b.iter(|| black_box(clone_script(&plan))));
}

#[cfg(not(feature = "mysql"))]
fn bench_render(_c: &mut Criterion) {}

criterion_group!(benches, bench_plan, bench_render);
criterion_main!(benches);

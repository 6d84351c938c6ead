use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use dof_sieve::prelude::*;
use dof_sieve::topology::generation::quad_mesh;
use dof_sieve::topology::refine::refine;

/// Square `n`×`n` quad mesh with every other element refined.
fn checkerboard(n: usize) -> Arc<InMemoryMesh> {
    let coarse = quad_mesh(n, n, [0.0, 0.0], [1.0, 1.0]).expect("mesh");
    let marked: Vec<usize> = (0..n * n).filter(|e| (e / n + e % n) % 2 == 0).collect();
    Arc::new(refine(&coarse, &marked).expect("refine"))
}

fn bench_constraint_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("constraint_build");
    for &n in &[8usize, 16] {
        let mesh = checkerboard(n);
        for order in [1u8, 3] {
            let catalog = Arc::new(LagrangeCollection::new(order, 2).expect("catalog"));
            group.bench_with_input(
                BenchmarkId::new(format!("p{order}"), n),
                &n,
                |b, _| {
                    b.iter(|| {
                        let space = FiniteElementSpace::new(
                            mesh.clone(),
                            catalog.clone(),
                            SpaceOptions::default(),
                        )
                        .expect("space");
                        black_box(space.true_vsize().expect("conforming operators"));
                    });
                },
            );
        }
    }
    group.finish();
}

fn bench_refinement_operator(c: &mut Criterion) {
    let mut group = c.benchmark_group("refinement_operator");
    let coarse = Arc::new(quad_mesh(16, 16, [0.0, 0.0], [1.0, 1.0]).expect("mesh"));
    let fine = checkerboard(16);
    for kind in [OperatorKind::MatrixFree, OperatorKind::Assembled] {
        let options = SpaceOptions::default().with_operator_kind(kind);
        let catalog = Arc::new(LagrangeCollection::new(2, 2).expect("catalog"));
        let coarse_space = FiniteElementSpace::new(coarse.clone(), catalog.clone(), options).expect("space");
        let fine_space = FiniteElementSpace::new(fine.clone(), catalog, options).expect("space");
        let transfer = InterpolationGridTransfer::new(&coarse_space, &fine_space).expect("transfer");
        let op = transfer.forward_operator().expect("operator");
        let x = vec![1.0; op.width()];
        let mut y = vec![0.0; op.height()];
        group.bench_function(BenchmarkId::new("apply", format!("{kind:?}")), |b| {
            b.iter(|| {
                op.apply(black_box(&x), &mut y).expect("apply");
                black_box(&y);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_constraint_build, bench_refinement_operator);
criterion_main!(benches);

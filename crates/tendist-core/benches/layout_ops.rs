//! Benchmarks for local layout traversal and scatter/gather

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tendist_core::{scatter_global, Distribution, LocalLayout, Symmetry, TensorMapping, Topology};

fn mapped(edge: usize, sym: &[Symmetry], topo: &Topology) -> TensorMapping {
    let mut m = TensorMapping::new(&[edge, edge], sym, 0).unwrap();
    m.chains_mut().map_physical(0, 0, topo.axes()[0].size).unwrap();
    m.chains_mut().map_physical(1, 1, topo.axes()[1].size).unwrap();
    m.set_padding();
    m
}

/// Benchmark slot traversal for dense and packed layouts
fn bench_for_each_slot(c: &mut Criterion) {
    let mut group = c.benchmark_group("for_each_slot");
    let topo = Topology::new(&[2, 2]).unwrap();

    for edge in [64usize, 256] {
        for (name, sym) in [
            ("dense", [Symmetry::NonSymmetric, Symmetry::NonSymmetric]),
            ("packed", [Symmetry::Symmetric, Symmetry::NonSymmetric]),
        ] {
            let m = mapped(edge, &sym, &topo);
            let dist = Distribution::from_mapping(&m, &topo, 0).unwrap();
            group.bench_with_input(BenchmarkId::new(name, edge), &dist, |b, dist| {
                let layout = LocalLayout::new(dist, &sym).unwrap();
                b.iter(|| {
                    let mut valid = 0usize;
                    layout.for_each_slot(|_, _, v| valid += usize::from(v));
                    std::hint::black_box(valid);
                });
            });
        }
    }

    group.finish();
}

/// Benchmark building a local buffer from a dense global tensor
fn bench_scatter(c: &mut Criterion) {
    let topo = Topology::new(&[2, 2]).unwrap();
    let sym = [Symmetry::NonSymmetric, Symmetry::NonSymmetric];
    let m = mapped(256, &sym, &topo);
    let dist = Distribution::from_mapping(&m, &topo, 3).unwrap();
    let global: Vec<f64> = (0..256 * 256).map(|x| x as f64).collect();

    c.bench_function("scatter_global_256", |b| {
        b.iter(|| {
            let local = scatter_global(&dist, &sym, &global).unwrap();
            std::hint::black_box(local);
        });
    });
}

criterion_group!(benches, bench_for_each_slot, bench_scatter);
criterion_main!(benches);

//! Benchmarks for the contraction executor
//!
//! Measures the sequential block kernel and whole planned matmuls on a
//! threaded world, planning included.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use tendist_comm::ThreadComm;
use tendist_core::scatter_global;
use tendist_exec::{plan_contraction, LocalKernel, LocalSpec, ReferenceKernel};
use tendist_planner::{Contraction, PlannerConfig, Role, Session};

fn bench_reference_kernel(c: &mut Criterion) {
    let mut group = c.benchmark_group("reference_kernel");
    for n in [16usize, 32, 64] {
        let spec = LocalSpec {
            labels: vec!['i', 'k', 'j'],
            block_edge: vec![n; 3],
            dims: [vec![0, 1], vec![1, 2], vec![0, 2]],
            block_size: [n * n; 3],
            packed: [false; 3],
        };
        let a = vec![1.0f64; n * n];
        let b = vec![0.5f64; n * n];
        group.bench_with_input(BenchmarkId::from_parameter(n), &spec, |bench, spec| {
            let mut out = vec![0.0f64; n * n];
            bench.iter(|| {
                ReferenceKernel
                    .contract(spec, black_box(&a), black_box(&b), &mut out, 1.0, 0.0)
                    .expect("matching lengths")
            });
        });
    }
    group.finish();
}

fn bench_planned_matmul(c: &mut Criterion) {
    let mut group = c.benchmark_group("planned_matmul");
    group.sample_size(20);
    for (procs, n) in [(4usize, 32usize), (4, 64), (9, 48)] {
        let id = format!("{}x{}", procs, n);
        group.bench_with_input(BenchmarkId::from_parameter(id), &(procs, n), |bench, &(procs, n)| {
            let global = vec![1.0f64; n * n];
            bench.iter(|| {
                ThreadComm::run(procs, |comm| {
                    let mut session = Session::new(comm, PlannerConfig::default()).expect("valid world");
                    let mut ctr = Contraction::from_einsum("ik,kj->ij", [&[n, n], &[n, n], &[n, n]])
                        .expect("valid contraction");
                    let plan = plan_contraction(&mut session, &mut ctr).expect("plannable");
                    let local = |role| {
                        scatter_global(plan.distribution(role), plan.symmetry(role), &global).expect("matching edges")
                    };
                    let (a, b) = (local(Role::A), local(Role::B));
                    let mut out = vec![0.0f64; plan.local_len(Role::C)];
                    plan.run(&a, &b, &mut out, 1.0, 0.0, &ReferenceKernel).expect("run");
                    black_box(out.len())
                })
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_reference_kernel, bench_planned_matmul);
criterion_main!(benches);

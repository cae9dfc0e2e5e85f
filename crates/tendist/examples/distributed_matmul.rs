//! Plan and run a matmul on a threaded world, then check it against a
//! dense product.
//!
//! Run with `RUST_LOG=tendist_planner=debug,tendist_exec=debug` to see the
//! topology search and the SUMMA sweeps.

use anyhow::Result;
use tendist::prelude::*;

const M: usize = 12;
const K: usize = 8;
const N: usize = 10;

fn dense_product(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut c = vec![0.0; M * N];
    for j in 0..N {
        for l in 0..K {
            for i in 0..M {
                c[i + j * M] += a[i + l * M] * b[l + j * K];
            }
        }
    }
    c
}

fn main() -> Result<()> {
    init_tracing(TracingConfig::default())?;

    let a: Vec<f64> = (0..M * K).map(|x| (x % 7) as f64).collect();
    let b: Vec<f64> = (0..K * N).map(|x| (x % 5) as f64 - 2.0).collect();
    let procs = 6;

    let views = ThreadComm::run(procs, |comm| -> Result<Vec<f64>> {
        let rank = comm.rank();
        let mut session = Session::new(comm, PlannerConfig::from_env())?;
        let mut ctr = Contraction::from_einsum("ik,kj->ij", [&[M, K], &[K, N], &[M, N]])?;
        let plan = plan_contraction(&mut session, &mut ctr)?;
        if rank == 0 {
            println!("{}", plan);
            for rejection in session.rejected() {
                println!("  rejected topology {}: {}", rejection.topology, rejection.reason);
            }
        }

        let local_a = scatter_global(plan.distribution(Role::A), plan.symmetry(Role::A), &a)?;
        let local_b = scatter_global(plan.distribution(Role::B), plan.symmetry(Role::B), &b)?;
        let mut local_c = vec![0.0; plan.local_len(Role::C)];
        plan.run(&local_a, &local_b, &mut local_c, 1.0, 0.0, &ReferenceKernel)?;

        let mut view = vec![f64::NAN; M * N];
        gather_global(plan.distribution(Role::C), plan.symmetry(Role::C), &local_c, &mut view)?;
        tracing::info!(rank, stats = ?session.comm().stats(), "rank finished");
        Ok(view)
    })
    .into_iter()
    .collect::<Result<Vec<_>>>()?;

    let expected = dense_product(&a, &b);
    let mut worst: f64 = 0.0;
    for (i, want) in expected.iter().enumerate() {
        for view in &views {
            if !view[i].is_nan() {
                worst = worst.max((view[i] - want).abs());
            }
        }
    }
    println!("{} ranks, max abs error {:.3e}", procs, worst);
    Ok(())
}

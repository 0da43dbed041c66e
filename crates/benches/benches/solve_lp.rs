use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use irlp_algos::{solve_exact, solve_float};
use irlp_core::options::SolverParams;
use irlp_core::problem::{Column, LinearProgram, ObjSense, Row, SparseVector};
use rand::{rngs::SmallRng, Rng, SeedableRng};

/// Dense random packing LP `max c^T x, A x <= b, 0 <= x <= 1` with positive data.
fn random_packing(m: usize, n: usize, rng: &mut SmallRng) -> LinearProgram<f64> {
    let mut lp = LinearProgram::new(ObjSense::Maximize);
    for _ in 0..n {
        let obj = (rng.gen_range(1..=20) as f64) / 4.0;
        lp.add_col(Column::new(obj, SparseVector::new(), 0.0, 1.0))
            .unwrap();
    }
    for _ in 0..m {
        let mut coeffs = SparseVector::new();
        for j in 0..n {
            if rng.gen_bool(0.4) {
                coeffs.set(j, rng.gen_range(1..=9) as f64);
            }
        }
        let rhs = rng.gen_range(n..=4 * n) as f64;
        lp.add_row(Row::new(f64::NEG_INFINITY, coeffs, rhs)).unwrap();
    }
    lp
}

fn solve_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("lp_solve");
    let mut rng = SmallRng::seed_from_u64(42);
    let params = SolverParams::default();
    group.bench_function("float_m=40_n=60", |b| {
        b.iter_batched(
            || random_packing(40, 60, &mut rng),
            |lp| {
                let _ = solve_float(&lp, None, &params).unwrap();
            },
            BatchSize::SmallInput,
        );
    });
    group.bench_function("exact_m=20_n=30", |b| {
        b.iter_batched(
            || random_packing(20, 30, &mut rng).to_rational(params.infinity),
            |lp| {
                let _ = solve_exact(&lp, &params).unwrap();
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, solve_benchmark);
criterion_main!(benches);

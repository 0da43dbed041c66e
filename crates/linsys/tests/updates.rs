use approx::assert_abs_diff_eq;
use irlp_core::options::FactorUpdate;
use irlp_linsys::{BasisFactor, SparseColumn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn random_column(rng: &mut SmallRng, dim: usize, dominant: usize) -> SparseColumn {
    let mut col = SparseColumn::new();
    for i in 0..dim {
        if i != dominant && rng.gen_bool(0.3) {
            col.push((i, rng.gen_range(-1.0..1.0)));
        }
    }
    col.push((dominant, rng.gen_range(4.0..8.0) * dim as f64));
    col
}

fn residual(columns: &[SparseColumn], x: &[f64], b: &[f64]) -> f64 {
    let mut ax = vec![0.0; b.len()];
    for (j, col) in columns.iter().enumerate() {
        for &(i, v) in col {
            ax[i] += v * x[j];
        }
    }
    ax.iter()
        .zip(b)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max)
}

fn run_updates(kind: FactorUpdate, seed: u64) {
    let dim = 12;
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut columns: Vec<SparseColumn> = (0..dim).map(|k| random_column(&mut rng, dim, k)).collect();
    let mut lu = BasisFactor::factorize(&columns, kind, 1e-12, 1e-12).unwrap();
    for _ in 0..25 {
        let position = rng.gen_range(0..dim);
        let entering = random_column(&mut rng, dim, position);
        let mut alpha = vec![0.0; dim];
        for &(i, v) in &entering {
            alpha[i] += v;
        }
        lu.solve(&mut alpha);
        lu.update(position, &entering, &alpha).unwrap();
        columns[position] = entering;

        let fresh = BasisFactor::factorize(&columns, kind, 1e-12, 1e-12).unwrap();
        let b: Vec<f64> = (0..dim).map(|_| rng.gen_range(-10.0..10.0)).collect();
        let mut x_updated = b.clone();
        lu.solve(&mut x_updated);
        let mut x_fresh = b.clone();
        fresh.solve(&mut x_fresh);
        assert!(residual(&columns, &x_updated, &b) < 1e-9);
        for (u, f) in x_updated.iter().zip(&x_fresh) {
            assert_abs_diff_eq!(u, f, epsilon = 1e-9);
        }

        let mut y_updated = b.clone();
        lu.solve_transpose(&mut y_updated);
        let mut y_fresh = b.clone();
        fresh.solve_transpose(&mut y_fresh);
        for (u, f) in y_updated.iter().zip(&y_fresh) {
            assert_abs_diff_eq!(u, f, epsilon = 1e-9);
        }
    }
    assert_eq!(lu.num_updates(), 25);
}

#[test]
fn eta_updates_agree_with_refactorization() {
    run_updates(FactorUpdate::Eta, 7);
}

#[test]
fn forrest_tomlin_updates_agree_with_refactorization() {
    run_updates(FactorUpdate::ForrestTomlin, 7);
    run_updates(FactorUpdate::ForrestTomlin, 99);
}

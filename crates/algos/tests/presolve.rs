use approx::assert_abs_diff_eq;
use irlp_algos::{solve_float, violations, SimplexEngine};
use irlp_core::math::LpNumber;
use irlp_core::options::{ScalerKind, SimplifierKind, SolverParams};
use irlp_core::presolve::{PresolveStatus, Presolver};
use irlp_core::problem::{Column, LinearProgram, ObjSense, Row, SparseVector};
use irlp_core::rational::Rational;
use irlp_core::solution::Status;
use irlp_core::traits::Simplifier;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Feasible and bounded by construction, with fixed columns, singleton and empty rows and a
/// free column tied to a structural one by a doubleton equation.
fn presolvable_lp(rng: &mut SmallRng) -> LinearProgram<f64> {
    let n = 6;
    let sense = if rng.gen_bool(0.5) {
        ObjSense::Minimize
    } else {
        ObjSense::Maximize
    };
    let mut lp = LinearProgram::new(sense);
    let mut point = Vec::with_capacity(n + 1);
    for _ in 0..n {
        let p = rng.gen_range(0..=5) as f64;
        let (lower, upper) = if rng.gen_bool(0.2) { (p, p) } else { (0.0, 10.0) };
        let obj = rng.gen_range(-4..=4) as f64;
        lp.add_col(Column::new(obj, SparseVector::new(), lower, upper))
            .unwrap();
        point.push(p);
    }
    let free_value = rng.gen_range(-3..=3) as f64;
    lp.add_col(Column::new(
        rng.gen_range(-2..=2) as f64,
        SparseVector::new(),
        f64::NEG_INFINITY,
        f64::INFINITY,
    ))
    .unwrap();
    point.push(free_value);

    let tied = rng.gen_range(0..n);
    let a = rng.gen_range(1..=3) as f64;
    let rhs = free_value + a * point[tied];
    lp.add_row(Row::new(
        rhs,
        SparseVector::from_entries([(n, 1.0), (tied, a)]),
        rhs,
    ))
    .unwrap();

    for _ in 0..4 {
        let mut coeffs = SparseVector::new();
        if rng.gen_bool(0.3) {
            let j = rng.gen_range(0..n);
            coeffs.set(j, rng.gen_range(1..=3) as f64);
        } else {
            for j in 0..n {
                if rng.gen_bool(0.5) {
                    coeffs.set(j, rng.gen_range(-3..=3) as f64);
                }
            }
        }
        let activity = coeffs.dot(&point);
        let (lhs, rhs) = match rng.gen_range(0..3) {
            0 => (f64::NEG_INFINITY, activity + rng.gen_range(0..=3) as f64),
            1 => (activity - rng.gen_range(0..=3) as f64, f64::INFINITY),
            _ => (activity - 1.0, activity + 1.0),
        };
        lp.add_row(Row::new(lhs, coeffs, rhs)).unwrap();
    }
    lp.add_row(Row::new(-1.0, SparseVector::new(), 1.0)).unwrap();
    lp
}

fn exact(values: &[f64]) -> Vec<Rational> {
    values.iter().map(|&v| Rational::from_real(v, 1e100)).collect()
}

#[test]
fn postsolved_optimum_is_optimal_for_original() {
    let mut rng = SmallRng::seed_from_u64(91);
    let params = SolverParams::default().with_preprocessing(ScalerKind::Off, SimplifierKind::Off);
    let tol = Rational::from_real(1e-6, 1e100);
    let mut checked = 0;
    for run in 0..40 {
        let lp = presolvable_lp(&mut rng);
        let presolved = Presolver::default().simplify(&lp);
        assert_eq!(presolved.status, PresolveStatus::Reduced, "run {run}");
        if presolved.lp.num_cols() == 0 {
            continue;
        }
        checked += 1;

        let reduced = SimplexEngine::new(&params).solve(&presolved.lp, None).unwrap();
        assert_eq!(reduced.status, Status::Optimal, "run {run}");
        let x = presolved
            .postsolve
            .unsimplify_primal(reduced.solution.primal().unwrap());
        let (y, d) = presolved.postsolve.unsimplify_dual(
            reduced.solution.dual().unwrap(),
            reduced.solution.reduced_costs().unwrap(),
            reduced.basis.as_ref().unwrap(),
        );
        let basis = presolved
            .postsolve
            .unsimplify_basis(reduced.basis.as_ref().unwrap());
        assert!(basis.is_consistent(lp.num_rows(), lp.num_cols()), "run {run}");

        let check = violations(&lp.to_rational(1e100), &exact(&x), &exact(&y)).unwrap();
        assert!(check.within(&tol, &tol), "run {run}: {check:?}");
        let aty = lp.transposed_activity(&y).unwrap();
        for (j, (_, col)) in lp.cols().enumerate() {
            assert_abs_diff_eq!(d[j], col.obj - aty[j], epsilon = 1e-6);
        }

        let plain = SimplexEngine::new(&params).solve(&lp, None).unwrap();
        assert_eq!(plain.status, Status::Optimal, "run {run}");
        assert_abs_diff_eq!(
            lp.objective_value(&x),
            plain.solution.objective.unwrap(),
            epsilon = 1e-6
        );
    }
    assert!(checked > 0);
}

#[test]
fn presolve_inside_float_solve_matches_plain_solve() {
    let mut rng = SmallRng::seed_from_u64(5);
    let plain = SolverParams::default().with_preprocessing(ScalerKind::Off, SimplifierKind::Off);
    let presolving = SolverParams::default();
    for run in 0..20 {
        let lp = presolvable_lp(&mut rng);
        let a = solve_float(&lp, None, &plain).unwrap();
        let b = solve_float(&lp, None, &presolving).unwrap();
        assert_eq!(a.status, Status::Optimal, "run {run}");
        assert_eq!(b.status, Status::Optimal, "run {run}");
        assert_abs_diff_eq!(
            a.solution.objective.unwrap(),
            b.solution.objective.unwrap(),
            epsilon = 1e-6
        );
    }
}

use crate::simplex::{FloatOutcome, SimplexEngine, SimplexError};
use irlp_core::basis::BasisStatus;
use irlp_core::math::CancelToken;
use irlp_core::options::{SimplifierKind, SolverParams};
use irlp_core::presolve::{PresolveStatus, Postsolve, Presolver};
use irlp_core::problem::LinearProgram;
use irlp_core::scaling::{AnyScaler, ScaleFactors};
use irlp_core::solution::{DualPart, PrimalPart, Solution, Status};
use irlp_core::stats::SimplexStats;
use irlp_core::traits::{Scaler, Simplifier};
use tracing::debug;

/// Floating-point solve of `lp` behind the configured simplifier and scaler.
///
/// Results are always in the coordinates of `lp`. The simplifier only runs without a
/// starting basis; certificates are produced on the unsimplified problem.
pub fn solve_float(
    lp: &LinearProgram<f64>,
    basis: Option<&BasisStatus>,
    params: &SolverParams,
) -> Result<FloatOutcome, SimplexError> {
    solve_float_with(lp, basis, params, None)
}

pub fn solve_float_with(
    lp: &LinearProgram<f64>,
    basis: Option<&BasisStatus>,
    params: &SolverParams,
    cancel: Option<&CancelToken>,
) -> Result<FloatOutcome, SimplexError> {
    params.validate()?;
    lp.validate()?;
    if lp.num_rows() == 0 && lp.num_cols() == 0 {
        return Ok(FloatOutcome {
            status: Status::NoProblem,
            solution: Solution {
                objective: Some(*lp.obj_offset()),
                ..Solution::empty()
            },
            basis: Some(BasisStatus::default()),
            stats: SimplexStats::default(),
        });
    }
    if params.simplifier == SimplifierKind::Auto && basis.is_none() {
        let presolved = Presolver::new(params.fp_feastol, params.epsilon_zero).simplify(lp);
        match presolved.status {
            PresolveStatus::Unsimplified => {}
            PresolveStatus::Infeasible | PresolveStatus::Unbounded => {
                debug!(status = ?presolved.status, "presolve decided, solving for a certificate");
            }
            PresolveStatus::Reduced => {
                debug!(
                    rows = presolved.lp.num_rows(),
                    cols = presolved.lp.num_cols(),
                    "solving reduced problem"
                );
                let reduced = solve_scaled(&presolved.lp, None, params, cancel)?;
                if reduced.status == Status::Optimal || reduced.status.is_abort() {
                    if let Some(outcome) = postsolve(lp, &presolved.postsolve, &reduced) {
                        return Ok(outcome);
                    }
                }
                if reduced.status.is_failure() {
                    return Ok(reduced);
                }
            }
        }
    }
    solve_scaled(lp, basis, params, cancel)
}

fn solve_scaled(
    lp: &LinearProgram<f64>,
    basis: Option<&BasisStatus>,
    params: &SolverParams,
    cancel: Option<&CancelToken>,
) -> Result<FloatOutcome, SimplexError> {
    let mut engine = SimplexEngine::new(params);
    if let Some(token) = cancel {
        engine = engine.with_cancel(token);
    }
    let Some(scaler) = AnyScaler::from_kind(params.scaler) else {
        return engine.solve(lp, basis);
    };
    let mut scaled = lp.clone();
    let factors = scaler.scale(&mut scaled)?;
    debug!(scaler = scaler.name(), "problem scaled");
    let mut outcome = engine.solve(&scaled, basis)?;
    unscale(&factors, &mut outcome.solution);
    Ok(outcome)
}

fn unscale(factors: &ScaleFactors, solution: &mut Solution<f64>) {
    match &mut solution.primal {
        PrimalPart::Point { values, slacks } => {
            factors.unscale_primal(values);
            factors.unscale_slacks(slacks);
        }
        PrimalPart::Ray(ray) => factors.unscale_primal_ray(ray),
        PrimalPart::None => {}
    }
    match &mut solution.dual {
        DualPart::Multipliers {
            dual,
            reduced_costs,
        } => {
            factors.unscale_dual(dual);
            factors.unscale_reduced_costs(reduced_costs);
        }
        DualPart::Farkas(ray) => factors.unscale_farkas(ray),
        DualPart::None => {}
    }
}

/// Maps a point solution of the reduced problem back onto `lp`; `None` without a basis.
fn postsolve(
    lp: &LinearProgram<f64>,
    postsolve: &Postsolve,
    reduced: &FloatOutcome,
) -> Option<FloatOutcome> {
    let basis = reduced.basis.as_ref()?;
    let x = postsolve.unsimplify_primal(reduced.solution.primal()?);
    let slacks = lp.activity(&x).ok()?;
    let (dual, reduced_costs, basis) = postsolve.unsimplify_dual_basis(
        reduced.solution.dual()?,
        reduced.solution.reduced_costs()?,
        basis,
    );
    let solution = Solution {
        objective: Some(lp.objective_value(&x)),
        primal: PrimalPart::Point { values: x, slacks },
        dual: DualPart::Multipliers {
            dual,
            reduced_costs,
        },
        verified: false,
    };
    Some(FloatOutcome {
        status: reduced.status,
        solution,
        basis: Some(basis),
        stats: reduced.stats.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use irlp_core::options::ScalerKind;
    use irlp_core::problem::{Column, ObjSense, Row, SparseVector};

    /// A fixed column and a singleton row around a two-variable core.
    fn presolvable() -> LinearProgram<f64> {
        let mut lp = LinearProgram::new(ObjSense::Minimize);
        lp.add_col(Column::new(1.0, SparseVector::new(), 0.0, f64::INFINITY))
            .unwrap();
        lp.add_col(Column::new(2.0, SparseVector::new(), 0.0, f64::INFINITY))
            .unwrap();
        lp.add_col(Column::new(5.0, SparseVector::new(), 1.5, 1.5))
            .unwrap();
        lp.add_row(Row::new(
            4.0,
            SparseVector::from_entries([(0, 1.0), (1, 1.0), (2, 1.0)]),
            f64::INFINITY,
        ))
        .unwrap();
        lp.add_row(Row::new(
            1.0,
            SparseVector::from_entries([(1, 1.0)]),
            f64::INFINITY,
        ))
        .unwrap();
        lp
    }

    #[test]
    fn presolved_and_plain_solves_agree() {
        let lp = presolvable();
        let plain = SolverParams::default().with_preprocessing(ScalerKind::Off, SimplifierKind::Off);
        let reduced = SolverParams::default();
        let a = solve_float(&lp, None, &plain).unwrap();
        let b = solve_float(&lp, None, &reduced).unwrap();
        assert_eq!(a.status, Status::Optimal);
        assert_eq!(b.status, Status::Optimal);
        // x0 = 1.5, x1 = 1, x2 = 1.5
        assert_abs_diff_eq!(a.solution.objective.unwrap(), 11.0, epsilon = 1e-9);
        assert_abs_diff_eq!(b.solution.objective.unwrap(), 11.0, epsilon = 1e-9);
        let (ya, yb) = (a.solution.dual().unwrap(), b.solution.dual().unwrap());
        for (u, v) in ya.iter().zip(yb) {
            assert_abs_diff_eq!(u, v, epsilon = 1e-9);
        }
        let basis = b.basis.unwrap();
        assert!(basis.is_consistent(2, 3));
    }

    #[test]
    fn every_scaler_returns_original_coordinates() {
        let lp = presolvable();
        for scaler in [
            ScalerKind::UniEqui,
            ScalerKind::BiEqui,
            ScalerKind::Geo1,
            ScalerKind::Geo8,
        ] {
            let params = SolverParams::default().with_preprocessing(scaler, SimplifierKind::Off);
            let out = solve_float(&lp, None, &params).unwrap();
            let x = out.solution.primal().unwrap();
            assert_abs_diff_eq!(x[0], 1.5, epsilon = 1e-9);
            assert_abs_diff_eq!(x[1], 1.0, epsilon = 1e-9);
            let s = out.solution.slacks().unwrap();
            assert_abs_diff_eq!(s[0], 4.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn presolve_infeasibility_still_yields_certificate() {
        let mut lp = LinearProgram::new(ObjSense::Minimize);
        lp.add_col(Column::new(1.0, SparseVector::new(), 0.0, 1.0))
            .unwrap();
        lp.add_row(Row::new(3.0, SparseVector::from_entries([(0, 1.0)]), f64::INFINITY))
            .unwrap();
        let out = solve_float(&lp, None, &SolverParams::default()).unwrap();
        assert_eq!(out.status, Status::Infeasible);
        assert!(out.solution.dual_farkas().is_some());
    }

    #[test]
    fn empty_problem_is_reported() {
        let lp = LinearProgram::<f64>::new(ObjSense::Minimize);
        let out = solve_float(&lp, None, &SolverParams::default()).unwrap();
        assert_eq!(out.status, Status::NoProblem);
    }
}

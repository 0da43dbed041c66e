//! Exact solving by iterative refinement of floating-point simplex solves.
//!
//! The rational problem is brought into equality form `A x - s = 0` with the rows as
//! bounded slack columns. Each round solves a scaled correction problem in floating point
//! and adds its solution to the exact iterate, until the exact violations meet the
//! rational tolerances. Float infeasibility and unboundedness claims are checked exactly
//! and, when the float certificate does not hold, decided through the feasibility and
//! unboundedness transforms.

use crate::float::solve_float_with;
use crate::simplex::SimplexError;
use crate::transform::{EqualityForm, Feasibility, FeasibilityTransform, UnboundednessTransform};
use crate::violation::{
    bound_violation, check_ray, farkas_proves_infeasible, sense_sign, sign_violation, violations,
};
use irlp_core::basis::{BasisStatus, VarStatus};
use irlp_core::math::{CancelToken, LpNumber, Timer};
use irlp_core::options::{Algorithm, ParamError, SimplifierKind, SolverParams, Verbosity};
use irlp_core::problem::{Column, LinearProgram, ObjSense, ProblemError, ProblemResult, Row};
use irlp_core::rational::{log2_estimate, max_abs, pow2, ExactInfinity, Rational};
use irlp_core::solution::{DualPart, PrimalPart, Solution, Status};
use irlp_core::stats::{RefinementRecord, SolveStats};
use irlp_linsys::RationalLu;
use itertools::izip;
use num_traits::{One, Signed, Zero};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Rounds allowed without an explicit refinement limit.
const MAX_ROUNDS: usize = 200;
/// Rounds after which a rational basis solve is attempted even without a stall.
const RATIONAL_AFTER: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Init,
    FloatSolve,
    Transform,
    RefineIterate,
    Reconstruct,
    Done,
    Error,
}

#[derive(Debug, Error)]
pub enum IrError {
    #[error(transparent)]
    Simplex(#[from] SimplexError),
    #[error("invalid problem: {0}")]
    Problem(#[from] ProblemError),
    #[error("invalid parameters: {0}")]
    Params(#[from] ParamError),
}

/// Result of an exact solve, in the coordinates and sense of the rational problem.
#[derive(Debug, Clone)]
pub struct ExactOutcome {
    pub status: Status,
    pub solution: Solution<Rational>,
    pub basis: Option<BasisStatus>,
    pub stats: SolveStats,
}

pub fn solve_exact(
    lp: &LinearProgram<Rational>,
    params: &SolverParams,
) -> Result<ExactOutcome, IrError> {
    IterativeRefinement::new(params).solve(lp)
}

fn exact(value: f64) -> Rational {
    Rational::from_float(value).unwrap_or_else(Rational::zero)
}

fn exact_all(values: &[f64]) -> Vec<Rational> {
    values.iter().map(|&v| exact(v)).collect()
}

/// Largest power of two not exceeding `1 / violation`, growing by at most `max_incr`
/// binary orders per round and never below one.
fn next_scale(violation: &Rational, previous: &Rational, max_incr: i64) -> Rational {
    if violation.is_zero() {
        return pow2(log2_estimate(previous).saturating_add(max_incr).max(0));
    }
    let wanted = -log2_estimate(violation);
    let cap = log2_estimate(previous).saturating_add(max_incr);
    pow2(wanted.min(cap).max(0))
}

/// Puts nonbasic entries of `x` exactly on the bound their status names.
fn snap(lp: &LinearProgram<Rational>, x: &mut [Rational], basis: &BasisStatus, inf: &ExactInfinity) {
    for (j, (_, col)) in lp.cols().enumerate() {
        let target = match basis.cols.get(j) {
            Some(VarStatus::OnLower | VarStatus::Fixed) => &col.lower,
            Some(VarStatus::OnUpper) => &col.upper,
            Some(VarStatus::Zero) => {
                x[j] = Rational::zero();
                continue;
            }
            Some(VarStatus::Basic) | None => continue,
        };
        if !inf.is_infinite(target) {
            x[j] = target.clone();
        }
    }
}

type Answer = (Status, Solution<Rational>, Option<BasisStatus>);

fn infeasible_answer(farkas: Vec<Rational>, verified: bool) -> Answer {
    let solution = Solution {
        dual: DualPart::Farkas(farkas),
        verified,
        ..Solution::empty()
    };
    (Status::Infeasible, solution, None)
}

fn unbounded_answer(ray: Vec<Rational>, verified: bool) -> Answer {
    let solution = Solution {
        primal: PrimalPart::Ray(ray),
        verified,
        ..Solution::empty()
    };
    (Status::Unbounded, solution, None)
}

fn failed_answer(status: Status) -> Answer {
    (status, Solution::empty(), None)
}

/// Outcome of refining one problem.
enum Refined {
    Solved {
        status: Status,
        x: Vec<Rational>,
        /// Row duals in the sense of the refined problem.
        y: Vec<Rational>,
        basis: Option<BasisStatus>,
        verified: bool,
    },
    Infeasible(Option<Vec<Rational>>),
    Unbounded(Option<Vec<Rational>>),
    Failed(Status),
}

enum FeasibilityTest {
    Feasible,
    Infeasible { farkas: Vec<Rational>, verified: bool },
    Failed(Status),
}

pub struct IterativeRefinement<'a> {
    params: &'a SolverParams,
    cancel: Option<&'a CancelToken>,
    inf: ExactInfinity,
    phase: Phase,
    stats: SolveStats,
    timer: Timer,
    start_basis: Option<BasisStatus>,
    retried: bool,
    /// Stopping tolerances of refinement runs, normally the exact tolerances of `params`.
    feastol: Rational,
    opttol: Rational,
}

impl<'a> IterativeRefinement<'a> {
    pub fn new(params: &'a SolverParams) -> Self {
        Self {
            params,
            cancel: None,
            inf: ExactInfinity::new(params.infinity),
            phase: Phase::Init,
            stats: SolveStats::new(),
            timer: Timer::stopped(),
            start_basis: None,
            retried: false,
            feastol: params.feastol.clone(),
            opttol: params.opttol.clone(),
        }
    }

    pub fn with_cancel(mut self, token: &'a CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Warm start for the first floating-point solve.
    pub fn with_basis(mut self, basis: BasisStatus) -> Self {
        self.start_basis = Some(basis);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stats(&self) -> &SolveStats {
        &self.stats
    }

    fn enter(&mut self, phase: Phase) {
        if self.params.verbosity.allows(Verbosity::High) {
            debug!(from = ?self.phase, to = ?phase, "refinement phase");
        }
        self.phase = phase;
    }

    pub fn solve(&mut self, lp: &LinearProgram<Rational>) -> Result<ExactOutcome, IrError> {
        self.timer = Timer::start();
        self.stats = SolveStats::new();
        self.retried = false;
        self.phase = Phase::Init;
        let (status, solution, basis) = match self.run(lp) {
            Ok(answer) => answer,
            Err(err) => {
                self.enter(Phase::Error);
                return Err(err);
            }
        };
        self.enter(if status.is_failure() {
            Phase::Error
        } else {
            Phase::Done
        });
        self.stats.solve_time = self.timer.elapsed();
        if self.params.verbosity.allows(Verbosity::Normal) {
            info!(
                ?status,
                verified = solution.verified,
                refinements = self.stats.refinements,
                simplex_calls = self.stats.simplex_calls,
                iterations = self.stats.simplex.iterations,
                "exact solve finished"
            );
        }
        Ok(ExactOutcome {
            status,
            solution,
            basis,
            stats: self.stats.clone(),
        })
    }

    fn run(&mut self, lp: &LinearProgram<Rational>) -> Result<Answer, IrError> {
        self.params.validate()?;
        lp.validate()?;
        if lp.is_empty() {
            let solution = Solution {
                objective: Some(lp.obj_offset().clone()),
                ..Solution::empty()
            };
            return Ok((Status::NoProblem, solution, Some(BasisStatus::default())));
        }
        loop {
            let decided = match self.refine(lp, true)? {
                Refined::Solved {
                    status,
                    x,
                    y,
                    basis,
                    verified,
                } => Some(self.solved_answer(lp, status, x, y, basis, verified)?),
                Refined::Infeasible(farkas) => self.decide_infeasible(lp, farkas)?,
                Refined::Unbounded(ray) => self.decide_unbounded(lp, ray)?,
                Refined::Failed(status) => Some(failed_answer(status)),
            };
            if let Some(answer) = decided {
                return Ok(answer);
            }
            if self.retried {
                if self.params.verbosity.allows(Verbosity::Warning) {
                    warn!("floating-point claim contradicted twice");
                }
                return Ok(failed_answer(Status::Error));
            }
            if self.params.verbosity.allows(Verbosity::Warning) {
                warn!("floating-point claim contradicted, retrying with the other algorithm");
            }
            self.retried = true;
        }
    }

    /// Parameters for one floating-point solve: the remaining time, and for anything but
    /// the first solve of the original problem no presolve and no objective limits.
    fn float_params(&self, first: bool) -> SolverParams {
        let mut params = self.params.clone();
        if let Some(limit) = self.params.time_limit {
            params.time_limit = Some(limit.saturating_sub(self.timer.elapsed()));
        }
        if !first || self.retried {
            params.simplifier = SimplifierKind::Off;
            params.obj_limit_lower = None;
            params.obj_limit_upper = None;
        }
        if self.retried {
            params.algorithm = match params.algorithm {
                Algorithm::Enter => Algorithm::Leave,
                Algorithm::Leave => Algorithm::Enter,
            };
        }
        params
    }

    fn limit_hit(&self) -> bool {
        self.cancel.is_some_and(CancelToken::is_cancelled)
            || self
                .params
                .time_limit
                .is_some_and(|limit| self.timer.elapsed() >= limit)
    }

    fn refine(&mut self, lp: &LinearProgram<Rational>, first: bool) -> Result<Refined, IrError> {
        let n = lp.num_cols();
        let sign = sense_sign(lp.sense());
        self.enter(Phase::FloatSolve);
        let real = lp.to_real(self.params.infinity);
        let hint = if first && !self.retried {
            self.start_basis.clone()
        } else {
            None
        };
        let out = solve_float_with(&real, hint.as_ref(), &self.float_params(first), self.cancel)?;
        self.stats.record_simplex(&out.stats);
        match out.status {
            Status::Infeasible => {
                return Ok(Refined::Infeasible(out.solution.dual_farkas().map(exact_all)))
            }
            Status::Unbounded => {
                return Ok(Refined::Unbounded(out.solution.primal_ray().map(exact_all)))
            }
            _ => {}
        }
        let (Some(x), Some(y), Some(basis)) =
            (out.solution.primal(), out.solution.dual(), out.basis.as_ref())
        else {
            let status = if out.status.is_failure() || out.status.is_abort() {
                out.status
            } else {
                Status::Error
            };
            return Ok(Refined::Failed(status));
        };
        if out.status != Status::Optimal {
            return Ok(Refined::Solved {
                status: out.status,
                x: exact_all(x),
                y: exact_all(y),
                basis: Some(basis.clone()),
                verified: false,
            });
        }

        self.enter(Phase::Transform);
        let transform_timer = Timer::start();
        let (eq, eq_lp) = EqualityForm::apply(lp)?;
        let mut xq = eq.lift_primal(lp, &exact_all(x))?;
        let mut y_int: Vec<Rational> = exact_all(y).into_iter().map(|v| v * &sign).collect();
        let mut eq_basis = eq.lift_basis(basis);
        let mut last_basis = basis.clone();
        snap(&eq_lp, &mut xq, &eq_basis, &self.inf);
        self.stats.transform_time += transform_timer.elapsed();

        self.enter(Phase::RefineIterate);
        let max_incr = self.params.max_scale_incr.log2().floor().max(1.0) as i64;
        let round_cap = self.params.ref_limit.unwrap_or(MAX_ROUNDS);
        let mut delta_p = Rational::one();
        let mut delta_d = Rational::one();
        let mut best: Option<Rational> = None;
        let mut stalls = 0;
        let mut round = 0;
        let mut tried_rational = false;
        let status = loop {
            let y_user: Vec<Rational> = y_int.iter().map(|v| v * &sign).collect();
            let check = violations(lp, &xq[..n], &y_user)?;
            if check.within(&self.feastol, &self.opttol) {
                break Status::Optimal;
            }
            let measure = std::cmp::max(check.primal(), check.dual()).clone();
            if best.as_ref().map_or(true, |b| measure < *b) {
                best = Some(measure);
                stalls = 0;
            } else {
                stalls += 1;
                self.stats.stall_refinements += 1;
            }
            let stalled = self.params.stall_ref_limit.is_some_and(|limit| stalls >= limit);
            let exhausted = round >= round_cap;
            if !tried_rational && (stalls > 0 || stalled || exhausted || round >= RATIONAL_AFTER) {
                tried_rational = true;
                if let Some((x_exact, y_exact)) = self.rational_solve(&eq_lp, &eq_basis, &sign) {
                    let y_user: Vec<Rational> = y_exact.iter().map(|v| v * &sign).collect();
                    if violations(lp, &x_exact[..n], &y_user)?
                        .within(&self.feastol, &self.opttol)
                    {
                        xq = x_exact;
                        y_int = y_exact;
                        break Status::Optimal;
                    }
                }
                self.enter(Phase::RefineIterate);
            }
            if stalled || exhausted {
                break Status::AbortRefine;
            }
            if self.limit_hit() {
                break Status::AbortTime;
            }
            round += 1;
            self.stats.refinements += 1;

            let residual: Vec<Rational> =
                eq_lp.activity(&xq)?.into_iter().map(|v| -v).collect();
            let aty = eq_lp.transposed_activity(&y_int)?;
            let cost_hat: Vec<Rational> = eq_lp
                .cols()
                .zip(&aty)
                .map(|((_, col), a)| &sign * &col.obj - a)
                .collect();
            let mut primal_viol = max_abs(&residual);
            let mut dual_viol = Rational::zero();
            for ((_, col), value, d) in izip!(eq_lp.cols(), &xq, &cost_hat) {
                let bv = bound_violation(value, &col.lower, &col.upper);
                if bv > primal_viol {
                    primal_viol = bv;
                }
                let dv = sign_violation(value, &col.lower, &col.upper, d);
                if dv > dual_viol {
                    dual_viol = dv;
                }
            }
            delta_p = next_scale(&primal_viol, &delta_p, max_incr);
            delta_d = next_scale(&dual_viol, &delta_d, max_incr);

            let correction = self.correction_lp(&eq_lp, &xq, &residual, &cost_hat, &delta_p, &delta_d)?;
            let out = solve_float_with(
                &correction,
                Some(&eq_basis),
                &self.float_params(false),
                self.cancel,
            )?;
            self.stats.record_simplex(&out.stats);
            let infinity = self.params.infinity;
            self.stats.push(RefinementRecord {
                round,
                primal_violation: primal_viol.to_real(infinity),
                dual_violation: dual_viol.to_real(infinity),
                primal_scale: delta_p.to_real(infinity),
                dual_scale: delta_d.to_real(infinity),
                simplex_iterations: out.stats.iterations,
                elapsed: self.timer.elapsed(),
            });
            if self.params.verbosity.allows(Verbosity::High) {
                debug!(
                    round,
                    primal = primal_viol.to_real(infinity),
                    dual = dual_viol.to_real(infinity),
                    iterations = out.stats.iterations,
                    "refinement round"
                );
            }
            match out.status {
                Status::Optimal => {}
                Status::Infeasible => return Ok(Refined::Infeasible(None)),
                Status::Unbounded => return Ok(Refined::Unbounded(None)),
                status if status.is_abort() => break status,
                status => return Ok(Refined::Failed(status)),
            }
            let (Some(dx), Some(dy), Some(next)) =
                (out.solution.primal(), out.solution.dual(), out.basis)
            else {
                return Ok(Refined::Failed(Status::Error));
            };
            for (value, step) in xq.iter_mut().zip(dx) {
                *value += exact(*step) / &delta_p;
            }
            for (value, step) in y_int.iter_mut().zip(dy) {
                *value += exact(*step) / &delta_d;
            }
            eq_basis = next;
            if let Some(projected) = eq.project_basis(&eq_basis) {
                last_basis = projected;
            }
            snap(&eq_lp, &mut xq, &eq_basis, &self.inf);
        };

        let verified = status == Status::Optimal;
        let y = y_int.into_iter().map(|v| v * &sign).collect();
        Ok(Refined::Solved {
            status,
            x: eq.untransform(xq),
            y,
            basis: Some(last_basis),
            verified,
        })
    }

    /// Correction problem `min delta_d c_hat^T x  s.t.  A x = delta_p r,
    /// delta_p (l - x_k) <= x <= delta_p (u - x_k)` in floating point.
    fn correction_lp(
        &self,
        eq_lp: &LinearProgram<Rational>,
        xq: &[Rational],
        residual: &[Rational],
        cost_hat: &[Rational],
        delta_p: &Rational,
        delta_d: &Rational,
    ) -> ProblemResult<LinearProgram<f64>> {
        let infinity = self.params.infinity;
        let shifted = |bound: &Rational, value: &Rational, infinite: f64| {
            if self.inf.is_infinite(bound) {
                infinite
            } else {
                ((bound - value) * delta_p).to_real(infinity)
            }
        };
        let mut correction = LinearProgram::new(ObjSense::Minimize);
        for ((_, col), value, d) in izip!(eq_lp.cols(), xq, cost_hat) {
            correction.add_col(Column::new(
                (d * delta_d).to_real(infinity),
                Default::default(),
                shifted(&col.lower, value, f64::NEG_INFINITY),
                shifted(&col.upper, value, f64::INFINITY),
            ))?;
        }
        for ((_, row), r) in eq_lp.rows().zip(residual) {
            let side = (r * delta_p).to_real(infinity);
            correction.add_row(Row::new(side, row.coeffs.map(|v| v.to_real(infinity)), side))?;
        }
        Ok(correction)
    }

    /// Solves the equality form exactly on the basis of `basis`, if that basis has only
    /// structural and slack columns basic and fits the size limit.
    fn rational_solve(
        &mut self,
        eq_lp: &LinearProgram<Rational>,
        basis: &BasisStatus,
        sign: &Rational,
    ) -> Option<(Vec<Rational>, Vec<Rational>)> {
        let m = eq_lp.num_rows();
        if !self.params.rational_factorization
            || m > self.params.rational_factor_max_dim
            || basis.rows.iter().any(|s| s.is_basic())
        {
            return None;
        }
        let basic: Vec<usize> = basis
            .cols
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_basic())
            .map(|(j, _)| j)
            .collect();
        if basic.len() != m {
            return None;
        }
        self.enter(Phase::Reconstruct);
        let timer = Timer::start();
        let mut x = vec![Rational::zero(); eq_lp.num_cols()];
        for (j, (_, col)) in eq_lp.cols().enumerate() {
            let value = match basis.cols[j] {
                VarStatus::OnLower | VarStatus::Fixed => &col.lower,
                VarStatus::OnUpper => &col.upper,
                VarStatus::Basic | VarStatus::Zero => continue,
            };
            if self.inf.is_infinite(value) {
                return None;
            }
            x[j] = value.clone();
        }
        let columns: Vec<Vec<(usize, Rational)>> = basic
            .iter()
            .map(|&j| {
                eq_lp
                    .col(j)
                    .map(|col| col.coeffs.iter().map(|(i, v)| (i, v.clone())).collect())
            })
            .collect::<Result<_, _>>()
            .ok()?;
        let lu = match RationalLu::factorize(&columns) {
            Ok(lu) => lu,
            Err(err) => {
                debug!(%err, "rational basis factorization failed");
                return None;
            }
        };
        self.stats.rational_factorizations += 1;
        let rhs: Vec<Rational> = eq_lp.activity(&x).ok()?.into_iter().map(|v| -v).collect();
        for (&j, value) in basic.iter().zip(lu.solve(&rhs)) {
            x[j] = value;
        }
        let basic_costs: Vec<Rational> = basic
            .iter()
            .map(|&j| eq_lp.col(j).map(|col| &col.obj * sign))
            .collect::<Result<_, _>>()
            .ok()?;
        let y = lu.solve_transpose(&basic_costs);
        self.stats.rational_time += timer.elapsed();
        Some((x, y))
    }

    fn solved_answer(
        &self,
        lp: &LinearProgram<Rational>,
        status: Status,
        x: Vec<Rational>,
        y: Vec<Rational>,
        basis: Option<BasisStatus>,
        verified: bool,
    ) -> ProblemResult<Answer> {
        let slacks = lp.activity(&x)?;
        let aty = lp.transposed_activity(&y)?;
        let reduced_costs = lp
            .cols()
            .zip(aty)
            .map(|((_, col), a)| &col.obj - a)
            .collect();
        let solution = Solution {
            objective: Some(lp.objective_value(&x)),
            primal: PrimalPart::Point { values: x, slacks },
            dual: DualPart::Multipliers {
                dual: y,
                reduced_costs,
            },
            verified,
        };
        let status = if verified { Status::Optimal } else { status };
        Ok((status, solution, basis))
    }

    /// Decides feasibility through the feasibility form. A Farkas vector that fails the
    /// exact test triggers one more run refined to zero tolerance.
    fn feasibility_test(&mut self, lp: &LinearProgram<Rational>) -> Result<FeasibilityTest, IrError> {
        let test = self.run_feasibility(lp)?;
        if !matches!(test, FeasibilityTest::Infeasible { verified: false, .. })
            || (self.feastol.is_zero() && self.opttol.is_zero())
        {
            return Ok(test);
        }
        if self.params.verbosity.allows(Verbosity::High) {
            debug!("Farkas vector not exact, refining the feasibility form to zero tolerance");
        }
        let feastol = std::mem::replace(&mut self.feastol, Rational::zero());
        let opttol = std::mem::replace(&mut self.opttol, Rational::zero());
        let tightened = self.run_feasibility(lp);
        self.feastol = feastol;
        self.opttol = opttol;
        Ok(match tightened? {
            FeasibilityTest::Failed(_) => test,
            decided => decided,
        })
    }

    fn run_feasibility(&mut self, lp: &LinearProgram<Rational>) -> Result<FeasibilityTest, IrError> {
        self.enter(Phase::Transform);
        self.stats.feasibility_refinements += 1;
        let timer = Timer::start();
        let (transform, feas_lp) = FeasibilityTransform::apply(lp, &self.inf)?;
        self.stats.transform_time += timer.elapsed();
        Ok(match self.refine(&feas_lp, false)? {
            Refined::Solved { status, x, y, .. }
                if matches!(status, Status::Optimal | Status::AbortRefine) =>
            {
                match transform.untransform(&x, &y, &self.params.feastol) {
                    Feasibility::Feasible(_) => FeasibilityTest::Feasible,
                    Feasibility::Infeasible(farkas) => {
                        let verified = farkas_proves_infeasible(lp, &farkas, &self.inf);
                        FeasibilityTest::Infeasible { farkas, verified }
                    }
                }
            }
            Refined::Solved { status, .. } | Refined::Failed(status) => {
                FeasibilityTest::Failed(status)
            }
            // the transformed problem is feasible and bounded by construction
            Refined::Infeasible(_) | Refined::Unbounded(_) => FeasibilityTest::Failed(Status::Error),
        })
    }

    /// `None` when the exact test contradicts the float claim.
    fn decide_infeasible(
        &mut self,
        lp: &LinearProgram<Rational>,
        farkas: Option<Vec<Rational>>,
    ) -> Result<Option<Answer>, IrError> {
        if let Some(y) = farkas {
            if farkas_proves_infeasible(lp, &y, &self.inf) {
                return Ok(Some(infeasible_answer(y, true)));
            }
        }
        Ok(match self.feasibility_test(lp)? {
            FeasibilityTest::Feasible => None,
            FeasibilityTest::Infeasible { farkas, verified } => {
                Some(infeasible_answer(farkas, verified))
            }
            FeasibilityTest::Failed(status) => Some(failed_answer(status)),
        })
    }

    fn decide_unbounded(
        &mut self,
        lp: &LinearProgram<Rational>,
        ray: Option<Vec<Rational>>,
    ) -> Result<Option<Answer>, IrError> {
        match self.feasibility_test(lp)? {
            FeasibilityTest::Feasible => {}
            FeasibilityTest::Infeasible { farkas, verified } => {
                return Ok(Some(infeasible_answer(farkas, verified)))
            }
            FeasibilityTest::Failed(status) => return Ok(Some(failed_answer(status))),
        }
        if let Some(r) = ray {
            if check_ray(lp, &r, &self.inf)?.is_some_and(|c| c.is_exact_proof()) {
                return Ok(Some(unbounded_answer(r, true)));
            }
        }
        self.enter(Phase::Transform);
        self.stats.unboundedness_refinements += 1;
        let timer = Timer::start();
        let (transform, ray_lp) = UnboundednessTransform::apply(lp, &self.inf)?;
        self.stats.transform_time += timer.elapsed();
        match self.refine(&ray_lp, false)? {
            Refined::Solved { status, x, .. }
                if matches!(status, Status::Optimal | Status::AbortRefine) =>
            {
                let Some(r) = transform.untransform(x) else {
                    return Ok(None);
                };
                let Some(check) = check_ray(lp, &r, &self.inf)? else {
                    return Ok(None);
                };
                if !check.slope.is_negative() || check.violation > self.params.feastol {
                    return Ok(None);
                }
                Ok(Some(unbounded_answer(r, check.is_exact_proof())))
            }
            Refined::Solved { status, .. } | Refined::Failed(status) => {
                Ok(Some(failed_answer(status)))
            }
            Refined::Infeasible(_) | Refined::Unbounded(_) => Ok(Some(failed_answer(Status::Error))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irlp_core::problem::SparseVector;
    use irlp_core::rational::rational_from_int;

    fn q(v: i64) -> Rational {
        rational_from_int(v)
    }

    fn exact_params() -> SolverParams {
        SolverParams {
            feastol: Rational::zero(),
            opttol: Rational::zero(),
            ..SolverParams::default()
        }
    }

    /// max x + y  s.t.  x + y <= 10,  x, y >= 0
    fn small_max(inf: &ExactInfinity) -> LinearProgram<Rational> {
        let mut lp = LinearProgram::new(ObjSense::Maximize);
        for _ in 0..2 {
            lp.add_col(Column::new(q(1), SparseVector::new(), q(0), inf.pos()))
                .unwrap();
        }
        lp.add_row(Row::new(
            inf.neg(),
            SparseVector::from_entries([(0, q(1)), (1, q(1))]),
            q(10),
        ))
        .unwrap();
        lp
    }

    #[test]
    fn small_max_is_exact() {
        let inf = ExactInfinity::default();
        let params = exact_params();
        let out = solve_exact(&small_max(&inf), &params).unwrap();
        assert_eq!(out.status, Status::Optimal);
        assert!(out.solution.verified);
        assert_eq!(out.solution.objective, Some(q(10)));
        assert_eq!(out.solution.dual().unwrap(), &[q(1)]);
        let basis = out.basis.unwrap();
        assert!(basis.is_consistent(1, 2));
    }

    #[test]
    fn fractional_optimum_is_reconstructed() {
        let inf = ExactInfinity::default();
        // min x + y  s.t.  3x + 7y = 1,  x, y >= 0
        let mut lp = LinearProgram::new(ObjSense::Minimize);
        for _ in 0..2 {
            lp.add_col(Column::new(q(1), SparseVector::new(), q(0), inf.pos()))
                .unwrap();
        }
        lp.add_row(Row::new(
            q(1),
            SparseVector::from_entries([(0, q(3)), (1, q(7))]),
            q(1),
        ))
        .unwrap();
        let params = exact_params();
        let mut ir = IterativeRefinement::new(&params);
        let out = ir.solve(&lp).unwrap();
        assert_eq!(out.status, Status::Optimal);
        assert_eq!(ir.phase(), Phase::Done);
        let x = out.solution.primal().unwrap();
        assert_eq!(x[0], q(0));
        assert_eq!(x[1], Rational::new(1.into(), 7.into()));
        assert_eq!(out.solution.objective, Some(Rational::new(1.into(), 7.into())));
    }

    #[test]
    fn conflicting_rows_are_proven_infeasible() {
        let inf = ExactInfinity::default();
        let mut lp = LinearProgram::new(ObjSense::Minimize);
        lp.add_col(Column::new(q(1), SparseVector::new(), inf.neg(), inf.pos()))
            .unwrap();
        lp.add_row(Row::new(q(5), SparseVector::from_entries([(0, q(1))]), inf.pos()))
            .unwrap();
        lp.add_row(Row::new(inf.neg(), SparseVector::from_entries([(0, q(1))]), q(3)))
            .unwrap();
        let out = solve_exact(&lp, &SolverParams::default()).unwrap();
        assert_eq!(out.status, Status::Infeasible);
        let farkas = out.solution.dual_farkas().unwrap();
        assert!(farkas_proves_infeasible(&lp, farkas, &inf));
        assert!(out.solution.verified);
    }

    #[test]
    fn unbounded_ray_is_exact() {
        let inf = ExactInfinity::default();
        // max x  s.t.  x - y <= 1,  x, y >= 0
        let mut lp = LinearProgram::new(ObjSense::Maximize);
        lp.add_col(Column::new(q(1), SparseVector::new(), q(0), inf.pos()))
            .unwrap();
        lp.add_col(Column::new(q(0), SparseVector::new(), q(0), inf.pos()))
            .unwrap();
        lp.add_row(Row::new(
            inf.neg(),
            SparseVector::from_entries([(0, q(1)), (1, q(-1))]),
            q(1),
        ))
        .unwrap();
        let out = solve_exact(&lp, &SolverParams::default()).unwrap();
        assert_eq!(out.status, Status::Unbounded);
        let ray = out.solution.primal_ray().unwrap();
        assert!(ray[0] > Rational::zero());
        let check = check_ray(&lp, ray, &inf).unwrap().unwrap();
        assert!(check.is_exact_proof());
    }

    #[test]
    fn empty_problem_reports_no_problem() {
        let lp = LinearProgram::<Rational>::new(ObjSense::Minimize);
        let out = solve_exact(&lp, &SolverParams::default()).unwrap();
        assert_eq!(out.status, Status::NoProblem);
    }

    #[test]
    fn scale_growth_is_capped() {
        let tiny = Rational::new(1.into(), pow2(200).to_integer());
        assert_eq!(next_scale(&tiny, &Rational::one(), 83), pow2(83));
        assert_eq!(next_scale(&q(4), &Rational::one(), 83), Rational::one());
        let quarter = Rational::new(1.into(), 4.into());
        assert_eq!(next_scale(&quarter, &Rational::one(), 83), pow2(2));
    }

    #[test]
    fn refinement_history_is_recorded() {
        let inf = ExactInfinity::default();
        let params = exact_params();
        let out = solve_exact(&small_max(&inf), &params).unwrap();
        assert_eq!(out.stats.history.len(), out.stats.refinements);
        assert!(out.stats.simplex_calls >= 1);
    }
}

#![forbid(unsafe_code)]

use irlp_algos::{
    solve_float_with, violations, ExactOutcome, IrError, IterativeRefinement, SimplexError,
    Violations,
};
use irlp_core::basis::BasisStatus;
use irlp_core::math::{CancelToken, LpNumber, Timer};
use irlp_core::options::{ParamError, SyncMode};
use irlp_core::problem::{
    ColHandle, Column, LinearProgram, ProblemError, ProblemResult, Row, RowHandle, SparseVector,
};
use irlp_core::rational::Rational;
use irlp_core::solution::Availability;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub use irlp_algos::{solve_exact, solve_float, FloatOutcome, Phase};
pub use irlp_core::options::SolverParams;
pub use irlp_core::problem::{ColId, ObjSense, RowId};
pub use irlp_core::solution::{Solution, Status};
pub use irlp_core::stats::SolveStats;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("problem validation failed: {0}")]
    InvalidProblem(#[from] ProblemError),
    #[error("invalid parameters: {0}")]
    InvalidParams(#[from] ParamError),
    #[error("floating-point solve failed: {0}")]
    Simplex(#[from] SimplexError),
    #[error("exact solve failed: {0}")]
    Refinement(#[from] IrError),
    #[error("the {0:?} problem was modified and not synchronized")]
    Unsynced(Authority),
    #[error("basis does not match a {rows}x{cols} problem")]
    InvalidBasis { rows: usize, cols: usize },
    #[error("no solution available")]
    NoSolution,
}

/// Which representation holds the latest modifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Authority {
    Real,
    Rational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncDirection {
    RealToRational,
    RationalToReal,
}

#[derive(Debug, Clone)]
enum LastSolve {
    Real {
        status: Status,
        solution: Solution<f64>,
        stats: SolveStats,
    },
    Exact {
        status: Status,
        solution: Solution<Rational>,
        stats: SolveStats,
    },
}

/// Owns a floating-point and a rational copy of one problem. Edits go to one copy, which
/// becomes authoritative; the other is only brought up to date by [`Solver::sync`]. Under
/// `SyncMode::Auto` the convenience edits are mirrored onto the real copy, and a stale copy
/// is synced before the solve that needs it.
pub struct Solver {
    params: SolverParams,
    real: LinearProgram<f64>,
    rational: LinearProgram<Rational>,
    authority: Authority,
    synced: bool,
    basis: Option<BasisStatus>,
    last: Option<LastSolve>,
    cancel: CancelToken,
    sync_time: Duration,
}

impl Solver {
    pub fn new(sense: ObjSense) -> Self {
        Self::from_rational(LinearProgram::new(sense))
    }

    pub fn from_rational(lp: LinearProgram<Rational>) -> Self {
        let params = SolverParams::default();
        Self {
            real: lp.to_real(params.infinity),
            rational: lp,
            params,
            authority: Authority::Rational,
            synced: true,
            basis: None,
            last: None,
            cancel: CancelToken::new(),
            sync_time: Duration::ZERO,
        }
    }

    pub fn from_real(lp: LinearProgram<f64>) -> Self {
        let mut solver = Self::from_rational(LinearProgram::new(lp.sense()));
        solver.rational = lp.to_rational(solver.params.infinity);
        solver.real = lp;
        solver.authority = Authority::Real;
        solver
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    pub fn set_params(&mut self, params: SolverParams) -> Result<(), SolverError> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    /// Token that stops a running solve at its next iteration boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn real_lp(&self) -> &LinearProgram<f64> {
        &self.real
    }

    pub fn rational_lp(&self) -> &LinearProgram<Rational> {
        &self.rational
    }

    pub fn num_rows(&self) -> usize {
        match self.authority {
            Authority::Real => self.real.num_rows(),
            Authority::Rational => self.rational.num_rows(),
        }
    }

    pub fn num_cols(&self) -> usize {
        match self.authority {
            Authority::Real => self.real.num_cols(),
            Authority::Rational => self.rational.num_cols(),
        }
    }

    /// Overwrites the non-authoritative copy with a conversion of the other one.
    pub fn sync(&mut self, direction: SyncDirection) {
        let timer = Timer::start();
        match direction {
            SyncDirection::RealToRational => {
                self.rational = self.real.to_rational(self.params.infinity);
                self.authority = Authority::Real;
            }
            SyncDirection::RationalToReal => {
                self.real = self.rational.to_real(self.params.infinity);
                self.authority = Authority::Rational;
            }
        }
        self.synced = true;
        self.sync_time += timer.elapsed();
        debug!(?direction, "problem representations synchronized");
    }

    /// Drops results and any stored basis that no longer fits the problem.
    fn invalidate(&mut self) {
        self.last = None;
        let (m, n) = (self.num_rows(), self.num_cols());
        if self.basis.as_ref().is_some_and(|b| !b.is_consistent(m, n)) {
            self.basis = None;
        }
    }

    /// Applies `edit` to the floating-point problem and makes it authoritative. The
    /// rational copy is stale until the next [`sync`](Self::sync); `SyncMode::Auto`
    /// performs it before the next exact solve.
    pub fn edit_real<T>(
        &mut self,
        edit: impl FnOnce(&mut LinearProgram<f64>) -> ProblemResult<T>,
    ) -> Result<T, SolverError> {
        let value = edit(&mut self.real)?;
        self.authority = Authority::Real;
        self.synced = false;
        self.invalidate();
        Ok(value)
    }

    /// Applies `edit` to the rational problem and makes it authoritative.
    pub fn edit_rational<T>(
        &mut self,
        edit: impl FnOnce(&mut LinearProgram<Rational>) -> ProblemResult<T>,
    ) -> Result<T, SolverError> {
        let value = edit(&mut self.rational)?;
        self.authority = Authority::Rational;
        self.synced = false;
        self.invalidate();
        Ok(value)
    }

    /// Applies one edit to the rational problem and, while both copies agree and
    /// `SyncMode::Auto` is set, the same edit with rounded values to the real one.
    fn edit_both<T>(
        &mut self,
        exact: impl FnOnce(&mut LinearProgram<Rational>) -> ProblemResult<T>,
        rounded: impl FnOnce(&mut LinearProgram<f64>) -> ProblemResult<()>,
    ) -> Result<T, SolverError> {
        let mirror = self.synced && self.params.sync_mode == SyncMode::Auto;
        let value = self.edit_rational(exact)?;
        if mirror {
            self.synced = rounded(&mut self.real).is_ok();
        }
        Ok(value)
    }

    pub fn set_sense(&mut self, sense: ObjSense) -> Result<(), SolverError> {
        self.edit_both(
            |lp| {
                lp.set_sense(sense);
                Ok(())
            },
            |lp| {
                lp.set_sense(sense);
                Ok(())
            },
        )
    }

    pub fn add_row(&mut self, row: Row<Rational>) -> Result<RowId, SolverError> {
        let rounded = real_row(&row, self.params.infinity);
        self.edit_both(|lp| lp.add_row(row), |lp| lp.add_row(rounded).map(drop))
    }

    pub fn add_col(&mut self, col: Column<Rational>) -> Result<ColId, SolverError> {
        let rounded = real_col(&col, self.params.infinity);
        self.edit_both(|lp| lp.add_col(col), |lp| lp.add_col(rounded).map(drop))
    }

    pub fn change_range(
        &mut self,
        row: impl RowHandle,
        lhs: Rational,
        rhs: Rational,
    ) -> Result<(), SolverError> {
        let (lo, hi) = (real(&lhs, self.params.infinity), real(&rhs, self.params.infinity));
        self.edit_both(
            |lp| lp.change_range(&row, lhs, rhs),
            |lp| lp.change_range(&row, lo, hi),
        )
    }

    pub fn change_bounds(
        &mut self,
        col: impl ColHandle,
        lower: Rational,
        upper: Rational,
    ) -> Result<(), SolverError> {
        let (lo, up) = (real(&lower, self.params.infinity), real(&upper, self.params.infinity));
        self.edit_both(
            |lp| lp.change_bounds(&col, lower, upper),
            |lp| lp.change_bounds(&col, lo, up),
        )
    }

    pub fn change_obj(&mut self, col: impl ColHandle, obj: Rational) -> Result<(), SolverError> {
        let rounded = real(&obj, self.params.infinity);
        self.edit_both(|lp| lp.change_obj(&col, obj), |lp| lp.change_obj(&col, rounded))
    }

    pub fn change_element(
        &mut self,
        row: impl RowHandle,
        col: impl ColHandle,
        value: Rational,
    ) -> Result<(), SolverError> {
        let rounded = real(&value, self.params.infinity);
        self.edit_both(
            |lp| lp.change_element(&row, &col, value),
            |lp| lp.change_element(&row, &col, rounded),
        )
    }

    pub fn remove_row(&mut self, row: impl RowHandle) -> Result<Vec<Option<usize>>, SolverError> {
        self.edit_both(|lp| lp.remove_row(&row), |lp| lp.remove_row(&row).map(drop))
    }

    pub fn remove_col(&mut self, col: impl ColHandle) -> Result<Vec<Option<usize>>, SolverError> {
        self.edit_both(|lp| lp.remove_col(&col), |lp| lp.remove_col(&col).map(drop))
    }

    pub fn remove_rows<H: RowHandle>(
        &mut self,
        rows: &[H],
    ) -> Result<Vec<Option<usize>>, SolverError> {
        self.edit_both(|lp| lp.remove_rows(rows), |lp| lp.remove_rows(rows).map(drop))
    }

    pub fn remove_row_range(
        &mut self,
        range: Range<usize>,
    ) -> Result<Vec<Option<usize>>, SolverError> {
        let mirrored = range.clone();
        self.edit_both(
            |lp| lp.remove_row_range(range),
            |lp| lp.remove_row_range(mirrored).map(drop),
        )
    }

    pub fn remove_col_range(
        &mut self,
        range: Range<usize>,
    ) -> Result<Vec<Option<usize>>, SolverError> {
        let mirrored = range.clone();
        self.edit_both(
            |lp| lp.remove_col_range(range),
            |lp| lp.remove_col_range(mirrored).map(drop),
        )
    }

    pub fn clear(&mut self) -> Result<(), SolverError> {
        self.basis = None;
        self.edit_both(
            |lp| {
                lp.clear();
                Ok(())
            },
            |lp| {
                lp.clear();
                Ok(())
            },
        )
    }

    pub fn basis(&self) -> Option<&BasisStatus> {
        self.basis.as_ref()
    }

    pub fn set_basis(&mut self, basis: BasisStatus) -> Result<(), SolverError> {
        let (rows, cols) = (self.num_rows(), self.num_cols());
        if !basis.is_consistent(rows, cols) {
            return Err(SolverError::InvalidBasis { rows, cols });
        }
        self.basis = Some(basis);
        Ok(())
    }

    fn ensure_current(&mut self, needed: Authority) -> Result<(), SolverError> {
        if self.synced || self.authority == needed {
            return Ok(());
        }
        match self.params.sync_mode {
            SyncMode::Auto => {
                self.sync(match needed {
                    Authority::Real => SyncDirection::RationalToReal,
                    Authority::Rational => SyncDirection::RealToRational,
                });
                Ok(())
            }
            SyncMode::Manual => Err(SolverError::Unsynced(self.authority)),
        }
    }

    /// Floating-point solve of the real problem, warm-started from the stored basis.
    pub fn solve_real(&mut self) -> Result<Status, SolverError> {
        self.ensure_current(Authority::Real)?;
        let outcome = solve_float_with(
            &self.real,
            self.basis.as_ref(),
            &self.params,
            Some(&self.cancel),
        )?;
        let mut stats = SolveStats::new();
        stats.record_simplex(&outcome.stats);
        stats.solve_time = outcome.stats.solve_time;
        stats.sync_time = self.sync_time;
        if outcome.basis.is_some() {
            self.basis = outcome.basis;
        }
        self.last = Some(LastSolve::Real {
            status: outcome.status,
            solution: outcome.solution,
            stats,
        });
        Ok(outcome.status)
    }

    /// Exact solve of the rational problem by iterative refinement.
    pub fn solve_exact(&mut self) -> Result<Status, SolverError> {
        self.ensure_current(Authority::Rational)?;
        let mut ir = IterativeRefinement::new(&self.params).with_cancel(&self.cancel);
        if let Some(basis) = &self.basis {
            ir = ir.with_basis(basis.clone());
        }
        let ExactOutcome {
            status,
            solution,
            basis,
            mut stats,
        } = ir.solve(&self.rational)?;
        stats.sync_time = self.sync_time;
        if basis.is_some() {
            self.basis = basis;
        }
        self.last = Some(LastSolve::Exact {
            status,
            solution,
            stats,
        });
        Ok(status)
    }

    pub fn status(&self) -> Status {
        match &self.last {
            Some(LastSolve::Real { status, .. } | LastSolve::Exact { status, .. }) => *status,
            None => Status::NoProblem,
        }
    }

    pub fn stats(&self) -> Option<&SolveStats> {
        match &self.last {
            Some(LastSolve::Real { stats, .. } | LastSolve::Exact { stats, .. }) => Some(stats),
            None => None,
        }
    }

    pub fn availability(&self) -> Availability {
        match &self.last {
            Some(LastSolve::Real { solution, .. }) => solution.availability(),
            Some(LastSolve::Exact { solution, .. }) => solution.availability(),
            None => Availability::empty(),
        }
    }

    /// The last solution in floating point, rounded if it was computed exactly.
    pub fn solution_real(&self) -> Option<Solution<f64>> {
        let infinity = self.params.infinity;
        match &self.last {
            Some(LastSolve::Real { solution, .. }) => Some(solution.clone()),
            Some(LastSolve::Exact { solution, .. }) => {
                Some(solution.clone().map(|v| v.to_real(infinity)))
            }
            None => None,
        }
    }

    /// The last solution in rational numbers; a floating-point result converts exactly.
    pub fn solution_rational(&self) -> Option<Solution<Rational>> {
        let infinity = self.params.infinity;
        match &self.last {
            Some(LastSolve::Real { solution, .. }) => {
                Some(solution.clone().map(|v| Rational::from_real(v, infinity)))
            }
            Some(LastSolve::Exact { solution, .. }) => Some(solution.clone()),
            None => None,
        }
    }

    pub fn objective_real(&self) -> Option<f64> {
        self.solution_real().and_then(|s| s.objective)
    }

    pub fn objective_rational(&self) -> Option<Rational> {
        self.solution_rational().and_then(|s| s.objective)
    }

    /// Exact violations of the last primal/dual pair against the rational problem.
    pub fn violations(&self) -> Result<Violations, SolverError> {
        let solution = self.solution_rational().ok_or(SolverError::NoSolution)?;
        let (Some(x), Some(y)) = (solution.primal(), solution.dual()) else {
            return Err(SolverError::NoSolution);
        };
        Ok(violations(&self.rational, x, y)?)
    }
}

fn real(value: &Rational, infinity: f64) -> f64 {
    value.to_real(infinity)
}

fn real_row(row: &Row<Rational>, infinity: f64) -> Row<f64> {
    Row::new(
        real(&row.lhs, infinity),
        row.coeffs.map(|v| real(v, infinity)),
        real(&row.rhs, infinity),
    )
}

fn real_col(col: &Column<Rational>, infinity: f64) -> Column<f64> {
    Column::new(
        real(&col.obj, infinity),
        col.coeffs.map(|v| real(v, infinity)),
        real(&col.lower, infinity),
        real(&col.upper, infinity),
    )
}

impl Default for Solver {
    fn default() -> Self {
        Self::new(ObjSense::Minimize)
    }
}

/// Column-first builder of a [`LinearProgram`].
#[derive(Debug, Clone)]
pub struct LpBuilder<N: LpNumber> {
    sense: ObjSense,
    offset: Option<N>,
    cols: Vec<(N, N, N)>,
    rows: Vec<(N, Vec<(usize, N)>, N)>,
}

impl<N: LpNumber> LpBuilder<N> {
    pub fn new(sense: ObjSense) -> Self {
        Self {
            sense,
            offset: None,
            cols: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn offset(mut self, offset: N) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn col(mut self, obj: N, lower: N, upper: N) -> Self {
        self.cols.push((obj, lower, upper));
        self
    }

    /// `lhs <= sum coef * x_j <= rhs` over `(j, coef)` entries.
    pub fn row(mut self, lhs: N, entries: impl IntoIterator<Item = (usize, N)>, rhs: N) -> Self {
        self.rows.push((lhs, entries.into_iter().collect(), rhs));
        self
    }

    pub fn build(self) -> Result<LinearProgram<N>, SolverError> {
        let mut lp = LinearProgram::new(self.sense);
        if let Some(offset) = self.offset {
            lp.set_obj_offset(offset);
        }
        for (obj, lower, upper) in self.cols {
            lp.add_col(Column::new(obj, SparseVector::new(), lower, upper))?;
        }
        for (lhs, entries, rhs) in self.rows {
            lp.add_row(Row::new(lhs, SparseVector::from_entries(entries), rhs))?;
        }
        lp.validate()?;
        Ok(lp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irlp_core::rational::{rational_from_int, ExactInfinity};

    fn q(v: i64) -> Rational {
        rational_from_int(v)
    }

    fn two_var_max() -> LinearProgram<Rational> {
        let inf = ExactInfinity::default();
        LpBuilder::new(ObjSense::Maximize)
            .col(q(1), q(0), inf.pos())
            .col(q(1), q(0), inf.pos())
            .row(inf.neg(), [(0, q(1)), (1, q(1))], q(10))
            .build()
            .unwrap()
    }

    #[test]
    fn exact_and_real_solves_agree() {
        let mut solver = Solver::from_rational(two_var_max());
        assert_eq!(solver.solve_exact().unwrap(), Status::Optimal);
        assert_eq!(solver.objective_rational(), Some(q(10)));
        assert_eq!(solver.solve_real().unwrap(), Status::Optimal);
        let obj = solver.objective_real().unwrap();
        assert!((obj - 10.0).abs() <= 1e-9);
        let check = solver.violations().unwrap();
        assert!(check.within(&solver.params().feastol, &solver.params().opttol));
    }

    #[test]
    fn removing_all_rows_leaves_none() {
        let mut solver = Solver::from_rational(two_var_max());
        solver.remove_row_range(0..1).unwrap();
        assert_eq!(solver.num_rows(), 0);
        assert_eq!(solver.real_lp().num_rows(), 0);
    }

    #[test]
    fn manual_sync_is_required_before_solving() {
        let mut solver = Solver::from_rational(two_var_max());
        let params = SolverParams {
            sync_mode: SyncMode::Manual,
            ..SolverParams::default()
        };
        solver.set_params(params).unwrap();
        solver.change_obj(0, q(2)).unwrap();
        assert!(!solver.is_synced());
        assert!(matches!(
            solver.solve_real(),
            Err(SolverError::Unsynced(Authority::Rational))
        ));
        solver.sync(SyncDirection::RationalToReal);
        assert_eq!(solver.solve_real().unwrap(), Status::Optimal);
        assert!((solver.objective_real().unwrap() - 20.0).abs() <= 1e-9);
    }

    #[test]
    fn ids_survive_removal() {
        let inf = ExactInfinity::default();
        let mut solver = Solver::new(ObjSense::Minimize);
        let cols: Vec<ColId> = (1..=3)
            .map(|v| {
                solver
                    .add_col(Column::new(q(v), SparseVector::new(), q(0), inf.pos()))
                    .unwrap()
            })
            .collect();
        solver.remove_col(cols[1]).unwrap();
        assert_eq!(*solver.rational_lp().obj(cols[0]).unwrap(), q(1));
        assert_eq!(*solver.rational_lp().obj(cols[2]).unwrap(), q(3));
        assert_eq!(solver.real_lp().obj(cols[2]).unwrap(), &3.0);
        assert!(solver.rational_lp().obj(cols[1]).is_err());
    }

    #[test]
    fn rejects_basis_of_wrong_shape() {
        let mut solver = Solver::from_rational(two_var_max());
        let err = solver.set_basis(BasisStatus::default()).unwrap_err();
        assert!(matches!(err, SolverError::InvalidBasis { rows: 1, cols: 2 }));
    }

    #[test]
    fn failed_edit_leaves_problem_untouched() {
        let mut solver = Solver::from_rational(two_var_max());
        let bad = Row::new(q(0), SparseVector::from_entries([(5, q(1))]), q(1));
        assert!(solver.add_row(bad).is_err());
        assert_eq!(solver.num_rows(), 1);
        assert!(solver.is_synced());
    }

    #[test]
    fn auto_mode_mirrors_edits_onto_real_copy() {
        let mut solver = Solver::from_rational(two_var_max());
        let row = solver
            .add_row(Row::new(q(0), SparseVector::from_entries([(0, q(1))]), q(3)))
            .unwrap();
        solver.change_obj(1, q(2)).unwrap();
        solver.change_element(row, 1usize, q(4)).unwrap();
        assert!(solver.is_synced());
        assert_eq!(solver.real_lp().num_rows(), 2);
        assert_eq!(solver.real_lp().obj(1usize).unwrap(), &2.0);
        assert_eq!(solver.real_lp().coefficient(row, 1usize).unwrap(), 4.0);
        assert_eq!(solver.real_lp().row_ids(), solver.rational_lp().row_ids());
    }

    #[test]
    fn real_edit_is_synced_before_exact_solve() {
        let mut solver = Solver::from_rational(two_var_max());
        solver.edit_real(|lp| lp.change_rhs(0usize, 6.0)).unwrap();
        assert!(!solver.is_synced());
        assert_eq!(solver.authority(), Authority::Real);
        assert_eq!(solver.solve_exact().unwrap(), Status::Optimal);
        assert!(solver.is_synced());
        assert_eq!(solver.objective_rational(), Some(q(6)));
    }

    #[test]
    fn builder_rejects_unknown_columns() {
        let result = LpBuilder::new(ObjSense::Minimize)
            .col(0.0, 0.0, 1.0)
            .row(0.0, [(3, 1.0)], 1.0)
            .build();
        assert!(matches!(result, Err(SolverError::InvalidProblem(_))));
    }
}

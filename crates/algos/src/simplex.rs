use crate::pricing::{
    AnyPricer, DualPivot, EdgeNorms, PartialWindow, Pricer, PricingMode, PrimalPivot,
};
use crate::ratio::{
    AnyRatioTester, DualCandidate, DualRatioInput, DualStep, PrimalRatioInput, PrimalStep,
    RatioTester,
};
use crate::starter::{nonbasic_status, slack_basis, AnyStarter, Starter};
use irlp_core::basis::{BasisStatus, VarStatus};
use irlp_core::math::{CancelToken, Timer};
use irlp_core::options::{Algorithm, ParamError, Representation, SolverParams, Verbosity};
use irlp_core::problem::{LinearProgram, ObjSense, ProblemError};
use irlp_core::solution::{DualPart, PrimalPart, Solution, Status};
use irlp_core::stats::SimplexStats;
use irlp_linsys::{BasisFactor, FactorError, SparseColumn};
use sprs::CsMat;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Error)]
pub enum SimplexError {
    #[error("invalid problem: {0}")]
    Problem(#[from] ProblemError),
    #[error("invalid parameters: {0}")]
    Params(#[from] ParamError),
    #[error("basis factorization failed: {0}")]
    Factor(#[from] FactorError),
}

/// Result of one floating-point solve, in the coordinates of the problem that was passed in.
#[derive(Debug, Clone)]
pub struct FloatOutcome {
    pub status: Status,
    pub solution: Solution<f64>,
    pub basis: Option<BasisStatus>,
    pub stats: SimplexStats,
}

impl FloatOutcome {
    fn without_basis(status: Status, solution: Solution<f64>) -> Self {
        Self {
            status,
            solution,
            basis: None,
            stats: SimplexStats::default(),
        }
    }
}

const MAX_PASSES: usize = 6;
const MAX_RESTARTS: usize = 2;
const REFRESH_INTERVAL: usize = 100;
const MAX_PIVOT_RETRIES: usize = 3;

enum RunEnd {
    Optimal,
    Unbounded {
        var: usize,
        direction: f64,
        column: Vec<f64>,
    },
    Infeasible {
        farkas: Vec<f64>,
    },
    Restarted,
    Stopped(Status),
}

/// Bounded-variable revised simplex on `[A | -I]`.
///
/// The engine borrows the problem for one [`solve`](Self::solve) call and returns owned
/// results. Which of the primal and dual algorithms runs first follows the configured
/// algorithm and representation; a final primal pass always cleans up.
pub struct SimplexEngine<'a> {
    params: &'a SolverParams,
    cancel: Option<&'a CancelToken>,
    max_passes: usize,
}

impl<'a> SimplexEngine<'a> {
    pub fn new(params: &'a SolverParams) -> Self {
        Self {
            params,
            cancel: None,
            max_passes: MAX_PASSES,
        }
    }

    /// Caps the number of phase passes before the final optimality check.
    pub fn with_max_passes(mut self, passes: usize) -> Self {
        self.max_passes = passes;
        self
    }

    pub fn with_cancel(mut self, token: &'a CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn solve(
        &self,
        lp: &LinearProgram<f64>,
        basis: Option<&BasisStatus>,
    ) -> Result<FloatOutcome, SimplexError> {
        if let Some(outcome) = crossing_bounds(lp) {
            return Ok(outcome);
        }
        let mut ws = Workspace::new(lp, self.params, self.cancel, basis)?;
        ws.max_passes = self.max_passes;
        let end = match ws.initial {
            true => ws.run()?,
            false => RunEnd::Stopped(Status::Singular),
        };
        Ok(ws.finish(end))
    }
}

/// Bounds that cross make the problem infeasible before any pivot: a column needs
/// no multiplier at all, a row needs its own.
fn crossing_bounds(lp: &LinearProgram<f64>) -> Option<FloatOutcome> {
    let m = lp.num_rows();
    let farkas = if lp.cols().any(|(_, c)| c.lower > c.upper) {
        vec![0.0; m]
    } else {
        let i = lp.rows().position(|(_, r)| r.lhs > r.rhs)?;
        let mut y = vec![0.0; m];
        y[i] = 1.0;
        y
    };
    let solution = Solution {
        dual: DualPart::Farkas(farkas),
        ..Solution::empty()
    };
    Some(FloatOutcome::without_basis(Status::Infeasible, solution))
}

fn column_of(csc: &CsMat<f64>, n: usize, var: usize) -> SparseColumn {
    if var < n {
        csc.outer_view(var)
            .map(|col| col.iter().map(|(i, &v)| (i, v)).collect())
            .unwrap_or_default()
    } else {
        vec![(var - n, -1.0)]
    }
}

fn nonbasic_value(status: VarStatus, lower: f64, upper: f64) -> f64 {
    match status {
        VarStatus::OnLower | VarStatus::Fixed => lower,
        VarStatus::OnUpper => upper,
        VarStatus::Zero | VarStatus::Basic => 0.0,
    }
}

/// Keeps a requested nonbasic status only where its bound exists.
fn normalize_status(status: VarStatus, lower: f64, upper: f64) -> VarStatus {
    match status {
        VarStatus::Basic => VarStatus::Basic,
        VarStatus::OnLower if lower.is_finite() && lower != upper => VarStatus::OnLower,
        VarStatus::OnUpper if upper.is_finite() && lower != upper => VarStatus::OnUpper,
        VarStatus::Zero if !lower.is_finite() && !upper.is_finite() => VarStatus::Zero,
        _ => nonbasic_status(lower, upper),
    }
}

struct NormView<'b> {
    factor: &'b BasisFactor,
    csc: &'b CsMat<f64>,
    n: usize,
    nonbasic: &'b [usize],
}

impl EdgeNorms for NormView<'_> {
    fn primal_norm_sq(&self, slot: usize) -> f64 {
        let mut rhs = vec![0.0; self.factor.dim()];
        for (i, v) in column_of(self.csc, self.n, self.nonbasic[slot]) {
            rhs[i] += v;
        }
        self.factor.solve(&mut rhs);
        1.0 + rhs.iter().map(|v| v * v).sum::<f64>()
    }

    fn dual_norm_sq(&self, position: usize) -> f64 {
        let mut rhs = vec![0.0; self.factor.dim()];
        rhs[position] = 1.0;
        self.factor.solve_transpose(&mut rhs);
        rhs.iter().map(|v| v * v).sum()
    }
}

struct Workspace<'a> {
    lp: &'a LinearProgram<f64>,
    params: &'a SolverParams,
    cancel: Option<&'a CancelToken>,
    m: usize,
    n: usize,
    sign: f64,
    csc: CsMat<f64>,
    csr: CsMat<f64>,
    /// Minimized objective over structurals and logicals.
    obj: Vec<f64>,
    /// Objective of the running phase.
    cost: Vec<f64>,
    orig_lower: Vec<f64>,
    orig_upper: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    x: Vec<f64>,
    status: Vec<VarStatus>,
    /// Basis position of a basic variable, nonbasic slot otherwise.
    index: Vec<usize>,
    basic: Vec<usize>,
    nonbasic: Vec<usize>,
    /// Reduced costs by nonbasic slot.
    d: Vec<f64>,
    factor: BasisFactor,
    pricer: AnyPricer,
    partial: Option<PartialWindow>,
    tester: AnyRatioTester,
    starter: AnyStarter,
    stats: SimplexStats,
    timer: Timer,
    restarts: usize,
    since_refresh: usize,
    iteration_cap: usize,
    max_passes: usize,
    initial: bool,
}

impl<'a> Workspace<'a> {
    fn new(
        lp: &'a LinearProgram<f64>,
        params: &'a SolverParams,
        cancel: Option<&'a CancelToken>,
        basis: Option<&BasisStatus>,
    ) -> Result<Self, SimplexError> {
        let (m, n) = (lp.num_rows(), lp.num_cols());
        let sign = lp.sense().sign();
        let csc = lp.to_csmat();
        let csr = csc.to_csr();
        let mut obj = vec![0.0; n + m];
        let mut lower = Vec::with_capacity(n + m);
        let mut upper = Vec::with_capacity(n + m);
        for (j, (_, col)) in lp.cols().enumerate() {
            obj[j] = sign * col.obj;
            lower.push(col.lower);
            upper.push(col.upper);
        }
        for (_, row) in lp.rows() {
            lower.push(row.lhs);
            upper.push(row.rhs);
        }
        let factor = BasisFactor::factorize(
            &[],
            params.factor_update,
            params.epsilon_factorization,
            params.epsilon_update,
        )?;
        let mut ws = Self {
            lp,
            params,
            cancel,
            m,
            n,
            sign,
            csc,
            csr,
            cost: obj.clone(),
            obj,
            orig_lower: lower.clone(),
            orig_upper: upper.clone(),
            lower,
            upper,
            x: vec![0.0; n + m],
            status: vec![VarStatus::Basic; n + m],
            index: vec![0; n + m],
            basic: Vec::with_capacity(m),
            nonbasic: Vec::with_capacity(n),
            d: Vec::with_capacity(n),
            factor,
            pricer: AnyPricer::from_params(params, m, n, lp.num_nonzeros()),
            partial: params
                .partial_pricing
                .then(|| PartialWindow::new(params.partial_pricing_size)),
            tester: AnyRatioTester::from_kind(params.ratio_tester),
            starter: AnyStarter::from_kind(params.starter),
            stats: SimplexStats::default(),
            timer: Timer::start(),
            restarts: 0,
            since_refresh: 0,
            iteration_cap: params.iter_limit.unwrap_or(50 * (n + m) + 10_000),
            max_passes: MAX_PASSES,
            initial: false,
        };
        let start = match basis {
            Some(b) if b.is_consistent(m, n) => b.clone(),
            Some(_) => {
                if params.verbosity.allows(Verbosity::Warning) {
                    warn!(rows = m, cols = n, "ignoring starting basis of wrong shape");
                }
                ws.starter.start(lp, None)
            }
            None => ws.starter.start(lp, None),
        };
        ws.initial = ws.install(&start)? || ws.restart()?;
        if params.verbosity.allows(Verbosity::Normal) {
            info!(
                rows = m,
                cols = n,
                pricer = ws.pricer.name(),
                ratio_tester = ws.tester.name(),
                "simplex start"
            );
        }
        Ok(ws)
    }

    fn column(&self, var: usize) -> SparseColumn {
        column_of(&self.csc, self.n, var)
    }

    fn col_dot(&self, var: usize, y: &[f64]) -> f64 {
        if var < self.n {
            self.csc
                .outer_view(var)
                .map(|col| col.iter().map(|(i, &v)| v * y[i]).sum())
                .unwrap_or(0.0)
        } else {
            -y[var - self.n]
        }
    }

    /// Loads `basis`; `false` when its matrix is singular.
    fn install(&mut self, basis: &BasisStatus) -> Result<bool, SimplexError> {
        self.basic.clear();
        self.nonbasic.clear();
        let statuses = basis.cols.iter().chain(basis.rows.iter());
        for (v, &requested) in statuses.enumerate() {
            let status = normalize_status(requested, self.lower[v], self.upper[v]);
            self.status[v] = status;
            if status.is_basic() {
                self.index[v] = self.basic.len();
                self.basic.push(v);
            } else {
                self.index[v] = self.nonbasic.len();
                self.nonbasic.push(v);
                self.x[v] = nonbasic_value(status, self.lower[v], self.upper[v]);
            }
        }
        self.d = vec![0.0; self.nonbasic.len()];
        if self.basic.len() != self.m {
            return Ok(false);
        }
        self.refactor()
    }

    fn restart(&mut self) -> Result<bool, SimplexError> {
        loop {
            self.restarts += 1;
            self.stats.restarts += 1;
            if self.restarts > MAX_RESTARTS {
                return Ok(false);
            }
            self.lower.clone_from(&self.orig_lower);
            self.upper.clone_from(&self.orig_upper);
            self.cost.clone_from(&self.obj);
            let basis = if self.restarts == 1 {
                let hint = self.x[..self.n].to_vec();
                self.starter.start(self.lp, Some(&hint))
            } else {
                slack_basis(self.lp)
            };
            if self.params.verbosity.allows(Verbosity::Warning) {
                warn!(restart = self.restarts, "singular basis, restarting");
            }
            if self.install(&basis)? {
                return Ok(true);
            }
        }
    }

    fn recover(&mut self) -> Result<RunEnd, SimplexError> {
        Ok(if self.restart()? {
            RunEnd::Restarted
        } else {
            RunEnd::Stopped(Status::Singular)
        })
    }

    fn refactor(&mut self) -> Result<bool, SimplexError> {
        let columns: Vec<SparseColumn> = self.basic.iter().map(|&v| self.column(v)).collect();
        match BasisFactor::factorize(
            &columns,
            self.params.factor_update,
            self.params.epsilon_factorization,
            self.params.epsilon_update,
        ) {
            Ok(factor) => {
                self.factor = factor;
                self.stats.factorizations += 1;
                self.refresh_values();
                Ok(true)
            }
            Err(FactorError::Singular { column }) => {
                debug!(position = column, "basis factorization is singular");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn refresh_values(&mut self) {
        self.compute_basic_values();
        self.compute_reduced_costs();
        self.since_refresh = 0;
    }

    /// `x_B = -B^-1 N x_N`.
    fn compute_basic_values(&mut self) {
        let mut rhs = vec![0.0; self.m];
        for &v in &self.nonbasic {
            let value = self.x[v];
            if value != 0.0 {
                for (i, a) in self.column(v) {
                    rhs[i] += a * value;
                }
            }
        }
        self.factor.solve(&mut rhs);
        self.stats.linear_solves += 1;
        for (p, &v) in self.basic.iter().enumerate() {
            self.x[v] = -rhs[p];
        }
    }

    /// Row multipliers `B^-T c_B` of the running phase.
    fn multipliers(&mut self, cost: &[f64]) -> Vec<f64> {
        let mut pi: Vec<f64> = self.basic.iter().map(|&v| cost[v]).collect();
        self.factor.solve_transpose(&mut pi);
        self.stats.linear_solves += 1;
        pi
    }

    fn compute_reduced_costs(&mut self) {
        let cost = std::mem::take(&mut self.cost);
        let pi = self.multipliers(&cost);
        let d: Vec<f64> = self
            .nonbasic
            .iter()
            .map(|&v| cost[v] - self.col_dot(v, &pi))
            .collect();
        self.cost = cost;
        self.d = d;
    }

    fn ftran(&mut self, var: usize) -> Vec<f64> {
        let mut rhs = vec![0.0; self.m];
        for (i, a) in self.column(var) {
            rhs[i] += a;
        }
        self.factor.solve(&mut rhs);
        self.stats.linear_solves += 1;
        rhs
    }

    /// Row `position` of `B^-1`, indexed by constraint row.
    fn btran_unit(&mut self, position: usize) -> Vec<f64> {
        let mut rhs = vec![0.0; self.m];
        rhs[position] = 1.0;
        self.factor.solve_transpose(&mut rhs);
        self.stats.linear_solves += 1;
        rhs
    }

    /// `rho^T a_j` for every nonbasic slot with a nonzero result.
    fn pivot_row(&self, rho: &[f64]) -> Vec<(usize, f64)> {
        let mut acc = vec![0.0; self.nonbasic.len()];
        for (i, &r) in rho.iter().enumerate() {
            if r == 0.0 {
                continue;
            }
            if let Some(row) = self.csr.outer_view(i) {
                for (j, &a) in row.iter() {
                    if !self.status[j].is_basic() {
                        acc[self.index[j]] += a * r;
                    }
                }
            }
            let logical = self.n + i;
            if !self.status[logical].is_basic() {
                acc[self.index[logical]] -= r;
            }
        }
        acc.into_iter()
            .enumerate()
            .filter(|(_, v)| v.abs() > self.params.epsilon_zero)
            .collect()
    }

    fn primal_infeasibilities(&self) -> Vec<(usize, f64)> {
        let tol = self.params.fp_feastol;
        self.basic
            .iter()
            .enumerate()
            .filter_map(|(p, &v)| {
                let viol = (self.lower[v] - self.x[v]).max(self.x[v] - self.upper[v]);
                (viol > tol).then_some((p, viol))
            })
            .collect()
    }

    fn dual_infeasibilities(&self) -> Vec<(usize, f64)> {
        let tol = self.params.fp_opttol;
        self.nonbasic
            .iter()
            .enumerate()
            .filter_map(|(slot, &v)| {
                let d = self.d[slot];
                let viol = match self.status[v] {
                    VarStatus::OnLower => -d,
                    VarStatus::OnUpper => d,
                    VarStatus::Zero => d.abs(),
                    VarStatus::Fixed | VarStatus::Basic => 0.0,
                };
                (viol > tol).then_some((slot, viol))
            })
            .collect()
    }

    fn bound_status(&self, var: usize, to_upper: bool) -> VarStatus {
        if self.lower[var] == self.upper[var] {
            VarStatus::Fixed
        } else if to_upper {
            VarStatus::OnUpper
        } else {
            VarStatus::OnLower
        }
    }

    fn move_nonbasic(&mut self, var: usize, delta: f64, alpha: &[f64]) {
        self.x[var] += delta;
        for (p, &a) in alpha.iter().enumerate() {
            if a != 0.0 {
                self.x[self.basic[p]] -= delta * a;
            }
        }
    }

    fn internal_objective(&self) -> f64 {
        self.obj.iter().zip(&self.x).map(|(c, x)| c * x).sum()
    }

    /// The dual bound has crossed the objective limit in the direction of the optimum.
    fn objective_limit_reached(&self) -> bool {
        let value = self.sign * self.internal_objective() + *self.lp.obj_offset();
        match self.lp.sense() {
            ObjSense::Minimize => self.params.obj_limit_upper.is_some_and(|limit| value >= limit),
            ObjSense::Maximize => self.params.obj_limit_lower.is_some_and(|limit| value <= limit),
        }
    }

    fn limit_reached(&self) -> Option<Status> {
        if self.cancel.is_some_and(|c| c.is_cancelled()) {
            return Some(Status::AbortTime);
        }
        if let Some(limit) = self.params.time_limit {
            if self.timer.elapsed() >= limit {
                return Some(Status::AbortTime);
            }
        }
        if self.stats.iterations >= self.iteration_cap {
            if self.params.iter_limit.is_none() && self.params.verbosity.allows(Verbosity::Warning)
            {
                warn!(iterations = self.stats.iterations, "iteration safeguard reached");
            }
            return Some(Status::AbortIter);
        }
        None
    }

    fn log_progress(&self, algorithm: &str) {
        let freq = self.params.display_freq;
        if freq > 0
            && self.stats.iterations % freq == 0
            && self.params.verbosity.allows(Verbosity::High)
        {
            debug!(
                algorithm,
                iteration = self.stats.iterations,
                objective = self.sign * self.internal_objective(),
                primal_infeasible = self.primal_infeasibilities().len(),
                "simplex progress"
            );
        }
    }

    fn setup_pricer(&mut self, mode: PricingMode) {
        let norms = NormView {
            factor: &self.factor,
            csc: &self.csc,
            n: self.n,
            nonbasic: &self.nonbasic,
        };
        self.pricer.setup(mode, self.m, self.nonbasic.len(), &norms);
        if let Some(window) = &mut self.partial {
            window.reset();
        }
    }

    /// Swaps `entering` (nonbasic `slot`) into basis `position` and updates the factorization.
    fn replace(
        &mut self,
        position: usize,
        slot: usize,
        entering: usize,
        leaving_status: VarStatus,
        alpha: &[f64],
    ) -> Result<bool, SimplexError> {
        let leaving = self.basic[position];
        self.basic[position] = entering;
        self.nonbasic[slot] = leaving;
        self.status[entering] = VarStatus::Basic;
        self.index[entering] = position;
        self.status[leaving] = leaving_status;
        self.index[leaving] = slot;
        self.stats.iterations += 1;
        self.since_refresh += 1;
        trace!(entering, leaving, position, "pivot");
        let column = self.column(entering);
        let refactor = match self.factor.update(position, &column, alpha) {
            Ok(()) => {
                self.stats.updates += 1;
                self.factor.num_updates() >= self.params.factor_update_max
            }
            Err(FactorError::Unstable { pivot }) => {
                debug!(pivot, "unstable factor update");
                true
            }
            Err(err) => return Err(err.into()),
        };
        if refactor {
            return self.refactor();
        }
        if self.since_refresh >= REFRESH_INTERVAL {
            self.refresh_values();
        }
        Ok(true)
    }

    fn run(&mut self) -> Result<RunEnd, SimplexError> {
        let primal_first = matches!(
            (self.params.representation, self.params.algorithm),
            (Representation::Column, Algorithm::Enter) | (Representation::Row, Algorithm::Leave)
        );
        let mut passes = 0;
        while passes < self.max_passes + self.restarts {
            passes += 1;
            if self.factor.num_updates() > 0 {
                if !self.refactor()? {
                    match self.recover()? {
                        RunEnd::Restarted => continue,
                        other => return Ok(other),
                    }
                }
            } else {
                self.refresh_values();
            }
            let primal_feasible = self.primal_infeasibilities().is_empty();
            let dual_feasible = self.dual_infeasibilities().is_empty();
            if primal_feasible && dual_feasible {
                return Ok(RunEnd::Optimal);
            }
            let end = if primal_feasible {
                self.primal_run()?
            } else if dual_feasible {
                self.dual_run(true)?
            } else if primal_first {
                self.shifted_primal()?
            } else {
                self.artificial_dual()?
            };
            match end {
                RunEnd::Optimal | RunEnd::Restarted => continue,
                other => return Ok(other),
            }
        }
        self.refresh_values();
        if self.primal_infeasibilities().is_empty() && self.dual_infeasibilities().is_empty() {
            return Ok(RunEnd::Optimal);
        }
        if self.params.verbosity.allows(Verbosity::Warning) {
            warn!(passes, "simplex passes exhausted without an optimal basis");
        }
        Ok(RunEnd::Stopped(Status::Error))
    }

    /// Phase 1 for the primal: relax violated bounds of basic variables to their values,
    /// optimize, then restore the bounds for the dual to repair.
    fn shifted_primal(&mut self) -> Result<RunEnd, SimplexError> {
        let tol = self.params.fp_feastol;
        for &v in &self.basic {
            if self.x[v] < self.lower[v] - tol {
                self.lower[v] = self.x[v];
            } else if self.x[v] > self.upper[v] + tol {
                self.upper[v] = self.x[v];
            }
        }
        debug!("primal phase 1 on shifted bounds");
        let end = self.primal_run()?;
        self.unshift();
        match end {
            RunEnd::Unbounded { .. } => self.artificial_dual(),
            other => Ok(other),
        }
    }

    fn unshift(&mut self) {
        self.lower.clone_from(&self.orig_lower);
        self.upper.clone_from(&self.orig_upper);
        for slot in 0..self.nonbasic.len() {
            let v = self.nonbasic[slot];
            let status = normalize_status(self.status[v], self.lower[v], self.upper[v]);
            self.status[v] = status;
            self.x[v] = nonbasic_value(status, self.lower[v], self.upper[v]);
        }
        self.compute_basic_values();
    }

    /// Phase 1 for the dual: costs `+1` at lower and `-1` at upper make the basis dual
    /// feasible; the dual simplex then finds a primal feasible basis.
    fn artificial_dual(&mut self) -> Result<RunEnd, SimplexError> {
        for v in 0..self.cost.len() {
            self.cost[v] = match self.status[v] {
                VarStatus::OnLower => 1.0,
                VarStatus::OnUpper => -1.0,
                _ => 0.0,
            };
        }
        debug!("dual phase 1 on artificial costs");
        let end = self.dual_run(false);
        self.cost.clone_from(&self.obj);
        end
    }

    fn basic_bounds(&self) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let values = self.basic.iter().map(|&v| self.x[v]).collect();
        let lower = self.basic.iter().map(|&v| self.lower[v]).collect();
        let upper = self.basic.iter().map(|&v| self.upper[v]).collect();
        (values, lower, upper)
    }

    fn primal_run(&mut self) -> Result<RunEnd, SimplexError> {
        self.setup_pricer(PricingMode::Primal);
        let needs = self.pricer.needs();
        loop {
            if let Some(status) = self.limit_reached() {
                return Ok(RunEnd::Stopped(status));
            }
            self.compute_reduced_costs();
            let mut candidates = self.dual_infeasibilities();
            if let Some(window) = &self.partial {
                candidates = window.window(&candidates);
            }
            let Some(slot) = self.pricer.select_entering(&candidates) else {
                return Ok(RunEnd::Optimal);
            };
            if let Some(window) = &mut self.partial {
                window.advance(slot);
            }
            let q = self.nonbasic[slot];
            let direction = if self.d[slot] < 0.0 { 1.0 } else { -1.0 };
            let alpha = self.ftran(q);
            let (values, lower, upper) = self.basic_bounds();
            let step = self.tester.primal(&PrimalRatioInput {
                column: &alpha,
                direction,
                values: &values,
                lower: &lower,
                upper: &upper,
                entering_range: self.upper[q] - self.lower[q],
                feastol: self.params.fp_feastol,
                epsilon: self.params.epsilon_pivot,
            });
            match step {
                PrimalStep::Unbounded => {
                    return Ok(RunEnd::Unbounded {
                        var: q,
                        direction,
                        column: alpha,
                    });
                }
                PrimalStep::Flip { step } => {
                    self.move_nonbasic(q, direction * step, &alpha);
                    let to_upper = direction > 0.0;
                    self.status[q] = self.bound_status(q, to_upper);
                    self.x[q] = if to_upper { self.upper[q] } else { self.lower[q] };
                    self.stats.bound_flips += 1;
                    self.stats.iterations += 1;
                }
                PrimalStep::Leave {
                    position,
                    step,
                    to_upper,
                } => {
                    let pivot = alpha[position];
                    if needs.row {
                        let rho = self.btran_unit(position);
                        let row: Vec<(usize, f64)> = self
                            .pivot_row(&rho)
                            .into_iter()
                            .filter(|&(s, _)| s != slot)
                            .collect();
                        let products: Vec<f64> = if needs.products {
                            let mut v = alpha.clone();
                            self.factor.solve_transpose(&mut v);
                            self.stats.linear_solves += 1;
                            row.iter()
                                .map(|&(s, _)| self.col_dot(self.nonbasic[s], &v))
                                .collect()
                        } else {
                            Vec::new()
                        };
                        self.pricer.entered(&PrimalPivot {
                            entering: slot,
                            leaving: position,
                            pivot,
                            column: &alpha,
                            row: &row,
                            products: &products,
                        });
                    }
                    self.move_nonbasic(q, direction * step, &alpha);
                    let leaving = self.basic[position];
                    let status = self.bound_status(leaving, to_upper);
                    self.x[leaving] = if to_upper {
                        self.upper[leaving]
                    } else {
                        self.lower[leaving]
                    };
                    self.stats.primal_iterations += 1;
                    if !self.replace(position, slot, q, status, &alpha)? {
                        return self.recover();
                    }
                }
            }
            self.log_progress("primal");
        }
    }

    /// Moves the nonbasic variables in `flips` to their opposite bounds.
    fn flip_bounds(&mut self, flips: &[usize]) {
        let mut rhs = vec![0.0; self.m];
        for &slot in flips {
            let v = self.nonbasic[slot];
            let (value, status) = match self.status[v] {
                VarStatus::OnLower => (self.upper[v], VarStatus::OnUpper),
                VarStatus::OnUpper => (self.lower[v], VarStatus::OnLower),
                _ => continue,
            };
            let delta = value - self.x[v];
            self.x[v] = value;
            self.status[v] = status;
            for (i, a) in self.column(v) {
                rhs[i] += a * delta;
            }
        }
        self.factor.solve(&mut rhs);
        self.stats.linear_solves += 1;
        for (p, &v) in self.basic.iter().enumerate() {
            self.x[v] -= rhs[p];
        }
        self.stats.bound_flips += flips.len();
    }

    fn dual_run(&mut self, true_costs: bool) -> Result<RunEnd, SimplexError> {
        self.setup_pricer(PricingMode::Dual);
        let needs = self.pricer.needs();
        let mut retries = 0;
        loop {
            if let Some(status) = self.limit_reached() {
                return Ok(RunEnd::Stopped(status));
            }
            self.compute_reduced_costs();
            if true_costs && self.objective_limit_reached() {
                return Ok(RunEnd::Stopped(Status::AbortValue));
            }
            let infeasible = self.primal_infeasibilities();
            let Some(position) = self.pricer.select_leaving(&infeasible) else {
                return Ok(RunEnd::Optimal);
            };
            let leaving = self.basic[position];
            let value = self.x[leaving];
            let leaving_increases = value < self.lower[leaving];
            let target = if leaving_increases {
                self.lower[leaving]
            } else {
                self.upper[leaving]
            };
            let rho = self.btran_unit(position);
            let candidates: Vec<DualCandidate> = self
                .pivot_row(&rho)
                .into_iter()
                .map(|(slot, alpha)| {
                    let v = self.nonbasic[slot];
                    let (can_increase, can_decrease) = match self.status[v] {
                        VarStatus::OnLower => (true, false),
                        VarStatus::OnUpper => (false, true),
                        VarStatus::Zero => (true, true),
                        VarStatus::Fixed | VarStatus::Basic => (false, false),
                    };
                    DualCandidate {
                        slot,
                        alpha,
                        reduced_cost: self.d[slot],
                        range: self.upper[v] - self.lower[v],
                        can_increase,
                        can_decrease,
                    }
                })
                .collect();
            let step = self.tester.dual(&DualRatioInput {
                candidates: &candidates,
                leaving_increases,
                infeasibility: (target - value).abs(),
                opttol: self.params.fp_opttol,
                epsilon: self.params.epsilon_pivot,
            });
            let (slot, flips) = match step {
                DualStep::Infeasible => return Ok(RunEnd::Infeasible { farkas: rho }),
                DualStep::Enter { slot, flips } => (slot, flips),
            };
            if !flips.is_empty() {
                self.flip_bounds(&flips);
            }
            let q = self.nonbasic[slot];
            let alpha = self.ftran(q);
            let pivot = alpha[position];
            if pivot.abs() < self.params.epsilon_pivot {
                // row and column disagree: rebuild the factorization and price again
                retries += 1;
                if retries > MAX_PIVOT_RETRIES {
                    return Ok(RunEnd::Stopped(Status::Error));
                }
                if !self.refactor()? {
                    return self.recover();
                }
                continue;
            }
            retries = 0;
            let theta = (self.x[leaving] - target) / pivot;
            let tau = if needs.tau {
                let mut tau = rho.clone();
                self.factor.solve(&mut tau);
                self.stats.linear_solves += 1;
                tau
            } else {
                Vec::new()
            };
            self.pricer.left(&DualPivot {
                entering: slot,
                leaving: position,
                pivot,
                column: &alpha,
                row_norm_sq: rho.iter().map(|v| v * v).sum(),
                tau: &tau,
            });
            self.move_nonbasic(q, theta, &alpha);
            self.x[leaving] = target;
            let status = self.bound_status(leaving, !leaving_increases);
            self.stats.dual_iterations += 1;
            if !self.replace(position, slot, q, status, &alpha)? {
                return self.recover();
            }
            self.log_progress("dual");
        }
    }

    fn basis_status(&self) -> BasisStatus {
        BasisStatus::new(self.status[self.n..].to_vec(), self.status[..self.n].to_vec())
    }

    fn primal_point(&self) -> Solution<f64> {
        let values = self.x[..self.n].to_vec();
        let mut slacks = vec![0.0; self.m];
        for (i, slack) in slacks.iter_mut().enumerate() {
            if let Some(row) = self.csr.outer_view(i) {
                *slack = row.iter().map(|(j, &a)| a * values[j]).sum();
            }
        }
        Solution {
            objective: Some(self.lp.objective_value(&values)),
            primal: PrimalPart::Point { values, slacks },
            ..Solution::empty()
        }
    }

    fn finish(mut self, end: RunEnd) -> FloatOutcome {
        self.cost.clone_from(&self.obj);
        let (status, solution) = match end {
            RunEnd::Optimal => (Status::Optimal, self.point_with_duals()),
            RunEnd::Stopped(Status::Singular) => (Status::Singular, Solution::empty()),
            RunEnd::Stopped(status) => (status, self.point_with_duals()),
            RunEnd::Restarted => (Status::Error, Solution::empty()),
            RunEnd::Unbounded {
                var,
                direction,
                column,
            } => {
                let mut ray = vec![0.0; self.n];
                if var < self.n {
                    ray[var] = direction;
                }
                for (p, &v) in self.basic.iter().enumerate() {
                    if v < self.n {
                        ray[v] = -direction * column[p];
                    }
                }
                let solution = Solution {
                    primal: PrimalPart::Ray(ray),
                    ..Solution::empty()
                };
                (Status::Unbounded, solution)
            }
            RunEnd::Infeasible { farkas } => {
                let solution = Solution {
                    dual: DualPart::Farkas(farkas),
                    ..Solution::empty()
                };
                (Status::Infeasible, solution)
            }
        };
        self.stats.solve_time = self.timer.elapsed();
        if self.params.verbosity.allows(Verbosity::Normal) {
            info!(
                ?status,
                iterations = self.stats.iterations,
                factorizations = self.stats.factorizations,
                elapsed = ?self.stats.solve_time,
                "simplex finished"
            );
        }
        let basis = (status != Status::Singular && self.basic.len() == self.m)
            .then(|| self.basis_status());
        FloatOutcome {
            status,
            solution,
            basis,
            stats: self.stats,
        }
    }

    fn point_with_duals(&mut self) -> Solution<f64> {
        if self.basic.len() != self.m {
            return Solution::empty();
        }
        let mut solution = self.primal_point();
        let obj = self.obj.clone();
        let pi = self.multipliers(&obj);
        let dual: Vec<f64> = pi.iter().map(|v| self.sign * v).collect();
        let reduced_costs: Vec<f64> = (0..self.n)
            .map(|j| {
                if self.status[j].is_basic() {
                    0.0
                } else {
                    self.sign * (obj[j] - self.col_dot(j, &pi))
                }
            })
            .collect();
        solution.dual = DualPart::Multipliers {
            dual,
            reduced_costs,
        };
        solution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use irlp_core::options::{PricerKind, RatioTesterKind};
    use irlp_core::problem::{Column, Row, SparseVector};

    /// max 3x + 2y  s.t.  x + y <= 4,  x + 3y <= second_rhs,  0 <= x <= 3,  y >= 0
    fn packing_lp(second_rhs: f64) -> LinearProgram<f64> {
        let mut lp = LinearProgram::new(ObjSense::Maximize);
        lp.add_col(Column::new(3.0, SparseVector::new(), 0.0, 3.0))
            .unwrap();
        lp.add_col(Column::new(2.0, SparseVector::new(), 0.0, f64::INFINITY))
            .unwrap();
        lp.add_row(Row::new(
            f64::NEG_INFINITY,
            SparseVector::from_entries([(0, 1.0), (1, 1.0)]),
            4.0,
        ))
        .unwrap();
        lp.add_row(Row::new(
            f64::NEG_INFINITY,
            SparseVector::from_entries([(0, 1.0), (1, 3.0)]),
            second_rhs,
        ))
        .unwrap();
        lp
    }

    /// The optimum (3, 1) leaves the second row slack.
    fn small_lp() -> LinearProgram<f64> {
        packing_lp(7.0)
    }

    /// min x + y  s.t.  x + 2y >= 2,  3x + y >= 3,  x, y >= 0
    fn covering_lp() -> LinearProgram<f64> {
        let mut lp = LinearProgram::new(ObjSense::Minimize);
        for _ in 0..2 {
            lp.add_col(Column::new(1.0, SparseVector::new(), 0.0, f64::INFINITY))
                .unwrap();
        }
        lp.add_row(Row::new(
            2.0,
            SparseVector::from_entries([(0, 1.0), (1, 2.0)]),
            f64::INFINITY,
        ))
        .unwrap();
        lp.add_row(Row::new(
            3.0,
            SparseVector::from_entries([(0, 3.0), (1, 1.0)]),
            f64::INFINITY,
        ))
        .unwrap();
        lp
    }

    fn solve(lp: &LinearProgram<f64>, params: &SolverParams) -> FloatOutcome {
        SimplexEngine::new(params).solve(lp, None).unwrap()
    }

    #[test]
    fn solves_small_maximization() {
        let out = solve(&small_lp(), &SolverParams::default());
        assert_eq!(out.status, Status::Optimal);
        let x = out.solution.primal().unwrap();
        assert_abs_diff_eq!(x[0], 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(x[1], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(out.solution.objective.unwrap(), 11.0, epsilon = 1e-9);
        let y = out.solution.dual().unwrap();
        assert_abs_diff_eq!(y[0], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(y[1], 0.0, epsilon = 1e-9);
        let d = out.solution.reduced_costs().unwrap();
        assert_abs_diff_eq!(d[0], 1.0, epsilon = 1e-9);
        assert_eq!(out.basis.unwrap().num_basic(), 2);
    }

    #[test]
    fn degenerate_vertex_has_optimal_duals() {
        use crate::violation::violations;
        use irlp_core::math::LpNumber;
        use irlp_core::rational::Rational;

        // both rows and the upper bound of x are active at (3, 1)
        let lp = packing_lp(6.0);
        let exact = lp.to_rational(1e100);
        let tol = Rational::from_real(1e-9, 1e100);
        for algorithm in [Algorithm::Enter, Algorithm::Leave] {
            let params = SolverParams::default().with_algorithm(algorithm, Representation::Column);
            let out = solve(&lp, &params);
            assert_eq!(out.status, Status::Optimal);
            assert_abs_diff_eq!(out.solution.objective.unwrap(), 11.0, epsilon = 1e-9);
            let x: Vec<Rational> = out
                .solution
                .primal()
                .unwrap()
                .iter()
                .map(|&v| Rational::from_real(v, 1e100))
                .collect();
            let y: Vec<Rational> = out
                .solution
                .dual()
                .unwrap()
                .iter()
                .map(|&v| Rational::from_real(v, 1e100))
                .collect();
            let check = violations(&exact, &x, &y).unwrap();
            assert!(check.within(&tol, &tol), "{algorithm:?}: {check:?}");
        }
    }

    #[test]
    fn all_algorithm_combinations_agree() {
        for algorithm in [Algorithm::Enter, Algorithm::Leave] {
            for representation in [Representation::Column, Representation::Row] {
                for lp in [small_lp(), covering_lp()] {
                    let params =
                        SolverParams::default().with_algorithm(algorithm, representation);
                    let out = solve(&lp, &params);
                    assert_eq!(out.status, Status::Optimal);
                    let expected = if lp.sense() == ObjSense::Maximize { 11.0 } else { 1.4 };
                    assert_abs_diff_eq!(out.solution.objective.unwrap(), expected, epsilon = 1e-8);
                }
            }
        }
    }

    #[test]
    fn every_pricer_and_ratio_tester_solves() {
        let pricers = [
            PricerKind::Auto,
            PricerKind::Dantzig,
            PricerKind::ParMult,
            PricerKind::Devex,
            PricerKind::QuickSteep,
            PricerKind::Steep,
            PricerKind::Hybrid,
        ];
        let testers = [
            RatioTesterKind::Textbook,
            RatioTesterKind::Harris,
            RatioTesterKind::Fast,
            RatioTesterKind::BoundFlipping,
        ];
        for pricer in pricers {
            for tester in testers {
                let params = SolverParams::default()
                    .with_pricer(pricer)
                    .with_ratio_tester(tester);
                let out = solve(&covering_lp(), &params);
                assert_eq!(out.status, Status::Optimal, "{pricer:?}/{tester:?}");
                assert_abs_diff_eq!(out.solution.objective.unwrap(), 1.4, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn reports_unbounded_ray() {
        let mut lp = LinearProgram::new(ObjSense::Maximize);
        lp.add_col(Column::new(1.0, SparseVector::new(), 0.0, f64::INFINITY))
            .unwrap();
        lp.add_col(Column::new(0.0, SparseVector::new(), 0.0, f64::INFINITY))
            .unwrap();
        lp.add_row(Row::new(
            f64::NEG_INFINITY,
            SparseVector::from_entries([(0, 1.0), (1, -1.0)]),
            1.0,
        ))
        .unwrap();
        let out = solve(&lp, &SolverParams::default());
        assert_eq!(out.status, Status::Unbounded);
        let ray = out.solution.primal_ray().unwrap();
        assert!(ray[0] > 0.0);
        assert!(ray[0] - ray[1] <= 1e-12);
    }

    #[test]
    fn reports_farkas_for_conflicting_rows() {
        let mut lp = LinearProgram::new(ObjSense::Minimize);
        lp.add_col(Column::new(
            1.0,
            SparseVector::new(),
            f64::NEG_INFINITY,
            f64::INFINITY,
        ))
        .unwrap();
        lp.add_row(Row::new(5.0, SparseVector::from_entries([(0, 1.0)]), f64::INFINITY))
            .unwrap();
        lp.add_row(Row::new(
            f64::NEG_INFINITY,
            SparseVector::from_entries([(0, 1.0)]),
            3.0,
        ))
        .unwrap();
        for algorithm in [Algorithm::Enter, Algorithm::Leave] {
            let params = SolverParams::default().with_algorithm(algorithm, Representation::Column);
            let out = solve(&lp, &params);
            assert_eq!(out.status, Status::Infeasible);
            let y = out.solution.dual_farkas().unwrap();
            // y^T A = 0 while y^T s is bounded away from zero
            assert_abs_diff_eq!(y[0] + y[1], 0.0, epsilon = 1e-12);
            assert!(y[0].abs() > 0.0);
        }
    }

    #[test]
    fn crossing_column_bounds_are_infeasible() {
        let mut lp = LinearProgram::new(ObjSense::Minimize);
        lp.add_col(Column::new(1.0, SparseVector::new(), 5.0, 3.0))
            .unwrap();
        let out = solve(&lp, &SolverParams::default());
        assert_eq!(out.status, Status::Infeasible);
        assert!(out.solution.dual_farkas().is_some());
    }

    #[test]
    fn warm_start_from_optimal_basis_needs_no_pivots() {
        let lp = small_lp();
        let params = SolverParams::default();
        let first = solve(&lp, &params);
        let basis = first.basis.unwrap();
        let second = SimplexEngine::new(&params).solve(&lp, Some(&basis)).unwrap();
        assert_eq!(second.status, Status::Optimal);
        assert_eq!(second.stats.iterations, 0);
    }

    #[test]
    fn singular_start_basis_restarts() {
        let mut lp = LinearProgram::new(ObjSense::Minimize);
        for _ in 0..2 {
            lp.add_col(Column::new(1.0, SparseVector::new(), 0.0, 10.0))
                .unwrap();
        }
        lp.add_row(Row::new(
            1.0,
            SparseVector::from_entries([(0, 1.0), (1, 1.0)]),
            f64::INFINITY,
        ))
        .unwrap();
        lp.add_row(Row::new(
            2.0,
            SparseVector::from_entries([(0, 2.0), (1, 2.0)]),
            f64::INFINITY,
        ))
        .unwrap();
        let singular = BasisStatus::new(
            vec![VarStatus::OnLower, VarStatus::OnLower],
            vec![VarStatus::Basic, VarStatus::Basic],
        );
        let params = SolverParams::default();
        let out = SimplexEngine::new(&params).solve(&lp, Some(&singular)).unwrap();
        assert_eq!(out.status, Status::Optimal);
        assert!(out.stats.restarts >= 1);
        assert_abs_diff_eq!(out.solution.objective.unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn exhausted_passes_do_not_claim_optimality() {
        let params = SolverParams::default();
        // the slack basis of the covering problem violates both rows
        let out = SimplexEngine::new(&params)
            .with_max_passes(0)
            .solve(&covering_lp(), None)
            .unwrap();
        assert_eq!(out.status, Status::Error);
        assert!(out.solution.primal().is_some());

        let mut trivial = LinearProgram::new(ObjSense::Minimize);
        trivial
            .add_col(Column::new(1.0, SparseVector::new(), 0.0, 1.0))
            .unwrap();
        let out = SimplexEngine::new(&params)
            .with_max_passes(0)
            .solve(&trivial, None)
            .unwrap();
        assert_eq!(out.status, Status::Optimal);
    }

    #[test]
    fn iteration_limit_stops_with_point() {
        let params = SolverParams::default().with_iter_limit(0);
        let out = solve(&small_lp(), &params);
        assert_eq!(out.status, Status::AbortIter);
        assert!(out.solution.primal().is_some());
    }

    #[test]
    fn objective_limit_stops_dual() {
        let params = SolverParams {
            obj_limit_upper: Some(0.5),
            ..SolverParams::default()
        };
        let out = solve(&covering_lp(), &params);
        assert_eq!(out.status, Status::AbortValue);
    }

    #[test]
    fn cancellation_is_polled() {
        let params = SolverParams::default();
        let token = CancelToken::new();
        token.cancel();
        let out = SimplexEngine::new(&params)
            .with_cancel(&token)
            .solve(&covering_lp(), None)
            .unwrap();
        assert_eq!(out.status, Status::AbortTime);
    }

    #[test]
    fn empty_row_set_bounds_only() {
        let mut lp = LinearProgram::new(ObjSense::Minimize);
        lp.add_col(Column::new(-1.0, SparseVector::new(), -2.0, 7.0))
            .unwrap();
        let out = solve(&lp, &SolverParams::default());
        assert_eq!(out.status, Status::Optimal);
        assert_abs_diff_eq!(out.solution.primal().unwrap()[0], 7.0);
    }
}

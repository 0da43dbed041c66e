use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Summary of one refinement round, in floating point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementRecord {
    pub round: usize,
    pub primal_violation: f64,
    pub dual_violation: f64,
    pub primal_scale: f64,
    pub dual_scale: f64,
    pub simplex_iterations: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimplexStats {
    pub iterations: usize,
    pub primal_iterations: usize,
    pub dual_iterations: usize,
    pub bound_flips: usize,
    pub factorizations: usize,
    pub updates: usize,
    pub linear_solves: usize,
    pub restarts: usize,
    pub solve_time: Duration,
}

impl SimplexStats {
    pub fn absorb(&mut self, other: &SimplexStats) {
        self.iterations += other.iterations;
        self.primal_iterations += other.primal_iterations;
        self.dual_iterations += other.dual_iterations;
        self.bound_flips += other.bound_flips;
        self.factorizations += other.factorizations;
        self.updates += other.updates;
        self.linear_solves += other.linear_solves;
        self.restarts += other.restarts;
        self.solve_time += other.solve_time;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolveStats {
    pub history: Vec<RefinementRecord>,
    pub simplex: SimplexStats,
    pub solve_time: Duration,
    pub sync_time: Duration,
    pub transform_time: Duration,
    pub rational_time: Duration,
    pub simplex_calls: usize,
    pub refinements: usize,
    pub stall_refinements: usize,
    pub feasibility_refinements: usize,
    pub unboundedness_refinements: usize,
    pub rational_factorizations: usize,
}

impl SolveStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: RefinementRecord) {
        self.history.push(record);
    }

    pub fn record_simplex(&mut self, run: &SimplexStats) {
        self.simplex.absorb(run);
        self.simplex_calls += 1;
    }
}

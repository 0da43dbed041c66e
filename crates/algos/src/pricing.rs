use irlp_core::options::{PricerKind, SolverParams};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;

/// Which simplex variant is asking for candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingMode {
    /// Entering variables over nonbasic slots.
    Primal,
    /// Leaving variables over basis positions.
    Dual,
}

/// Exact edge norms of the current basis, computed on demand.
pub trait EdgeNorms {
    /// `1 + ||B^-1 a_j||^2` for the nonbasic variable in `slot`.
    fn primal_norm_sq(&self, slot: usize) -> f64;

    /// `||e_r^T B^-1||^2` for basis position `position`.
    fn dual_norm_sq(&self, position: usize) -> f64;
}

/// Data about a primal pivot, taken before the basis update.
pub struct PrimalPivot<'a> {
    /// Nonbasic slot of the entering variable. After the pivot it holds the leaving one.
    pub entering: usize,
    pub leaving: usize,
    pub pivot: f64,
    /// `B^-1 a_q` by basis position.
    pub column: &'a [f64],
    /// Pivot row over nonbasic slots, entering slot excluded.
    pub row: &'a [(usize, f64)],
    /// `a_j^T B^-T (B^-1 a_q)` aligned with `row`; empty unless requested.
    pub products: &'a [f64],
}

/// Data about a dual pivot, taken before the basis update.
pub struct DualPivot<'a> {
    pub entering: usize,
    pub leaving: usize,
    pub pivot: f64,
    /// `B^-1 a_q` by basis position.
    pub column: &'a [f64],
    /// `||e_r^T B^-1||^2`.
    pub row_norm_sq: f64,
    /// `B^-1 B^-T e_r` by basis position; empty unless requested.
    pub tau: &'a [f64],
}

/// Extra vectors a pricer wants computed for its weight updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PricingNeeds {
    pub row: bool,
    pub products: bool,
    pub tau: bool,
}

/// Candidate selection. Candidates are `(index, violation)` pairs sorted by index, with
/// the violation being `|d_j|` for entering and the bound violation for leaving.
pub trait Pricer {
    fn name(&self) -> &'static str;

    fn needs(&self) -> PricingNeeds {
        PricingNeeds::default()
    }

    /// Resets the weights for a run of `mode` on the current basis.
    fn setup(&mut self, mode: PricingMode, num_rows: usize, num_slots: usize, norms: &dyn EdgeNorms);

    fn select_entering(&mut self, candidates: &[(usize, f64)]) -> Option<usize>;

    fn select_leaving(&mut self, candidates: &[(usize, f64)]) -> Option<usize>;

    fn entered(&mut self, _pivot: &PrimalPivot<'_>) {}

    fn left(&mut self, _pivot: &DualPivot<'_>) {}
}

/// Highest score wins, ties go to the lowest index.
fn best_by(candidates: &[(usize, f64)], mut score: impl FnMut(usize, f64) -> f64) -> Option<usize> {
    candidates
        .iter()
        .max_by_key(|&&(idx, v)| (OrderedFloat(score(idx, v)), Reverse(idx)))
        .map(|&(idx, _)| idx)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DantzigPricer;

impl Pricer for DantzigPricer {
    fn name(&self) -> &'static str {
        "dantzig"
    }

    fn setup(&mut self, _mode: PricingMode, _rows: usize, _slots: usize, _norms: &dyn EdgeNorms) {}

    fn select_entering(&mut self, candidates: &[(usize, f64)]) -> Option<usize> {
        best_by(candidates, |_, v| v)
    }

    fn select_leaving(&mut self, candidates: &[(usize, f64)]) -> Option<usize> {
        best_by(candidates, |_, v| v)
    }
}

/// Rotating window over the candidate list.
#[derive(Debug, Clone)]
pub struct PartialWindow {
    size: usize,
    next: usize,
}

impl PartialWindow {
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            next: 0,
        }
    }

    /// At most `size` candidates starting at the first index `>= next`, wrapping around.
    pub fn window(&self, candidates: &[(usize, f64)]) -> Vec<(usize, f64)> {
        let start = candidates.partition_point(|&(idx, _)| idx < self.next);
        candidates[start..]
            .iter()
            .chain(&candidates[..start])
            .take(self.size)
            .copied()
            .collect()
    }

    pub fn advance(&mut self, chosen: usize) {
        self.next = chosen + 1;
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}

/// Partial multiple pricing: Dantzig over a rotating subset of the candidates.
#[derive(Debug, Clone)]
pub struct ParMultPricer {
    entering: PartialWindow,
    leaving: PartialWindow,
}

impl ParMultPricer {
    pub fn new(size: usize) -> Self {
        Self {
            entering: PartialWindow::new(size),
            leaving: PartialWindow::new(size),
        }
    }
}

impl Pricer for ParMultPricer {
    fn name(&self) -> &'static str {
        "parmult"
    }

    fn setup(&mut self, _mode: PricingMode, _rows: usize, _slots: usize, _norms: &dyn EdgeNorms) {
        self.entering.reset();
        self.leaving.reset();
    }

    fn select_entering(&mut self, candidates: &[(usize, f64)]) -> Option<usize> {
        let chosen = best_by(&self.entering.window(candidates), |_, v| v)?;
        self.entering.advance(chosen);
        Some(chosen)
    }

    fn select_leaving(&mut self, candidates: &[(usize, f64)]) -> Option<usize> {
        let chosen = best_by(&self.leaving.window(candidates), |_, v| v)?;
        self.leaving.advance(chosen);
        Some(chosen)
    }
}

/// Devex reference weights, reset to one whenever a run starts.
#[derive(Debug, Clone, Default)]
pub struct DevexPricer {
    weights: Vec<f64>,
}

impl Pricer for DevexPricer {
    fn name(&self) -> &'static str {
        "devex"
    }

    fn needs(&self) -> PricingNeeds {
        PricingNeeds {
            row: true,
            ..PricingNeeds::default()
        }
    }

    fn setup(&mut self, mode: PricingMode, rows: usize, slots: usize, _norms: &dyn EdgeNorms) {
        let len = match mode {
            PricingMode::Primal => slots,
            PricingMode::Dual => rows,
        };
        self.weights = vec![1.0; len];
    }

    fn select_entering(&mut self, candidates: &[(usize, f64)]) -> Option<usize> {
        let weights = &self.weights;
        best_by(candidates, |idx, v| v * v / weights.get(idx).copied().unwrap_or(1.0))
    }

    fn select_leaving(&mut self, candidates: &[(usize, f64)]) -> Option<usize> {
        self.select_entering(candidates)
    }

    fn entered(&mut self, pivot: &PrimalPivot<'_>) {
        let w_q = self.weights[pivot.entering];
        for &(slot, alpha) in pivot.row {
            let ratio = alpha / pivot.pivot;
            self.weights[slot] = self.weights[slot].max(ratio * ratio * w_q);
        }
        self.weights[pivot.entering] = (w_q / (pivot.pivot * pivot.pivot)).max(1.0);
    }

    fn left(&mut self, pivot: &DualPivot<'_>) {
        let w_r = self.weights[pivot.leaving];
        for (pos, &alpha) in pivot.column.iter().enumerate() {
            if pos != pivot.leaving && alpha != 0.0 {
                let ratio = alpha / pivot.pivot;
                self.weights[pos] = self.weights[pos].max(ratio * ratio * w_r);
            }
        }
        self.weights[pivot.leaving] = (w_r / (pivot.pivot * pivot.pivot)).max(1.0);
    }
}

/// Steepest edge. With `exact_init` the weights start from the true edge norms,
/// otherwise from one (quick steepest edge).
#[derive(Debug, Clone)]
pub struct SteepPricer {
    exact_init: bool,
    weights: Vec<f64>,
}

impl SteepPricer {
    pub fn new(exact_init: bool) -> Self {
        Self {
            exact_init,
            weights: Vec::new(),
        }
    }
}

impl Pricer for SteepPricer {
    fn name(&self) -> &'static str {
        if self.exact_init {
            "steep"
        } else {
            "quicksteep"
        }
    }

    fn needs(&self) -> PricingNeeds {
        PricingNeeds {
            row: true,
            products: true,
            tau: true,
        }
    }

    fn setup(&mut self, mode: PricingMode, rows: usize, slots: usize, norms: &dyn EdgeNorms) {
        self.weights = match (mode, self.exact_init) {
            (PricingMode::Primal, true) => (0..slots).map(|j| norms.primal_norm_sq(j)).collect(),
            (PricingMode::Dual, true) => (0..rows).map(|r| norms.dual_norm_sq(r)).collect(),
            (PricingMode::Primal, false) => vec![1.0; slots],
            (PricingMode::Dual, false) => vec![1.0; rows],
        };
    }

    fn select_entering(&mut self, candidates: &[(usize, f64)]) -> Option<usize> {
        let weights = &self.weights;
        best_by(candidates, |idx, v| v * v / weights.get(idx).copied().unwrap_or(1.0))
    }

    fn select_leaving(&mut self, candidates: &[(usize, f64)]) -> Option<usize> {
        self.select_entering(candidates)
    }

    fn entered(&mut self, pivot: &PrimalPivot<'_>) {
        let gamma_q = 1.0 + pivot.column.iter().map(|v| v * v).sum::<f64>();
        for (k, &(slot, alpha)) in pivot.row.iter().enumerate() {
            let ratio = alpha / pivot.pivot;
            let product = pivot.products.get(k).copied().unwrap_or(0.0);
            let updated = self.weights[slot] - 2.0 * ratio * product + ratio * ratio * gamma_q;
            self.weights[slot] = updated.max(1.0 + ratio * ratio);
        }
        self.weights[pivot.entering] = (gamma_q / (pivot.pivot * pivot.pivot)).max(1.0);
    }

    fn left(&mut self, pivot: &DualPivot<'_>) {
        let beta_r = pivot.row_norm_sq;
        for (pos, &alpha) in pivot.column.iter().enumerate() {
            if pos != pivot.leaving && alpha != 0.0 {
                let ratio = alpha / pivot.pivot;
                let tau = pivot.tau.get(pos).copied().unwrap_or(0.0);
                let updated = self.weights[pos] - 2.0 * ratio * tau + ratio * ratio * beta_r;
                self.weights[pos] = updated.max(1e-10);
            }
        }
        self.weights[pivot.leaving] = (beta_r / (pivot.pivot * pivot.pivot)).max(1e-10);
    }
}

/// The configured pricer, dispatched without boxing.
#[derive(Debug, Clone)]
pub enum AnyPricer {
    Dantzig(DantzigPricer),
    ParMult(ParMultPricer),
    Devex(DevexPricer),
    Steep(SteepPricer),
}

/// Concrete rule for `kind`. `Auto` is Devex; `Hybrid` takes steepest edge on small
/// problems, partial multiple pricing on dense large ones and Devex otherwise.
pub fn resolve_pricer(
    kind: PricerKind,
    params: &SolverParams,
    num_rows: usize,
    num_cols: usize,
    num_nonzeros: usize,
) -> PricerKind {
    match kind {
        PricerKind::Auto => PricerKind::Devex,
        PricerKind::Hybrid => {
            let cells = (num_rows * num_cols).max(1) as f64;
            let density = num_nonzeros as f64 / cells;
            if num_rows + num_cols <= params.hybrid_size_threshold {
                PricerKind::Steep
            } else if density >= params.hybrid_density_threshold {
                PricerKind::ParMult
            } else {
                PricerKind::Devex
            }
        }
        other => other,
    }
}

impl AnyPricer {
    pub fn from_params(params: &SolverParams, num_rows: usize, num_cols: usize, nnz: usize) -> Self {
        match resolve_pricer(params.pricer, params, num_rows, num_cols, nnz) {
            PricerKind::Dantzig => AnyPricer::Dantzig(DantzigPricer),
            PricerKind::ParMult => AnyPricer::ParMult(ParMultPricer::new(params.partial_pricing_size)),
            PricerKind::Steep => AnyPricer::Steep(SteepPricer::new(true)),
            PricerKind::QuickSteep => AnyPricer::Steep(SteepPricer::new(false)),
            PricerKind::Devex | PricerKind::Auto | PricerKind::Hybrid => {
                AnyPricer::Devex(DevexPricer::default())
            }
        }
    }

    fn inner(&mut self) -> &mut dyn Pricer {
        match self {
            AnyPricer::Dantzig(p) => p,
            AnyPricer::ParMult(p) => p,
            AnyPricer::Devex(p) => p,
            AnyPricer::Steep(p) => p,
        }
    }
}

impl Pricer for AnyPricer {
    fn name(&self) -> &'static str {
        match self {
            AnyPricer::Dantzig(p) => p.name(),
            AnyPricer::ParMult(p) => p.name(),
            AnyPricer::Devex(p) => p.name(),
            AnyPricer::Steep(p) => p.name(),
        }
    }

    fn needs(&self) -> PricingNeeds {
        match self {
            AnyPricer::Dantzig(p) => p.needs(),
            AnyPricer::ParMult(p) => p.needs(),
            AnyPricer::Devex(p) => p.needs(),
            AnyPricer::Steep(p) => p.needs(),
        }
    }

    fn setup(&mut self, mode: PricingMode, rows: usize, slots: usize, norms: &dyn EdgeNorms) {
        self.inner().setup(mode, rows, slots, norms)
    }

    fn select_entering(&mut self, candidates: &[(usize, f64)]) -> Option<usize> {
        self.inner().select_entering(candidates)
    }

    fn select_leaving(&mut self, candidates: &[(usize, f64)]) -> Option<usize> {
        self.inner().select_leaving(candidates)
    }

    fn entered(&mut self, pivot: &PrimalPivot<'_>) {
        self.inner().entered(pivot)
    }

    fn left(&mut self, pivot: &DualPivot<'_>) {
        self.inner().left(pivot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UnitNorms;

    impl EdgeNorms for UnitNorms {
        fn primal_norm_sq(&self, slot: usize) -> f64 {
            1.0 + slot as f64
        }

        fn dual_norm_sq(&self, _position: usize) -> f64 {
            1.0
        }
    }

    #[test]
    fn dantzig_takes_largest_violation_lowest_index_on_ties() {
        let mut p = DantzigPricer;
        assert_eq!(p.select_entering(&[(0, 1.0), (3, 4.0), (5, 4.0)]), Some(3));
        assert_eq!(p.select_leaving(&[]), None);
    }

    #[test]
    fn exact_steep_normalizes_by_edge_norm() {
        let mut p = SteepPricer::new(true);
        p.setup(PricingMode::Primal, 2, 4, &UnitNorms);
        // slot 3 has norm 4, so 3^2/4 loses to 2^2/1
        assert_eq!(p.select_entering(&[(0, 2.0), (3, 3.0)]), Some(0));
        let mut quick = SteepPricer::new(false);
        quick.setup(PricingMode::Primal, 2, 4, &UnitNorms);
        assert_eq!(quick.select_entering(&[(0, 2.0), (3, 3.0)]), Some(3));
    }

    #[test]
    fn devex_weights_grow_after_pivot() {
        let mut p = DevexPricer::default();
        p.setup(PricingMode::Primal, 1, 3, &UnitNorms);
        let column = [0.5];
        let row = [(1, 2.0)];
        p.entered(&PrimalPivot {
            entering: 0,
            leaving: 0,
            pivot: 0.5,
            column: &column,
            row: &row,
            products: &[],
        });
        assert!((p.weights[1] - 16.0).abs() < 1e-12);
        assert!((p.weights[0] - 4.0).abs() < 1e-12);
        assert_eq!(p.select_entering(&[(1, 3.0), (2, 1.5)]), Some(2));
    }

    #[test]
    fn partial_window_rotates() {
        let mut p = ParMultPricer::new(2);
        let candidates = [(0, 1.0), (2, 5.0), (4, 9.0), (6, 2.0)];
        assert_eq!(p.select_entering(&candidates), Some(2));
        assert_eq!(p.select_entering(&candidates), Some(4));
        // next window wraps: slots 6 and 0
        assert_eq!(p.select_entering(&candidates), Some(6));
    }

    #[test]
    fn hybrid_resolution_follows_thresholds() {
        let params = SolverParams {
            hybrid_size_threshold: 10,
            hybrid_density_threshold: 0.5,
            ..SolverParams::default()
        };
        assert_eq!(resolve_pricer(PricerKind::Hybrid, &params, 3, 3, 2), PricerKind::Steep);
        assert_eq!(resolve_pricer(PricerKind::Hybrid, &params, 10, 10, 60), PricerKind::ParMult);
        assert_eq!(resolve_pricer(PricerKind::Hybrid, &params, 10, 10, 5), PricerKind::Devex);
        assert_eq!(resolve_pricer(PricerKind::Auto, &params, 1, 1, 1), PricerKind::Devex);
    }
}

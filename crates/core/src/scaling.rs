use crate::math::nearest_power_of_two;
use crate::options::ScalerKind;
use crate::problem::{LinearProgram, ProblemResult};
use crate::traits::Scaler;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Row and column multipliers, all powers of two so that unscaling is exact.
///
/// The scaled matrix is `R A C`. A scaled column value `x'` corresponds to `C x'` in the
/// original space, a scaled row dual `y'` to `R y'`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactors {
    pub rows: Vec<f64>,
    pub cols: Vec<f64>,
}

impl ScaleFactors {
    pub fn identity(num_rows: usize, num_cols: usize) -> Self {
        Self {
            rows: vec![1.0; num_rows],
            cols: vec![1.0; num_cols],
        }
    }

    pub fn is_identity(&self) -> bool {
        self.rows.iter().chain(self.cols.iter()).all(|&f| f == 1.0)
    }

    pub fn apply(&self, lp: &mut LinearProgram<f64>) -> ProblemResult<()> {
        lp.rescale(&self.rows, &self.cols)
    }

    pub fn revert(&self, lp: &mut LinearProgram<f64>) -> ProblemResult<()> {
        let rows: Vec<f64> = self.rows.iter().map(|f| 1.0 / f).collect();
        let cols: Vec<f64> = self.cols.iter().map(|f| 1.0 / f).collect();
        lp.rescale(&rows, &cols)
    }

    pub fn unscale_primal(&self, x: &mut [f64]) {
        x.iter_mut().zip(&self.cols).for_each(|(v, f)| *v *= f);
    }

    pub fn scale_primal(&self, x: &mut [f64]) {
        x.iter_mut().zip(&self.cols).for_each(|(v, f)| *v /= f);
    }

    pub fn unscale_slacks(&self, s: &mut [f64]) {
        s.iter_mut().zip(&self.rows).for_each(|(v, f)| *v /= f);
    }

    pub fn unscale_dual(&self, y: &mut [f64]) {
        y.iter_mut().zip(&self.rows).for_each(|(v, f)| *v *= f);
    }

    pub fn unscale_reduced_costs(&self, d: &mut [f64]) {
        d.iter_mut().zip(&self.cols).for_each(|(v, f)| *v /= f);
    }

    pub fn unscale_primal_ray(&self, ray: &mut [f64]) {
        self.unscale_primal(ray);
    }

    pub fn unscale_farkas(&self, ray: &mut [f64]) {
        self.unscale_dual(ray);
    }
}

fn row_extremes(lp: &LinearProgram<f64>, rows: &[f64], cols: &[f64]) -> Vec<Option<(f64, f64)>> {
    lp.rows()
        .enumerate()
        .map(|(i, (_, row))| {
            row.coeffs.iter().fold(None, |acc, (j, v)| {
                let a = (v * rows[i] * cols[j]).abs();
                Some(match acc {
                    None => (a, a),
                    Some((lo, hi)) => (f64::min(lo, a), f64::max(hi, a)),
                })
            })
        })
        .collect()
}

fn col_extremes(lp: &LinearProgram<f64>, rows: &[f64], cols: &[f64]) -> Vec<Option<(f64, f64)>> {
    lp.cols()
        .enumerate()
        .map(|(j, (_, col))| {
            col.coeffs.iter().fold(None, |acc, (i, v)| {
                let a = (v * rows[i] * cols[j]).abs();
                Some(match acc {
                    None => (a, a),
                    Some((lo, hi)) => (f64::min(lo, a), f64::max(hi, a)),
                })
            })
        })
        .collect()
}

/// Largest over smallest absolute scaled entry.
pub fn condition_ratio(lp: &LinearProgram<f64>, factors: &ScaleFactors) -> f64 {
    let (lo, hi) = row_extremes(lp, &factors.rows, &factors.cols)
        .into_iter()
        .flatten()
        .fold((f64::INFINITY, 0.0f64), |(lo, hi), (a, b)| (lo.min(a), hi.max(b)));
    if hi == 0.0 {
        1.0
    } else {
        hi / lo
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EquilibriumScaler {
    pub col_first: bool,
    pub do_both: bool,
}

impl EquilibriumScaler {
    /// Columns only.
    pub fn uni() -> Self {
        Self {
            col_first: true,
            do_both: false,
        }
    }

    pub fn bi() -> Self {
        Self {
            col_first: false,
            do_both: true,
        }
    }
}

impl Scaler for EquilibriumScaler {
    fn name(&self) -> &'static str {
        if self.do_both {
            "bi-equilibrium"
        } else {
            "uni-equilibrium"
        }
    }

    fn compute_factors(&self, lp: &LinearProgram<f64>) -> ScaleFactors {
        let mut factors = ScaleFactors::identity(lp.num_rows(), lp.num_cols());
        let inverse_max = |ext: Option<(f64, f64)>| match ext {
            Some((_, hi)) if hi > 0.0 => nearest_power_of_two(1.0 / hi),
            _ => 1.0,
        };
        let mut passes = vec![self.col_first];
        if self.do_both {
            passes.push(!self.col_first);
        }
        for columns in passes {
            if columns {
                factors.cols = col_extremes(lp, &factors.rows, &factors.cols)
                    .into_iter()
                    .map(inverse_max)
                    .collect();
            } else {
                factors.rows = row_extremes(lp, &factors.rows, &factors.cols)
                    .into_iter()
                    .map(inverse_max)
                    .collect();
            }
        }
        factors
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GeometricScaler {
    pub passes: usize,
    pub col_first: bool,
    pub do_both: bool,
    /// Stop once a pass improves the condition ratio by less than this factor.
    pub min_improvement: f64,
}

impl GeometricScaler {
    pub fn new(passes: usize) -> Self {
        Self {
            passes,
            col_first: false,
            do_both: true,
            min_improvement: 0.85,
        }
    }
}

impl Scaler for GeometricScaler {
    fn name(&self) -> &'static str {
        if self.passes > 1 {
            "geometric-8"
        } else {
            "geometric-1"
        }
    }

    fn compute_factors(&self, lp: &LinearProgram<f64>) -> ScaleFactors {
        let mut factors = ScaleFactors::identity(lp.num_rows(), lp.num_cols());
        let inverse_mean = |ext: Option<(f64, f64)>| match ext {
            Some((lo, hi)) if lo > 0.0 => 1.0 / (lo * hi).sqrt(),
            _ => 1.0,
        };
        let mut ratio = condition_ratio(lp, &factors);
        for pass in 0..self.passes.max(1) {
            let mut order = vec![self.col_first];
            if self.do_both {
                order.push(!self.col_first);
            }
            let mut next = factors.clone();
            for columns in order {
                if columns {
                    let ext = col_extremes(lp, &next.rows, &next.cols);
                    for (f, e) in next.cols.iter_mut().zip(ext) {
                        *f *= inverse_mean(e);
                    }
                } else {
                    let ext = row_extremes(lp, &next.rows, &next.cols);
                    for (f, e) in next.rows.iter_mut().zip(ext) {
                        *f *= inverse_mean(e);
                    }
                }
            }
            let next_ratio = condition_ratio(lp, &next);
            debug!(pass, ratio, next_ratio, "geometric scaling pass");
            if next_ratio > ratio * self.min_improvement && pass > 0 {
                break;
            }
            factors = next;
            ratio = next_ratio;
        }
        factors
            .rows
            .iter_mut()
            .chain(factors.cols.iter_mut())
            .for_each(|f| *f = nearest_power_of_two(*f));
        factors
    }
}

/// The configured scaler, dispatched without boxing.
#[derive(Debug, Clone, Copy)]
pub enum AnyScaler {
    Equilibrium(EquilibriumScaler),
    Geometric(GeometricScaler),
}

impl AnyScaler {
    pub fn from_kind(kind: ScalerKind) -> Option<Self> {
        match kind {
            ScalerKind::Off => None,
            ScalerKind::UniEqui => Some(AnyScaler::Equilibrium(EquilibriumScaler::uni())),
            ScalerKind::BiEqui => Some(AnyScaler::Equilibrium(EquilibriumScaler::bi())),
            ScalerKind::Geo1 => Some(AnyScaler::Geometric(GeometricScaler::new(1))),
            ScalerKind::Geo8 => Some(AnyScaler::Geometric(GeometricScaler::new(8))),
        }
    }
}

impl Scaler for AnyScaler {
    fn name(&self) -> &'static str {
        match self {
            AnyScaler::Equilibrium(s) => s.name(),
            AnyScaler::Geometric(s) => s.name(),
        }
    }

    fn compute_factors(&self, lp: &LinearProgram<f64>) -> ScaleFactors {
        match self {
            AnyScaler::Equilibrium(s) => s.compute_factors(lp),
            AnyScaler::Geometric(s) => s.compute_factors(lp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Column, ObjSense, Row, SparseVector};
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn badly_scaled(seed: u64) -> LinearProgram<f64> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut lp = LinearProgram::new(ObjSense::Maximize);
        for _ in 0..6 {
            let obj = rng.gen_range(-5.0..5.0);
            lp.add_col(Column::new(obj, SparseVector::new(), -1.0, 3.0e3))
                .unwrap();
        }
        for i in 0..5 {
            let magnitude = 10f64.powi(i * 2 - 4);
            let mut entries = Vec::new();
            for j in 0..6 {
                if rng.gen_bool(0.6) {
                    entries.push((j, magnitude * rng.gen_range(0.5..2.0)));
                }
            }
            lp.add_row(Row::new(
                f64::NEG_INFINITY,
                SparseVector::from_entries(entries),
                magnitude * 7.0,
            ))
            .unwrap();
        }
        lp
    }

    #[test]
    fn factors_are_powers_of_two() {
        let lp = badly_scaled(3);
        for kind in [
            ScalerKind::UniEqui,
            ScalerKind::BiEqui,
            ScalerKind::Geo1,
            ScalerKind::Geo8,
        ] {
            let scaler = AnyScaler::from_kind(kind).unwrap();
            let factors = scaler.compute_factors(&lp);
            for f in factors.rows.iter().chain(factors.cols.iter()) {
                assert_eq!(f.log2().fract(), 0.0, "{} produced {f}", scaler.name());
            }
        }
    }

    fn every_scaler() -> Vec<AnyScaler> {
        let mut scalers = Vec::new();
        for col_first in [true, false] {
            for do_both in [true, false] {
                scalers.push(AnyScaler::Equilibrium(EquilibriumScaler { col_first, do_both }));
                for passes in [1, 8] {
                    scalers.push(AnyScaler::Geometric(GeometricScaler {
                        col_first,
                        do_both,
                        ..GeometricScaler::new(passes)
                    }));
                }
            }
        }
        scalers
    }

    #[test]
    fn unscale_restores_problem_exactly() {
        for seed in 0..8 {
            let original = badly_scaled(11 + seed);
            for scaler in every_scaler() {
                let mut lp = original.clone();
                let factors = scaler.scale(&mut lp).unwrap();
                scaler.unscale(&mut lp, &factors).unwrap();
                for i in 0..lp.num_rows() {
                    assert_eq!(lp.row(i).unwrap(), original.row(i).unwrap(), "{scaler:?}");
                }
                for j in 0..lp.num_cols() {
                    assert_eq!(lp.col(j).unwrap(), original.col(j).unwrap(), "{scaler:?}");
                }
            }
        }
    }

    #[test]
    fn scaled_point_maps_back_to_original_activity() {
        let mut rng = SmallRng::seed_from_u64(29);
        for seed in 0..4 {
            let original = badly_scaled(40 + seed);
            let x: Vec<f64> = (0..original.num_cols()).map(|_| rng.gen_range(-1.0..3.0)).collect();
            for scaler in every_scaler() {
                let mut lp = original.clone();
                let factors = scaler.scale(&mut lp).unwrap();
                let mut scaled_x = x.clone();
                factors.scale_primal(&mut scaled_x);
                let mut activity = lp.activity(&scaled_x).unwrap();
                factors.unscale_slacks(&mut activity);
                let expected = original.activity(&x).unwrap();
                for (i, (a, expected)) in activity.iter().zip(&expected).enumerate() {
                    assert!(
                        (a - expected).abs() <= 1e-9 * expected.abs().max(1.0),
                        "{scaler:?} row {i}: {a} vs {expected}"
                    );
                }
                factors.unscale_primal(&mut scaled_x);
                for (a, b) in scaled_x.iter().zip(&x) {
                    assert_eq!(a, b);
                }
            }
        }
    }

    #[test]
    fn bi_equilibrium_bounds_entries_by_one() {
        let mut lp = badly_scaled(5);
        let before = condition_ratio(&lp, &ScaleFactors::identity(lp.num_rows(), lp.num_cols()));
        let factors = EquilibriumScaler::bi().scale(&mut lp).unwrap();
        assert!(!factors.is_identity());
        for (_, row) in lp.rows() {
            for (_, v) in row.coeffs.iter() {
                assert!(v.abs() <= 2.0);
            }
        }
        let after = condition_ratio(&lp, &ScaleFactors::identity(lp.num_rows(), lp.num_cols()));
        assert!(after <= before);
    }

    #[test]
    fn vector_unscaling_matches_factor_convention() {
        let factors = ScaleFactors {
            rows: vec![2.0],
            cols: vec![4.0, 0.5],
        };
        let mut x = vec![1.0, 1.0];
        factors.unscale_primal(&mut x);
        assert_eq!(x, vec![4.0, 0.5]);
        factors.scale_primal(&mut x);
        assert_eq!(x, vec![1.0, 1.0]);
        let mut y = vec![3.0];
        factors.unscale_dual(&mut y);
        assert_eq!(y, vec![6.0]);
        let mut d = vec![8.0, 1.0];
        factors.unscale_reduced_costs(&mut d);
        assert_eq!(d, vec![2.0, 2.0]);
    }
}

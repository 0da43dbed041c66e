use crate::presolve::Presolved;
use crate::problem::{LinearProgram, ProblemResult};
use crate::scaling::ScaleFactors;

pub trait Scaler {
    fn name(&self) -> &'static str;

    fn compute_factors(&self, lp: &LinearProgram<f64>) -> ScaleFactors;

    fn scale(&self, lp: &mut LinearProgram<f64>) -> ProblemResult<ScaleFactors> {
        let factors = self.compute_factors(lp);
        factors.apply(lp)?;
        Ok(factors)
    }

    fn unscale(&self, lp: &mut LinearProgram<f64>, factors: &ScaleFactors) -> ProblemResult<()> {
        factors.revert(lp)
    }
}

pub trait Simplifier {
    fn name(&self) -> &'static str;

    /// Reduces `lp`. The returned postsolve data maps reduced solutions back.
    fn simplify(&self, lp: &LinearProgram<f64>) -> Presolved;
}

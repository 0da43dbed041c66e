//! Exact optimality and certificate checks against a rational problem.
//!
//! Duals follow `d = c - A^T y` in the sense of the problem. Internally everything is turned
//! into a minimization, where a variable strictly above its lower bound needs `d <= 0` and
//! one strictly below its upper bound needs `d >= 0`. A row behaves like a variable
//! `s = a x` bounded by its sides whose reduced cost is `y`.

use irlp_core::problem::{LinearProgram, ObjSense, ProblemResult};
use irlp_core::rational::{max_abs, ExactInfinity, Rational};
use itertools::izip;
use num_traits::{One, Signed, Zero};

/// Largest violations of a candidate solution, by kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Violations {
    pub bounds: Rational,
    pub rows: Rational,
    pub reduced_costs: Rational,
    pub duals: Rational,
}

impl Violations {
    pub fn primal(&self) -> &Rational {
        std::cmp::max(&self.bounds, &self.rows)
    }

    pub fn dual(&self) -> &Rational {
        std::cmp::max(&self.reduced_costs, &self.duals)
    }

    pub fn within(&self, feastol: &Rational, opttol: &Rational) -> bool {
        self.primal() <= feastol && self.dual() <= opttol
    }
}

pub(crate) fn sense_sign(sense: ObjSense) -> Rational {
    match sense {
        ObjSense::Minimize => Rational::one(),
        ObjSense::Maximize => -Rational::one(),
    }
}

fn raise(acc: &mut Rational, value: Rational) {
    if value > *acc {
        *acc = value;
    }
}

pub(crate) fn bound_violation(value: &Rational, lower: &Rational, upper: &Rational) -> Rational {
    let mut viol = Rational::zero();
    raise(&mut viol, lower - value);
    raise(&mut viol, value - upper);
    viol
}

/// Violation of the sign condition on `d` (minimization) for a variable at `value`.
pub(crate) fn sign_violation(
    value: &Rational,
    lower: &Rational,
    upper: &Rational,
    d: &Rational,
) -> Rational {
    let mut viol = Rational::zero();
    if value > lower && d.is_positive() {
        raise(&mut viol, d.clone());
    }
    if value < upper && d.is_negative() {
        raise(&mut viol, -d);
    }
    viol
}

/// Largest bound violation and largest row violation of `x`.
pub fn primal_violations(
    lp: &LinearProgram<Rational>,
    x: &[Rational],
) -> ProblemResult<(Rational, Rational)> {
    let activity = lp.activity(x)?;
    let mut bounds = Rational::zero();
    for ((_, col), value) in lp.cols().zip(x) {
        raise(&mut bounds, bound_violation(value, &col.lower, &col.upper));
    }
    let mut rows = Rational::zero();
    for ((_, row), value) in lp.rows().zip(&activity) {
        raise(&mut rows, bound_violation(value, &row.lhs, &row.rhs));
    }
    Ok((bounds, rows))
}

/// Largest reduced-cost and row-dual sign violations of `y` at the point `x`.
pub fn dual_violations(
    lp: &LinearProgram<Rational>,
    x: &[Rational],
    y: &[Rational],
) -> ProblemResult<(Rational, Rational)> {
    let sign = sense_sign(lp.sense());
    let activity = lp.activity(x)?;
    let aty = lp.transposed_activity(y)?;
    let mut reduced_costs = Rational::zero();
    for ((_, col), value, a) in izip!(lp.cols(), x, &aty) {
        let d = &sign * (&col.obj - a);
        raise(
            &mut reduced_costs,
            sign_violation(value, &col.lower, &col.upper, &d),
        );
    }
    let mut duals = Rational::zero();
    for ((_, row), value, yi) in izip!(lp.rows(), &activity, y) {
        let d = &sign * yi;
        raise(&mut duals, sign_violation(value, &row.lhs, &row.rhs, &d));
    }
    Ok((reduced_costs, duals))
}

pub fn violations(
    lp: &LinearProgram<Rational>,
    x: &[Rational],
    y: &[Rational],
) -> ProblemResult<Violations> {
    let (bounds, rows) = primal_violations(lp, x)?;
    let (reduced_costs, duals) = dual_violations(lp, x, y)?;
    Ok(Violations {
        bounds,
        rows,
        reduced_costs,
        duals,
    })
}

/// Range of `sum coef * v` over `lower <= v <= upper`; `None` ends are infinite.
fn interval<'a>(
    terms: impl Iterator<Item = (&'a Rational, &'a Rational, &'a Rational)>,
    inf: &ExactInfinity,
) -> (Option<Rational>, Option<Rational>) {
    let mut lo = Some(Rational::zero());
    let mut hi = Some(Rational::zero());
    for (coef, lower, upper) in terms {
        if coef.is_zero() {
            continue;
        }
        let (at_min, at_max) = if coef.is_positive() {
            (lower, upper)
        } else {
            (upper, lower)
        };
        lo = match (lo, inf.is_infinite(at_min)) {
            (Some(acc), false) => Some(acc + coef * at_min),
            _ => None,
        };
        hi = match (hi, inf.is_infinite(at_max)) {
            (Some(acc), false) => Some(acc + coef * at_max),
            _ => None,
        };
    }
    (lo, hi)
}

/// `y` proves infeasibility when `(A^T y)^T x` over the column bounds and `y^T s` over the
/// row sides cannot meet.
pub fn farkas_proves_infeasible(
    lp: &LinearProgram<Rational>,
    y: &[Rational],
    inf: &ExactInfinity,
) -> bool {
    if lp.cols().any(|(_, c)| c.lower > c.upper) || lp.rows().any(|(_, r)| r.lhs > r.rhs) {
        return true;
    }
    let Ok(z) = lp.transposed_activity(y) else {
        return false;
    };
    let (box_lo, box_hi) = interval(
        lp.cols().zip(&z).map(|((_, c), zj)| (zj, &c.lower, &c.upper)),
        inf,
    );
    let (side_lo, side_hi) = interval(
        lp.rows().zip(y).map(|((_, r), yi)| (yi, &r.lhs, &r.rhs)),
        inf,
    );
    let below = matches!((&box_hi, &side_lo), (Some(h), Some(l)) if h < l);
    let above = matches!((&side_hi, &box_lo), (Some(h), Some(l)) if h < l);
    below || above
}

/// Recession check of a primal ray, normalized to unit max norm.
#[derive(Debug, Clone, PartialEq)]
pub struct RayCheck {
    /// Largest movement against a finite bound or side.
    pub violation: Rational,
    /// Objective change along the ray, as a minimization.
    pub slope: Rational,
}

impl RayCheck {
    pub fn is_exact_proof(&self) -> bool {
        self.violation.is_zero() && self.slope.is_negative()
    }
}

pub fn check_ray(
    lp: &LinearProgram<Rational>,
    ray: &[Rational],
    inf: &ExactInfinity,
) -> ProblemResult<Option<RayCheck>> {
    let norm = max_abs(ray);
    if norm.is_zero() {
        return Ok(None);
    }
    let r: Vec<Rational> = ray.iter().map(|v| v / &norm).collect();
    let ar = lp.activity(&r)?;
    let mut violation = Rational::zero();
    let mut against = |value: &Rational, lower: &Rational, upper: &Rational| {
        if value.is_negative() && !inf.is_neg_infinite(lower) {
            raise(&mut violation, -value);
        }
        if value.is_positive() && !inf.is_pos_infinite(upper) {
            raise(&mut violation, value.clone());
        }
    };
    for ((_, col), value) in lp.cols().zip(&r) {
        against(value, &col.lower, &col.upper);
    }
    for ((_, row), value) in lp.rows().zip(&ar) {
        against(value, &row.lhs, &row.rhs);
    }
    let sign = sense_sign(lp.sense());
    let slope = lp
        .cols()
        .zip(&r)
        .fold(Rational::zero(), |acc, ((_, c), v)| acc + &c.obj * v)
        * sign;
    Ok(Some(RayCheck { violation, slope }))
}

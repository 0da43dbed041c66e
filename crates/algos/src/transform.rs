//! Exact reformulations the refinement loop solves instead of the original problem.
//!
//! Each transform is returned together with the problem it built and is consumed by its
//! `untransform`, so a transform can be undone once only.

use irlp_core::basis::{BasisStatus, VarStatus};
use irlp_core::problem::{Column, LinearProgram, ObjSense, ProblemResult, Row, SparseVector};
use irlp_core::rational::{ExactInfinity, Rational};
use num_traits::{One, Signed, Zero};

use crate::violation::sense_sign;

/// Rows `a_i x - s_i = 0` with slack column `n + i` bounded by `[lhs_i, rhs_i]`.
#[derive(Debug)]
pub struct EqualityForm {
    num_rows: usize,
    num_cols: usize,
}

impl EqualityForm {
    pub fn apply(lp: &LinearProgram<Rational>) -> ProblemResult<(Self, LinearProgram<Rational>)> {
        let (m, n) = (lp.num_rows(), lp.num_cols());
        let mut eq = LinearProgram::new(lp.sense());
        eq.set_obj_offset(lp.obj_offset().clone());
        for (_, col) in lp.cols() {
            eq.add_col(Column::new(
                col.obj.clone(),
                SparseVector::new(),
                col.lower.clone(),
                col.upper.clone(),
            ))?;
        }
        for (_, row) in lp.rows() {
            eq.add_col(Column::new(
                Rational::zero(),
                SparseVector::new(),
                row.lhs.clone(),
                row.rhs.clone(),
            ))?;
        }
        for (i, (_, row)) in lp.rows().enumerate() {
            let coeffs = row
                .coeffs
                .iter()
                .map(|(j, v)| (j, v.clone()))
                .chain(std::iter::once((n + i, -Rational::one())))
                .collect();
            eq.add_row(Row::new(Rational::zero(), coeffs, Rational::zero()))?;
        }
        Ok((
            Self {
                num_rows: m,
                num_cols: n,
            },
            eq,
        ))
    }

    /// `x` followed by its exact row activities.
    pub fn lift_primal(
        &self,
        lp: &LinearProgram<Rational>,
        x: &[Rational],
    ) -> ProblemResult<Vec<Rational>> {
        let mut lifted = x.to_vec();
        lifted.extend(lp.activity(x)?);
        Ok(lifted)
    }

    /// Row statuses move onto the slack columns; the equality rows stay nonbasic.
    pub fn lift_basis(&self, basis: &BasisStatus) -> BasisStatus {
        let cols = basis.cols.iter().chain(&basis.rows).copied().collect();
        BasisStatus::new(vec![VarStatus::Fixed; self.num_rows], cols)
    }

    /// Inverse of [`lift_basis`](Self::lift_basis); `None` if an equality row is basic.
    pub fn project_basis(&self, basis: &BasisStatus) -> Option<BasisStatus> {
        if basis.rows.iter().any(|s| s.is_basic()) || basis.cols.len() != self.num_cols + self.num_rows {
            return None;
        }
        Some(BasisStatus::new(
            basis.cols[self.num_cols..].to_vec(),
            basis.cols[..self.num_cols].to_vec(),
        ))
    }

    /// Drops the slack columns.
    pub fn untransform(self, mut x: Vec<Rational>) -> Vec<Rational> {
        x.truncate(self.num_cols);
        x
    }
}

fn finite_or(value: &Rational, inf: &ExactInfinity, shift: &Rational, infinite: Rational) -> Rational {
    if inf.is_infinite(value) {
        infinite
    } else {
        value - shift
    }
}

/// Outcome of the feasibility test once mapped back.
#[derive(Debug, Clone, PartialEq)]
pub enum Feasibility {
    Feasible(Vec<Rational>),
    Infeasible(Vec<Rational>),
}

/// Shifts every column to a finite bound and homogenizes each row side the shifted zero
/// point violates against a column `tau` in `[0, 1]`; the objective is `-tau`. The
/// original problem is feasible exactly when `tau = 1` is attainable.
#[derive(Debug)]
pub struct FeasibilityTransform {
    shifts: Vec<Rational>,
}

impl FeasibilityTransform {
    pub fn apply(
        lp: &LinearProgram<Rational>,
        inf: &ExactInfinity,
    ) -> ProblemResult<(Self, LinearProgram<Rational>)> {
        let n = lp.num_cols();
        let shifts: Vec<Rational> = lp
            .cols()
            .map(|(_, c)| {
                if !inf.is_infinite(&c.lower) {
                    c.lower.clone()
                } else if !inf.is_infinite(&c.upper) {
                    c.upper.clone()
                } else {
                    Rational::zero()
                }
            })
            .collect();
        let mut out = LinearProgram::new(ObjSense::Minimize);
        for ((_, col), shift) in lp.cols().zip(&shifts) {
            out.add_col(Column::new(
                Rational::zero(),
                SparseVector::new(),
                finite_or(&col.lower, inf, shift, inf.neg()),
                finite_or(&col.upper, inf, shift, inf.pos()),
            ))?;
        }
        out.add_col(Column::new(
            -Rational::one(),
            SparseVector::new(),
            Rational::zero(),
            Rational::one(),
        ))?;
        for (_, row) in lp.rows() {
            let moved = row.coeffs.dot(&shifts);
            let mut lhs = finite_or(&row.lhs, inf, &moved, inf.neg());
            let mut rhs = finite_or(&row.rhs, inf, &moved, inf.pos());
            let beta = if !inf.is_infinite(&lhs) && lhs.is_positive() {
                lhs.clone()
            } else if !inf.is_infinite(&rhs) && rhs.is_negative() {
                rhs.clone()
            } else {
                Rational::zero()
            };
            if !beta.is_zero() {
                lhs = finite_or(&lhs, inf, &beta, inf.neg());
                rhs = finite_or(&rhs, inf, &beta, inf.pos());
            }
            let coeffs = row
                .coeffs
                .iter()
                .map(|(j, v)| (j, v.clone()))
                .chain(std::iter::once((n, -beta)))
                .collect();
            out.add_row(Row::new(lhs, coeffs, rhs))?;
        }
        Ok((Self { shifts }, out))
    }

    pub fn tau_index(&self) -> usize {
        self.shifts.len()
    }

    /// `tau >= 1 - feastol` means feasible and yields the shifted-back point; otherwise
    /// the row duals are the candidate Farkas multipliers of the original rows.
    pub fn untransform(self, x: &[Rational], y: &[Rational], feastol: &Rational) -> Feasibility {
        let tau = &x[self.tau_index()];
        if *tau >= Rational::one() - feastol {
            let point = x.iter().zip(&self.shifts).map(|(v, s)| v + s).collect();
            Feasibility::Feasible(point)
        } else {
            Feasibility::Infeasible(y.to_vec())
        }
    }
}

/// Zeroes finite bounds and sides, moves the minimized objective into the row
/// `c^T r + tau = 0` and minimizes `-tau` with `tau` in `[0, 1]`. A positive `tau`
/// at the optimum exhibits an improving ray.
#[derive(Debug)]
pub struct UnboundednessTransform {
    num_cols: usize,
}

impl UnboundednessTransform {
    pub fn apply(
        lp: &LinearProgram<Rational>,
        inf: &ExactInfinity,
    ) -> ProblemResult<(Self, LinearProgram<Rational>)> {
        let n = lp.num_cols();
        let homogeneous = |value: &Rational, infinite: Rational| {
            if inf.is_infinite(value) {
                infinite
            } else {
                Rational::zero()
            }
        };
        let mut out = LinearProgram::new(ObjSense::Minimize);
        for (_, col) in lp.cols() {
            out.add_col(Column::new(
                Rational::zero(),
                SparseVector::new(),
                homogeneous(&col.lower, inf.neg()),
                homogeneous(&col.upper, inf.pos()),
            ))?;
        }
        out.add_col(Column::new(
            -Rational::one(),
            SparseVector::new(),
            Rational::zero(),
            Rational::one(),
        ))?;
        for (_, row) in lp.rows() {
            out.add_row(Row::new(
                homogeneous(&row.lhs, inf.neg()),
                row.coeffs.clone(),
                homogeneous(&row.rhs, inf.pos()),
            ))?;
        }
        let sign = sense_sign(lp.sense());
        let objective = lp
            .cols()
            .enumerate()
            .map(|(j, (_, c))| (j, &sign * &c.obj))
            .chain(std::iter::once((n, Rational::one())))
            .collect();
        out.add_row(Row::new(Rational::zero(), objective, Rational::zero()))?;
        Ok((Self { num_cols: n }, out))
    }

    /// The ray part of `x` when `tau` is positive.
    pub fn untransform(self, mut x: Vec<Rational>) -> Option<Vec<Rational>> {
        let tau = x.get(self.num_cols)?.clone();
        tau.is_positive().then(|| {
            x.truncate(self.num_cols);
            x
        })
    }
}

use crate::basis::{BasisStatus, VarStatus};
use crate::problem::{Column, LinearProgram, Row, SparseVector};
use crate::traits::Simplifier;
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresolveStatus {
    Reduced,
    Infeasible,
    Unbounded,
    /// Nothing was removed; the returned problem equals the input.
    Unsimplified,
}

#[derive(Debug, Clone)]
enum Reduction {
    EmptyRow {
        row: usize,
    },
    SingletonRow {
        row: usize,
        col: usize,
        coeff: f64,
        sides_equal: bool,
        lower_from_row: bool,
        upper_from_row: bool,
    },
    FixedCol {
        col: usize,
        value: f64,
        obj: f64,
        status: VarStatus,
        entries: Vec<(usize, f64)>,
    },
    EmptyCol {
        col: usize,
        value: f64,
        obj: f64,
        status: VarStatus,
    },
    /// Row `a_k x_k + a_l x_l = rhs` solved for the implied free column `k`.
    Doubleton {
        row: usize,
        removed: usize,
        kept: usize,
        a_removed: f64,
        a_kept: f64,
        rhs: f64,
        obj: f64,
        entries: Vec<(usize, f64)>,
    },
}

/// Everything needed to map a reduced solution back onto the original problem.
#[derive(Debug, Clone)]
pub struct Postsolve {
    num_rows: usize,
    num_cols: usize,
    row_map: Vec<usize>,
    col_map: Vec<usize>,
    sense_sign: f64,
    reductions: Vec<Reduction>,
}

#[derive(Debug, Clone)]
pub struct Presolved {
    pub status: PresolveStatus,
    pub lp: LinearProgram<f64>,
    pub postsolve: Postsolve,
}

/// Removes empty and singleton rows, fixed and empty columns, and aggregates implied free
/// columns out of doubleton equations.
#[derive(Debug, Clone, Copy)]
pub struct Presolver {
    pub feastol: f64,
    pub epsilon_zero: f64,
    pub max_rounds: usize,
    /// Smallest acceptable `|a_removed| / max(|a_removed|, |a_kept|)` when aggregating.
    pub aggregation_stability: f64,
}

impl Default for Presolver {
    fn default() -> Self {
        Self {
            feastol: 1e-9,
            epsilon_zero: 1e-16,
            max_rounds: 32,
            aggregation_stability: 1e-2,
        }
    }
}

impl Presolver {
    pub fn new(feastol: f64, epsilon_zero: f64) -> Self {
        Self {
            feastol,
            epsilon_zero,
            ..Self::default()
        }
    }
}

struct Work {
    lhs: Vec<f64>,
    rhs: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    obj: Vec<f64>,
    rows: Vec<BTreeMap<usize, f64>>,
    cols: Vec<BTreeMap<usize, f64>>,
    row_alive: Vec<bool>,
    col_alive: Vec<bool>,
    offset: f64,
    reductions: Vec<Reduction>,
}

impl Work {
    fn load(lp: &LinearProgram<f64>) -> Self {
        let rows: Vec<BTreeMap<usize, f64>> = lp
            .rows()
            .map(|(_, r)| r.coeffs.iter().map(|(j, v)| (j, *v)).collect())
            .collect();
        let cols: Vec<BTreeMap<usize, f64>> = lp
            .cols()
            .map(|(_, c)| c.coeffs.iter().map(|(i, v)| (i, *v)).collect())
            .collect();
        Self {
            lhs: lp.lhs_vec(),
            rhs: lp.rhs_vec(),
            lower: lp.lower_vec(),
            upper: lp.upper_vec(),
            obj: lp.obj_vec(),
            row_alive: vec![true; rows.len()],
            col_alive: vec![true; cols.len()],
            rows,
            cols,
            offset: *lp.obj_offset(),
            reductions: Vec::new(),
        }
    }

    fn drop_row(&mut self, i: usize) {
        for j in std::mem::take(&mut self.rows[i]).into_keys() {
            self.cols[j].remove(&i);
        }
        self.row_alive[i] = false;
    }

    fn drop_col(&mut self, j: usize) -> Vec<(usize, f64)> {
        let entries: Vec<(usize, f64)> = std::mem::take(&mut self.cols[j]).into_iter().collect();
        for (i, _) in &entries {
            self.rows[*i].remove(&j);
        }
        self.col_alive[j] = false;
        entries
    }

    fn fix_col(&mut self, j: usize, value: f64, status: VarStatus) {
        let entries = self.drop_col(j);
        for (i, a) in &entries {
            let shift = a * value;
            if self.lhs[*i].is_finite() {
                self.lhs[*i] -= shift;
            }
            if self.rhs[*i].is_finite() {
                self.rhs[*i] -= shift;
            }
        }
        self.offset += self.obj[j] * value;
        self.reductions.push(Reduction::FixedCol {
            col: j,
            value,
            obj: self.obj[j],
            status,
            entries,
        });
    }
}

enum Outcome {
    Continue(bool),
    Stop(PresolveStatus),
}

impl Presolver {
    fn column_pass(&self, w: &mut Work, sense_sign: f64) -> Outcome {
        let mut changed = false;
        for j in 0..w.col_alive.len() {
            if !w.col_alive[j] {
                continue;
            }
            let (lo, up) = (w.lower[j], w.upper[j]);
            if lo > up + self.feastol {
                debug!(col = j, lower = lo, upper = up, "column bounds cross");
                return Outcome::Stop(PresolveStatus::Infeasible);
            }
            if lo.is_finite() && up.is_finite() && up - lo <= self.feastol {
                let status = if lo == up {
                    VarStatus::Fixed
                } else {
                    VarStatus::OnLower
                };
                w.fix_col(j, lo, status);
                changed = true;
                continue;
            }
            if w.cols[j].is_empty() {
                let cost = sense_sign * w.obj[j];
                let (value, status) = if cost > 0.0 {
                    if !lo.is_finite() {
                        return Outcome::Stop(PresolveStatus::Unbounded);
                    }
                    (lo, VarStatus::OnLower)
                } else if cost < 0.0 {
                    if !up.is_finite() {
                        return Outcome::Stop(PresolveStatus::Unbounded);
                    }
                    (up, VarStatus::OnUpper)
                } else if lo.is_finite() {
                    (lo, VarStatus::OnLower)
                } else if up.is_finite() {
                    (up, VarStatus::OnUpper)
                } else {
                    (0.0, VarStatus::Zero)
                };
                w.offset += w.obj[j] * value;
                w.col_alive[j] = false;
                w.reductions.push(Reduction::EmptyCol {
                    col: j,
                    value,
                    obj: w.obj[j],
                    status,
                });
                changed = true;
            }
        }
        Outcome::Continue(changed)
    }

    fn row_pass(&self, w: &mut Work) -> Outcome {
        let mut changed = false;
        for i in 0..w.row_alive.len() {
            if !w.row_alive[i] {
                continue;
            }
            match w.rows[i].len() {
                0 => {
                    if w.lhs[i] > self.feastol || w.rhs[i] < -self.feastol {
                        debug!(row = i, lhs = w.lhs[i], rhs = w.rhs[i], "empty row infeasible");
                        return Outcome::Stop(PresolveStatus::Infeasible);
                    }
                    w.row_alive[i] = false;
                    w.reductions.push(Reduction::EmptyRow { row: i });
                    changed = true;
                }
                1 => {
                    if let Some(stop) = self.singleton_row(w, i) {
                        return Outcome::Stop(stop);
                    }
                    changed = true;
                }
                2 if w.lhs[i] == w.rhs[i] && w.lhs[i].is_finite() => {
                    changed |= self.doubleton_row(w, i);
                }
                _ => {}
            }
        }
        Outcome::Continue(changed)
    }

    fn singleton_row(&self, w: &mut Work, i: usize) -> Option<PresolveStatus> {
        let (j, a) = w.rows[i].iter().next().map(|(j, a)| (*j, *a))?;
        let (implied_lo, implied_up) = if a > 0.0 {
            (w.lhs[i] / a, w.rhs[i] / a)
        } else {
            (w.rhs[i] / a, w.lhs[i] / a)
        };
        let lower_from_row = implied_lo > w.lower[j];
        let upper_from_row = implied_up < w.upper[j];
        if lower_from_row {
            w.lower[j] = implied_lo;
        }
        if upper_from_row {
            w.upper[j] = implied_up;
        }
        w.reductions.push(Reduction::SingletonRow {
            row: i,
            col: j,
            coeff: a,
            sides_equal: w.lhs[i] == w.rhs[i],
            lower_from_row,
            upper_from_row,
        });
        w.drop_row(i);
        if w.lower[j] > w.upper[j] + self.feastol {
            debug!(row = i, col = j, "singleton row bounds cross");
            return Some(PresolveStatus::Infeasible);
        }
        None
    }

    fn doubleton_row(&self, w: &mut Work, i: usize) -> bool {
        let entries: Vec<(usize, f64)> = w.rows[i].iter().map(|(j, a)| (*j, *a)).collect();
        let b = w.lhs[i];
        for (pick, other) in [(0, 1), (1, 0)] {
            let (k, a_k) = entries[pick];
            let (l, a_l) = entries[other];
            if a_k.abs() < self.aggregation_stability * a_k.abs().max(a_l.abs()) {
                continue;
            }
            let t1 = (b - a_l * w.lower[l]) / a_k;
            let t2 = (b - a_l * w.upper[l]) / a_k;
            let (lo, up) = (t1.min(t2), t1.max(t2));
            if lo < w.lower[k] - self.feastol || up > w.upper[k] + self.feastol {
                continue;
            }
            self.aggregate(w, i, (k, a_k), (l, a_l), b);
            return true;
        }
        false
    }

    fn aggregate(&self, w: &mut Work, i: usize, removed: (usize, f64), kept: (usize, f64), b: f64) {
        let (k, a_k) = removed;
        let (l, a_l) = kept;
        w.drop_row(i);
        let entries = w.drop_col(k);
        for (r, a_rk) in &entries {
            let factor = a_rk / a_k;
            let updated = w.rows[*r].get(&l).copied().unwrap_or(0.0) - factor * a_l;
            if updated.abs() <= self.epsilon_zero {
                w.rows[*r].remove(&l);
                w.cols[l].remove(r);
            } else {
                w.rows[*r].insert(l, updated);
                w.cols[l].insert(*r, updated);
            }
            if w.lhs[*r].is_finite() {
                w.lhs[*r] -= factor * b;
            }
            if w.rhs[*r].is_finite() {
                w.rhs[*r] -= factor * b;
            }
        }
        let obj_k = w.obj[k];
        w.obj[l] -= obj_k * a_l / a_k;
        w.offset += obj_k * b / a_k;
        w.reductions.push(Reduction::Doubleton {
            row: i,
            removed: k,
            kept: l,
            a_removed: a_k,
            a_kept: a_l,
            rhs: b,
            obj: obj_k,
            entries,
        });
    }

    fn finish(&self, lp: &LinearProgram<f64>, w: Work, status: PresolveStatus) -> Presolved {
        let row_map: Vec<usize> = (0..w.row_alive.len()).filter(|&i| w.row_alive[i]).collect();
        let col_map: Vec<usize> = (0..w.col_alive.len()).filter(|&j| w.col_alive[j]).collect();
        let mut row_pos = vec![usize::MAX; w.row_alive.len()];
        for (new, &old) in row_map.iter().enumerate() {
            row_pos[old] = new;
        }
        let mut col_pos = vec![usize::MAX; w.col_alive.len()];
        for (new, &old) in col_map.iter().enumerate() {
            col_pos[old] = new;
        }
        let mut reduced = LinearProgram::new(lp.sense());
        reduced.set_obj_offset(w.offset);
        let mut built = Ok(());
        for &j in &col_map {
            built = built.and(
                reduced
                    .add_col(Column::new(
                        w.obj[j],
                        SparseVector::new(),
                        w.lower[j],
                        w.upper[j],
                    ))
                    .map(|_| ()),
            );
        }
        for &i in &row_map {
            let coeffs = SparseVector::from_entries(w.rows[i].iter().map(|(j, a)| (col_pos[*j], *a)));
            built = built.and(
                reduced
                    .add_row(Row::new(w.lhs[i], coeffs, w.rhs[i]))
                    .map(|_| ()),
            );
        }
        debug_assert!(built.is_ok(), "reduced problem references removed columns");
        info!(
            rows = row_map.len(),
            cols = col_map.len(),
            removed_rows = lp.num_rows() - row_map.len(),
            removed_cols = lp.num_cols() - col_map.len(),
            "presolve finished"
        );
        Presolved {
            status,
            lp: reduced,
            postsolve: Postsolve {
                num_rows: lp.num_rows(),
                num_cols: lp.num_cols(),
                row_map,
                col_map,
                sense_sign: lp.sense().sign(),
                reductions: w.reductions,
            },
        }
    }
}

impl Simplifier for Presolver {
    fn name(&self) -> &'static str {
        "presolve"
    }

    fn simplify(&self, lp: &LinearProgram<f64>) -> Presolved {
        let mut w = Work::load(lp);
        let sense_sign = lp.sense().sign();
        for round in 0..self.max_rounds {
            let mut changed = false;
            for pass in [true, false] {
                let outcome = if pass {
                    self.column_pass(&mut w, sense_sign)
                } else {
                    self.row_pass(&mut w)
                };
                match outcome {
                    Outcome::Continue(c) => changed |= c,
                    Outcome::Stop(status) => {
                        info!(?status, round, "presolve decided the problem");
                        return Presolved {
                            status,
                            lp: lp.clone(),
                            postsolve: Postsolve::identity(lp),
                        };
                    }
                }
            }
            if !changed {
                break;
            }
        }
        if w.reductions.is_empty() {
            return Presolved {
                status: PresolveStatus::Unsimplified,
                lp: lp.clone(),
                postsolve: Postsolve::identity(lp),
            };
        }
        self.finish(lp, w, PresolveStatus::Reduced)
    }
}

impl Postsolve {
    pub fn identity(lp: &LinearProgram<f64>) -> Self {
        Self {
            num_rows: lp.num_rows(),
            num_cols: lp.num_cols(),
            row_map: (0..lp.num_rows()).collect(),
            col_map: (0..lp.num_cols()).collect(),
            sense_sign: lp.sense().sign(),
            reductions: Vec::new(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.reductions.is_empty()
    }

    pub fn unsimplify_primal(&self, reduced: &[f64]) -> Vec<f64> {
        let mut x = vec![0.0; self.num_cols];
        for (rj, &oj) in self.col_map.iter().enumerate() {
            x[oj] = reduced[rj];
        }
        for reduction in self.reductions.iter().rev() {
            match reduction {
                Reduction::FixedCol { col, value, .. } | Reduction::EmptyCol { col, value, .. } => {
                    x[*col] = *value;
                }
                Reduction::Doubleton {
                    removed,
                    kept,
                    a_removed,
                    a_kept,
                    rhs,
                    ..
                } => {
                    x[*removed] = (rhs - a_kept * x[*kept]) / a_removed;
                }
                Reduction::EmptyRow { .. } | Reduction::SingletonRow { .. } => {}
            }
        }
        x
    }

    /// Row duals and reduced costs of the original problem.
    pub fn unsimplify_dual(
        &self,
        dual: &[f64],
        reduced_costs: &[f64],
        basis: &BasisStatus,
    ) -> (Vec<f64>, Vec<f64>) {
        let (y, d, _) = self.unsimplify_dual_basis(dual, reduced_costs, basis);
        (y, d)
    }

    pub fn unsimplify_basis(&self, basis: &BasisStatus) -> BasisStatus {
        let zeros_rows = vec![0.0; basis.rows.len()];
        let zeros_cols = vec![0.0; basis.cols.len()];
        self.unsimplify_dual_basis(&zeros_rows, &zeros_cols, basis).2
    }

    /// Reconstructs duals and statuses together: moving a singleton row's bound back onto
    /// the row changes both.
    pub fn unsimplify_dual_basis(
        &self,
        dual: &[f64],
        reduced_costs: &[f64],
        basis: &BasisStatus,
    ) -> (Vec<f64>, Vec<f64>, BasisStatus) {
        let mut y = vec![0.0; self.num_rows];
        let mut d = vec![0.0; self.num_cols];
        let mut rows = vec![VarStatus::Basic; self.num_rows];
        let mut cols = vec![VarStatus::Zero; self.num_cols];
        for (ri, &oi) in self.row_map.iter().enumerate() {
            y[oi] = dual[ri];
            rows[oi] = basis.rows[ri];
        }
        for (rj, &oj) in self.col_map.iter().enumerate() {
            d[oj] = reduced_costs[rj];
            cols[oj] = basis.cols[rj];
        }
        for reduction in self.reductions.iter().rev() {
            match reduction {
                Reduction::EmptyRow { row } => {
                    y[*row] = 0.0;
                    rows[*row] = VarStatus::Basic;
                }
                Reduction::FixedCol {
                    col,
                    obj,
                    status,
                    entries,
                    ..
                } => {
                    d[*col] = obj - entries.iter().map(|(i, a)| a * y[*i]).sum::<f64>();
                    cols[*col] = *status;
                }
                Reduction::EmptyCol {
                    col, obj, status, ..
                } => {
                    d[*col] = *obj;
                    cols[*col] = *status;
                }
                Reduction::Doubleton {
                    row,
                    removed,
                    a_removed,
                    obj,
                    entries,
                    ..
                } => {
                    let others: f64 = entries.iter().map(|(r, a)| a * y[*r]).sum();
                    y[*row] = (obj - others) / a_removed;
                    d[*removed] = 0.0;
                    rows[*row] = VarStatus::Fixed;
                    cols[*removed] = VarStatus::Basic;
                }
                Reduction::SingletonRow {
                    row,
                    col,
                    coeff,
                    sides_equal,
                    lower_from_row,
                    upper_from_row,
                } => {
                    let at_lower = match cols[*col] {
                        VarStatus::OnLower => Some(true),
                        VarStatus::OnUpper => Some(false),
                        VarStatus::Fixed => Some(self.sense_sign * d[*col] >= 0.0),
                        VarStatus::Basic | VarStatus::Zero => None,
                    };
                    y[*row] = 0.0;
                    rows[*row] = VarStatus::Basic;
                    match at_lower {
                        Some(lower) if (lower && *lower_from_row) || (!lower && *upper_from_row) => {
                            y[*row] = d[*col] / coeff;
                            d[*col] = 0.0;
                            cols[*col] = VarStatus::Basic;
                            rows[*row] = if *sides_equal {
                                VarStatus::Fixed
                            } else if lower == (*coeff > 0.0) {
                                VarStatus::OnLower
                            } else {
                                VarStatus::OnUpper
                            };
                        }
                        Some(lower) if cols[*col] == VarStatus::Fixed => {
                            cols[*col] = if lower {
                                VarStatus::OnLower
                            } else {
                                VarStatus::OnUpper
                            };
                        }
                        _ => {}
                    }
                }
            }
        }
        (y, d, BasisStatus::new(rows, cols))
    }
}

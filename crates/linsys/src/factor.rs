use irlp_core::math::norm_inf;
use irlp_core::options::FactorUpdate;
use thiserror::Error;
use tracing::trace;

/// Sparse column as `(row, value)` pairs.
pub type SparseColumn = Vec<(usize, f64)>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FactorError {
    #[error("basis matrix is singular at position {column}")]
    Singular { column: usize },
    #[error("factor update is unstable (pivot {pivot:e})")]
    Unstable { pivot: f64 },
    #[error("dimension mismatch: {0}")]
    Dimension(String),
}

pub type FactorResult<T> = Result<T, FactorError>;

/// `v[i] -= l_i * v[pivot_row]` for every entry.
#[derive(Debug, Clone)]
struct ColumnEta {
    pivot_row: usize,
    entries: Vec<(usize, f64)>,
}

/// Product-form update for basis position `position` with `alpha = B^-1 a_q`.
#[derive(Debug, Clone)]
struct ProductEta {
    position: usize,
    pivot: f64,
    entries: Vec<(usize, f64)>,
}

/// Forrest-Tomlin row operation `v[target] -= factor * v[source]`.
#[derive(Debug, Clone, Copy)]
struct RowEta {
    target: usize,
    source: usize,
    factor: f64,
}

/// LU factorization of a square basis matrix with incremental column replacement.
///
/// Columns are addressed by basis position, rows by constraint row. `solve` maps a
/// row-indexed right-hand side to a position-indexed solution; `solve_transpose` the other way.
/// After any update error the factorization is stale and must be rebuilt.
#[derive(Debug, Clone)]
pub struct BasisFactor {
    dim: usize,
    update: FactorUpdate,
    epsilon_update: f64,
    lower: Vec<ColumnEta>,
    /// `upper[row * dim + position]`, triangular under `tri_rows`/`tri_cols`.
    upper: Vec<f64>,
    tri_rows: Vec<usize>,
    tri_cols: Vec<usize>,
    row_etas: Vec<RowEta>,
    product_etas: Vec<ProductEta>,
    updates: usize,
}

impl BasisFactor {
    pub fn factorize(
        columns: &[SparseColumn],
        update: FactorUpdate,
        epsilon_factorization: f64,
        epsilon_update: f64,
    ) -> FactorResult<Self> {
        let dim = columns.len();
        if let Some((k, i)) = columns
            .iter()
            .enumerate()
            .find_map(|(k, col)| col.iter().find(|(i, _)| *i >= dim).map(|(i, _)| (k, *i)))
        {
            return Err(FactorError::Dimension(format!(
                "column {k} references row {i} of a {dim}x{dim} basis"
            )));
        }
        let mut upper = vec![0.0; dim * dim];
        let mut pivoted = vec![false; dim];
        let mut lower: Vec<ColumnEta> = Vec::with_capacity(dim);
        let mut tri_rows = Vec::with_capacity(dim);
        let mut tri_cols = Vec::with_capacity(dim);
        let mut work = vec![0.0; dim];
        for (k, col) in columns.iter().enumerate() {
            work.fill(0.0);
            for &(i, v) in col {
                work[i] += v;
            }
            let colmax = norm_inf(&work);
            for eta in &lower {
                let p = work[eta.pivot_row];
                if p != 0.0 {
                    for &(i, l) in &eta.entries {
                        work[i] -= l * p;
                    }
                }
            }
            let mut pivot_row = None;
            let mut pivot_abs = 0.0;
            for (i, v) in work.iter().enumerate() {
                if !pivoted[i] && v.abs() > pivot_abs {
                    pivot_abs = v.abs();
                    pivot_row = Some(i);
                }
            }
            let p = match pivot_row {
                Some(p) if pivot_abs > epsilon_factorization * colmax => p,
                _ => return Err(FactorError::Singular { column: k }),
            };
            for &r in &tri_rows {
                upper[r * dim + k] = work[r];
            }
            let pivot = work[p];
            upper[p * dim + k] = pivot;
            let entries = work
                .iter()
                .enumerate()
                .filter(|(i, v)| !pivoted[*i] && *i != p && **v != 0.0)
                .map(|(i, v)| (i, v / pivot))
                .collect();
            lower.push(ColumnEta {
                pivot_row: p,
                entries,
            });
            pivoted[p] = true;
            tri_rows.push(p);
            tri_cols.push(k);
        }
        trace!(
            dim,
            lower_nnz = lower.iter().map(|e| e.entries.len()).sum::<usize>(),
            "basis factorized"
        );
        Ok(Self {
            dim,
            update,
            epsilon_update,
            lower,
            upper,
            tri_rows,
            tri_cols,
            row_etas: Vec::new(),
            product_etas: Vec::new(),
            updates: 0,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn num_updates(&self) -> usize {
        self.updates
    }

    pub fn update_kind(&self) -> FactorUpdate {
        self.update
    }

    fn apply_lower(&self, v: &mut [f64]) {
        for eta in &self.lower {
            let p = v[eta.pivot_row];
            if p != 0.0 {
                for &(i, l) in &eta.entries {
                    v[i] -= l * p;
                }
            }
        }
        for eta in &self.row_etas {
            v[eta.target] -= eta.factor * v[eta.source];
        }
    }

    /// Solves `B x = rhs` in place.
    pub fn solve(&self, rhs: &mut [f64]) {
        let dim = self.dim;
        debug_assert_eq!(rhs.len(), dim);
        self.apply_lower(rhs);
        let mut x = vec![0.0; dim];
        for t in (0..dim).rev() {
            let (r, k) = (self.tri_rows[t], self.tri_cols[t]);
            let v = rhs[r] / self.upper[r * dim + k];
            x[k] = v;
            if v != 0.0 {
                for &rs in &self.tri_rows[..t] {
                    rhs[rs] -= self.upper[rs * dim + k] * v;
                }
            }
        }
        for eta in &self.product_etas {
            let xr = x[eta.position] / eta.pivot;
            x[eta.position] = xr;
            if xr != 0.0 {
                for &(i, a) in &eta.entries {
                    x[i] -= a * xr;
                }
            }
        }
        rhs.copy_from_slice(&x);
    }

    /// Solves `B^T y = rhs` in place.
    pub fn solve_transpose(&self, rhs: &mut [f64]) {
        let dim = self.dim;
        debug_assert_eq!(rhs.len(), dim);
        for eta in self.product_etas.iter().rev() {
            let others: f64 = eta.entries.iter().map(|&(i, a)| a * rhs[i]).sum();
            rhs[eta.position] = (rhs[eta.position] - others) / eta.pivot;
        }
        let mut z = vec![0.0; dim];
        for t in 0..dim {
            let (r, k) = (self.tri_rows[t], self.tri_cols[t]);
            let mut v = rhs[k];
            for &rs in &self.tri_rows[..t] {
                v -= self.upper[rs * dim + k] * z[rs];
            }
            z[r] = v / self.upper[r * dim + k];
        }
        for eta in self.row_etas.iter().rev() {
            z[eta.source] -= eta.factor * z[eta.target];
        }
        for eta in self.lower.iter().rev() {
            let s: f64 = eta.entries.iter().map(|&(i, l)| l * z[i]).sum();
            z[eta.pivot_row] -= s;
        }
        rhs.copy_from_slice(&z);
    }

    /// Replaces the column at basis `position` by `column`. `alpha` must be `B^-1 column`
    /// computed with the factorization before this call.
    pub fn update(
        &mut self,
        position: usize,
        column: &[(usize, f64)],
        alpha: &[f64],
    ) -> FactorResult<()> {
        if position >= self.dim || alpha.len() != self.dim {
            return Err(FactorError::Dimension(format!(
                "update of position {position} with {} entries in a basis of {}",
                alpha.len(),
                self.dim
            )));
        }
        let pivot = alpha[position];
        if pivot.abs() < self.epsilon_update.max(f64::MIN_POSITIVE) {
            return Err(FactorError::Unstable { pivot });
        }
        match self.update {
            FactorUpdate::Eta => {
                let entries = alpha
                    .iter()
                    .enumerate()
                    .filter(|(i, a)| *i != position && **a != 0.0)
                    .map(|(i, a)| (i, *a))
                    .collect();
                self.product_etas.push(ProductEta {
                    position,
                    pivot,
                    entries,
                });
            }
            FactorUpdate::ForrestTomlin => self.forrest_tomlin(position, column)?,
        }
        self.updates += 1;
        Ok(())
    }

    fn forrest_tomlin(&mut self, position: usize, column: &[(usize, f64)]) -> FactorResult<()> {
        let dim = self.dim;
        let mut spike = vec![0.0; dim];
        for &(i, v) in column {
            spike[i] += v;
        }
        self.apply_lower(&mut spike);
        let t_r = self
            .tri_cols
            .iter()
            .position(|&k| k == position)
            .ok_or_else(|| FactorError::Dimension(format!("position {position} not in basis")))?;
        for (i, v) in spike.iter().enumerate() {
            self.upper[i * dim + position] = *v;
        }
        let p = self.tri_rows.remove(t_r);
        let k = self.tri_cols.remove(t_r);
        self.tri_rows.push(p);
        self.tri_cols.push(k);
        for s in t_r..dim - 1 {
            let (rs, ks) = (self.tri_rows[s], self.tri_cols[s]);
            let val = self.upper[p * dim + ks];
            if val == 0.0 {
                continue;
            }
            let factor = val / self.upper[rs * dim + ks];
            for s2 in s + 1..dim {
                let kc = self.tri_cols[s2];
                self.upper[p * dim + kc] -= factor * self.upper[rs * dim + kc];
            }
            self.upper[p * dim + ks] = 0.0;
            self.row_etas.push(RowEta {
                target: p,
                source: rs,
                factor,
            });
        }
        let diag = self.upper[p * dim + position];
        if diag.abs() <= self.epsilon_update * norm_inf(&spike).max(1.0) {
            return Err(FactorError::Unstable { pivot: diag });
        }
        Ok(())
    }
}

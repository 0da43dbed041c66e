use crate::factor::{FactorError, FactorResult};
use irlp_core::rational::Rational;
use num_traits::Zero;
use tracing::debug;

/// Dense exact LU factorization `P A = L U`.
#[derive(Debug, Clone)]
pub struct RationalLu {
    dim: usize,
    /// Row-major; strictly lower part holds `L` (unit diagonal implied), the rest `U`.
    lu: Vec<Rational>,
    /// `perm[k]` is the original row moved to position `k`.
    perm: Vec<usize>,
}

impl RationalLu {
    pub fn factorize(columns: &[Vec<(usize, Rational)>]) -> FactorResult<Self> {
        let dim = columns.len();
        let mut lu = vec![Rational::zero(); dim * dim];
        for (j, col) in columns.iter().enumerate() {
            for (i, v) in col {
                if *i >= dim {
                    return Err(FactorError::Dimension(format!(
                        "column {j} references row {i} of a {dim}x{dim} basis"
                    )));
                }
                lu[i * dim + j] += v;
            }
        }
        let mut perm: Vec<usize> = (0..dim).collect();
        for k in 0..dim {
            let pivot = (k..dim)
                .filter(|&i| !lu[i * dim + k].is_zero())
                .min_by_key(|&i| (k..dim).filter(|&j| !lu[i * dim + j].is_zero()).count())
                .ok_or(FactorError::Singular { column: k })?;
            if pivot != k {
                for j in 0..dim {
                    lu.swap(k * dim + j, pivot * dim + j);
                }
                perm.swap(k, pivot);
            }
            let diag = lu[k * dim + k].clone();
            for i in k + 1..dim {
                if lu[i * dim + k].is_zero() {
                    continue;
                }
                let l = &lu[i * dim + k] / &diag;
                for j in k + 1..dim {
                    if !lu[k * dim + j].is_zero() {
                        let delta = &l * &lu[k * dim + j];
                        lu[i * dim + j] -= delta;
                    }
                }
                lu[i * dim + k] = l;
            }
        }
        debug!(dim, "rational basis factorized");
        Ok(Self { dim, lu, perm })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Solves `A x = b`.
    pub fn solve(&self, b: &[Rational]) -> Vec<Rational> {
        let n = self.dim;
        let mut x: Vec<Rational> = self.perm.iter().map(|&i| b[i].clone()).collect();
        for i in 0..n {
            for j in 0..i {
                if !self.lu[i * n + j].is_zero() && !x[j].is_zero() {
                    let delta = &self.lu[i * n + j] * &x[j];
                    x[i] -= delta;
                }
            }
        }
        for i in (0..n).rev() {
            for j in i + 1..n {
                if !self.lu[i * n + j].is_zero() && !x[j].is_zero() {
                    let delta = &self.lu[i * n + j] * &x[j];
                    x[i] -= delta;
                }
            }
            x[i] = &x[i] / &self.lu[i * n + i];
        }
        x
    }

    /// Solves `A^T y = c`.
    pub fn solve_transpose(&self, c: &[Rational]) -> Vec<Rational> {
        let n = self.dim;
        let mut w: Vec<Rational> = c.to_vec();
        for i in 0..n {
            for j in 0..i {
                if !self.lu[j * n + i].is_zero() && !w[j].is_zero() {
                    let delta = &self.lu[j * n + i] * &w[j];
                    w[i] -= delta;
                }
            }
            w[i] = &w[i] / &self.lu[i * n + i];
        }
        for i in (0..n).rev() {
            for j in i + 1..n {
                if !self.lu[j * n + i].is_zero() && !w[j].is_zero() {
                    let delta = &self.lu[j * n + i] * &w[j];
                    w[i] -= delta;
                }
            }
        }
        let mut y = vec![Rational::zero(); n];
        for (k, &row) in self.perm.iter().enumerate() {
            y[row] = w[k].clone();
        }
        y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn q(n: i64, d: i64) -> Rational {
        Rational::new(BigInt::from(n), BigInt::from(d))
    }

    fn columns(rows: &[&[i64]]) -> Vec<Vec<(usize, Rational)>> {
        let n = rows.len();
        (0..n)
            .map(|j| {
                (0..n)
                    .filter(|&i| rows[i][j] != 0)
                    .map(|i| (i, q(rows[i][j], 1)))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn solves_exactly() {
        // [[0, 1, 2], [3, 0, 1], [1, 1, 0]]
        let cols = columns(&[&[0, 1, 2], &[3, 0, 1], &[1, 1, 0]]);
        let lu = RationalLu::factorize(&cols).unwrap();
        let x = lu.solve(&[q(1, 1), q(0, 1), q(0, 1)]);
        // A x = e_0
        assert_eq!(&x[1] + &(q(2, 1) * &x[2]), q(1, 1));
        assert_eq!(q(3, 1) * &x[0] + &x[2], q(0, 1));
        assert_eq!(&x[0] + &x[1], q(0, 1));
        assert_eq!(x, vec![q(-1, 7), q(1, 7), q(3, 7)]);

        let y = lu.solve_transpose(&[q(1, 1), q(2, 1), q(3, 1)]);
        // A^T y = c, column by column
        assert_eq!(q(3, 1) * &y[1] + &y[2], q(1, 1));
        assert_eq!(&y[0] + &y[2], q(2, 1));
        assert_eq!(q(2, 1) * &y[0] + &y[1], q(3, 1));
    }

    #[test]
    fn singular_matrix_is_reported() {
        let cols = columns(&[&[1, 2], &[2, 4]]);
        assert!(matches!(
            RationalLu::factorize(&cols),
            Err(FactorError::Singular { column: 1 })
        ));
    }
}

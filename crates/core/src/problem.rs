use crate::math::LpNumber;
use indexmap::IndexMap;
use num_rational::BigRational;
use serde::{Deserialize, Serialize};
use sprs::CsMat;
use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProblemError {
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("invalid structure: {0}")]
    InvalidStructure(String),
    #[error("row index {index} out of range ({len} rows)")]
    RowOutOfRange { index: usize, len: usize },
    #[error("column index {index} out of range ({len} columns)")]
    ColOutOfRange { index: usize, len: usize },
    #[error("unknown row identifier {0}")]
    UnknownRow(RowId),
    #[error("unknown column identifier {0}")]
    UnknownCol(ColId),
}

pub type ProblemResult<T> = Result<T, ProblemError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl fmt::Display for ColId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObjSense {
    #[default]
    Minimize,
    Maximize,
}

impl ObjSense {
    /// +1 for minimization, -1 for maximization.
    pub fn sign(self) -> f64 {
        match self {
            ObjSense::Minimize => 1.0,
            ObjSense::Maximize => -1.0,
        }
    }
}

/// Sparse vector with strictly increasing indices and no stored zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector<N> {
    entries: Vec<(usize, N)>,
}

impl<N> Default for SparseVector<N> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<N: LpNumber> SparseVector<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds from unordered entries; duplicate indices are summed.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (usize, N)>,
    {
        let mut raw: Vec<(usize, N)> = entries.into_iter().collect();
        raw.sort_by_key(|(idx, _)| *idx);
        let mut merged: Vec<(usize, N)> = Vec::with_capacity(raw.len());
        for (idx, value) in raw {
            match merged.last_mut() {
                Some((last, acc)) if *last == idx => *acc = acc.clone() + value,
                _ => merged.push((idx, value)),
            }
        }
        merged.retain(|(_, v)| !v.is_zero());
        Self { entries: merged }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &N)> + '_ {
        self.entries.iter().map(|(i, v)| (*i, v))
    }

    pub fn get(&self, index: usize) -> Option<&N> {
        self.entries
            .binary_search_by_key(&index, |(i, _)| *i)
            .ok()
            .map(|pos| &self.entries[pos].1)
    }

    /// Sets an entry; a zero value removes it.
    pub fn set(&mut self, index: usize, value: N) {
        match self.entries.binary_search_by_key(&index, |(i, _)| *i) {
            Ok(pos) if value.is_zero() => {
                self.entries.remove(pos);
            }
            Ok(pos) => self.entries[pos].1 = value,
            Err(_) if value.is_zero() => {}
            Err(pos) => self.entries.insert(pos, (index, value)),
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<N> {
        self.entries
            .binary_search_by_key(&index, |(i, _)| *i)
            .ok()
            .map(|pos| self.entries.remove(pos).1)
    }

    pub fn max_index(&self) -> Option<usize> {
        self.entries.last().map(|(i, _)| *i)
    }

    /// Reindexes after a removal: `perm[old]` is the new index, `None` drops the entry.
    pub fn reindex(&mut self, perm: &[Option<usize>]) {
        self.entries = self
            .entries
            .drain(..)
            .filter_map(|(i, v)| perm.get(i).copied().flatten().map(|ni| (ni, v)))
            .collect();
        self.entries.sort_by_key(|(i, _)| *i);
    }

    pub fn map<M: LpNumber>(&self, mut f: impl FnMut(&N) -> M) -> SparseVector<M> {
        SparseVector::from_entries(self.entries.iter().map(|(i, v)| (*i, f(v))))
    }

    pub fn dot(&self, dense: &[N]) -> N {
        self.entries
            .iter()
            .fold(N::zero(), |acc, (i, v)| acc + v.clone() * dense[*i].clone())
    }
}

impl<N: LpNumber> FromIterator<(usize, N)> for SparseVector<N> {
    fn from_iter<I: IntoIterator<Item = (usize, N)>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}

/// A constraint `lhs <= coeffs . x <= rhs`; `coeffs` is indexed by column position.
#[derive(Debug, Clone, PartialEq)]
pub struct Row<N> {
    pub lhs: N,
    pub rhs: N,
    pub coeffs: SparseVector<N>,
}

impl<N: LpNumber> Row<N> {
    pub fn new(lhs: N, coeffs: SparseVector<N>, rhs: N) -> Self {
        Self { lhs, rhs, coeffs }
    }
}

/// A variable with bounds and objective; `coeffs` is indexed by row position.
#[derive(Debug, Clone, PartialEq)]
pub struct Column<N> {
    pub lower: N,
    pub upper: N,
    pub obj: N,
    pub coeffs: SparseVector<N>,
}

impl<N: LpNumber> Column<N> {
    pub fn new(obj: N, coeffs: SparseVector<N>, lower: N, upper: N) -> Self {
        Self {
            lower,
            upper,
            obj,
            coeffs,
        }
    }
}

pub trait RowHandle {
    fn row_index<N: LpNumber>(&self, lp: &LinearProgram<N>) -> ProblemResult<usize>;
}

pub trait ColHandle {
    fn col_index<N: LpNumber>(&self, lp: &LinearProgram<N>) -> ProblemResult<usize>;
}

impl<H: RowHandle + ?Sized> RowHandle for &H {
    fn row_index<N: LpNumber>(&self, lp: &LinearProgram<N>) -> ProblemResult<usize> {
        (**self).row_index(lp)
    }
}

impl<H: ColHandle + ?Sized> ColHandle for &H {
    fn col_index<N: LpNumber>(&self, lp: &LinearProgram<N>) -> ProblemResult<usize> {
        (**self).col_index(lp)
    }
}

impl RowHandle for usize {
    fn row_index<N: LpNumber>(&self, lp: &LinearProgram<N>) -> ProblemResult<usize> {
        if *self < lp.num_rows() {
            Ok(*self)
        } else {
            Err(ProblemError::RowOutOfRange {
                index: *self,
                len: lp.num_rows(),
            })
        }
    }
}

impl RowHandle for RowId {
    fn row_index<N: LpNumber>(&self, lp: &LinearProgram<N>) -> ProblemResult<usize> {
        lp.rows
            .get_index_of(self)
            .ok_or(ProblemError::UnknownRow(*self))
    }
}

impl ColHandle for usize {
    fn col_index<N: LpNumber>(&self, lp: &LinearProgram<N>) -> ProblemResult<usize> {
        if *self < lp.num_cols() {
            Ok(*self)
        } else {
            Err(ProblemError::ColOutOfRange {
                index: *self,
                len: lp.num_cols(),
            })
        }
    }
}

impl ColHandle for ColId {
    fn col_index<N: LpNumber>(&self, lp: &LinearProgram<N>) -> ProblemResult<usize> {
        lp.cols
            .get_index_of(self)
            .ok_or(ProblemError::UnknownCol(*self))
    }
}

/// Row and column storage of an LP. Both orientations of the matrix are kept in step.
#[derive(Debug, Clone)]
pub struct LinearProgram<N> {
    sense: ObjSense,
    obj_offset: N,
    rows: IndexMap<RowId, Row<N>>,
    cols: IndexMap<ColId, Column<N>>,
    next_row: u64,
    next_col: u64,
}

impl<N: LpNumber> Default for LinearProgram<N> {
    fn default() -> Self {
        Self::new(ObjSense::Minimize)
    }
}

impl<N: LpNumber> LinearProgram<N> {
    pub fn new(sense: ObjSense) -> Self {
        Self {
            sense,
            obj_offset: N::zero(),
            rows: IndexMap::new(),
            cols: IndexMap::new(),
            next_row: 0,
            next_col: 0,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_cols(&self) -> usize {
        self.cols.len()
    }

    pub fn num_nonzeros(&self) -> usize {
        self.cols.values().map(|c| c.coeffs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.cols.is_empty()
    }

    pub fn sense(&self) -> ObjSense {
        self.sense
    }

    pub fn set_sense(&mut self, sense: ObjSense) {
        self.sense = sense;
    }

    pub fn obj_offset(&self) -> &N {
        &self.obj_offset
    }

    pub fn set_obj_offset(&mut self, offset: N) {
        self.obj_offset = offset;
    }

    pub fn row_id(&self, index: usize) -> ProblemResult<RowId> {
        self.rows
            .get_index(index)
            .map(|(id, _)| *id)
            .ok_or(ProblemError::RowOutOfRange {
                index,
                len: self.num_rows(),
            })
    }

    pub fn col_id(&self, index: usize) -> ProblemResult<ColId> {
        self.cols
            .get_index(index)
            .map(|(id, _)| *id)
            .ok_or(ProblemError::ColOutOfRange {
                index,
                len: self.num_cols(),
            })
    }

    pub fn row_index(&self, handle: impl RowHandle) -> ProblemResult<usize> {
        handle.row_index(self)
    }

    pub fn col_index(&self, handle: impl ColHandle) -> ProblemResult<usize> {
        handle.col_index(self)
    }

    pub fn row(&self, handle: impl RowHandle) -> ProblemResult<&Row<N>> {
        let i = handle.row_index(self)?;
        Ok(&self.rows[i])
    }

    pub fn col(&self, handle: impl ColHandle) -> ProblemResult<&Column<N>> {
        let j = handle.col_index(self)?;
        Ok(&self.cols[j])
    }

    pub fn rows(&self) -> impl Iterator<Item = (RowId, &Row<N>)> + '_ {
        self.rows.iter().map(|(id, row)| (*id, row))
    }

    pub fn cols(&self) -> impl Iterator<Item = (ColId, &Column<N>)> + '_ {
        self.cols.iter().map(|(id, col)| (*id, col))
    }

    pub fn row_ids(&self) -> Vec<RowId> {
        self.rows.keys().copied().collect()
    }

    pub fn col_ids(&self) -> Vec<ColId> {
        self.cols.keys().copied().collect()
    }

    pub fn lhs(&self, handle: impl RowHandle) -> ProblemResult<&N> {
        self.row(handle).map(|r| &r.lhs)
    }

    pub fn rhs(&self, handle: impl RowHandle) -> ProblemResult<&N> {
        self.row(handle).map(|r| &r.rhs)
    }

    pub fn lower(&self, handle: impl ColHandle) -> ProblemResult<&N> {
        self.col(handle).map(|c| &c.lower)
    }

    pub fn upper(&self, handle: impl ColHandle) -> ProblemResult<&N> {
        self.col(handle).map(|c| &c.upper)
    }

    pub fn obj(&self, handle: impl ColHandle) -> ProblemResult<&N> {
        self.col(handle).map(|c| &c.obj)
    }

    pub fn coefficient(&self, row: impl RowHandle, col: impl ColHandle) -> ProblemResult<N> {
        let i = row.row_index(self)?;
        let j = col.col_index(self)?;
        Ok(self.rows[i].coeffs.get(j).cloned().unwrap_or_else(N::zero))
    }

    pub fn lhs_vec(&self) -> Vec<N> {
        self.rows.values().map(|r| r.lhs.clone()).collect()
    }

    pub fn rhs_vec(&self) -> Vec<N> {
        self.rows.values().map(|r| r.rhs.clone()).collect()
    }

    pub fn lower_vec(&self) -> Vec<N> {
        self.cols.values().map(|c| c.lower.clone()).collect()
    }

    pub fn upper_vec(&self) -> Vec<N> {
        self.cols.values().map(|c| c.upper.clone()).collect()
    }

    pub fn obj_vec(&self) -> Vec<N> {
        self.cols.values().map(|c| c.obj.clone()).collect()
    }

    /// Row activities `A x`.
    pub fn activity(&self, x: &[N]) -> ProblemResult<Vec<N>> {
        if x.len() != self.num_cols() {
            return Err(ProblemError::DimensionMismatch(format!(
                "primal vector length {} != {} columns",
                x.len(),
                self.num_cols()
            )));
        }
        Ok(self.rows.values().map(|r| r.coeffs.dot(x)).collect())
    }

    /// `A^T y`.
    pub fn transposed_activity(&self, y: &[N]) -> ProblemResult<Vec<N>> {
        if y.len() != self.num_rows() {
            return Err(ProblemError::DimensionMismatch(format!(
                "dual vector length {} != {} rows",
                y.len(),
                self.num_rows()
            )));
        }
        Ok(self.cols.values().map(|c| c.coeffs.dot(y)).collect())
    }

    /// Objective `c^T x + offset`.
    pub fn objective_value(&self, x: &[N]) -> N {
        self.cols
            .values()
            .zip(x.iter())
            .fold(self.obj_offset.clone(), |acc, (c, v)| {
                acc + c.obj.clone() * v.clone()
            })
    }

    pub fn add_row(&mut self, row: Row<N>) -> ProblemResult<RowId> {
        if let Some(max) = row.coeffs.max_index() {
            if max >= self.num_cols() {
                return Err(ProblemError::ColOutOfRange {
                    index: max,
                    len: self.num_cols(),
                });
            }
        }
        let index = self.num_rows();
        for (j, v) in row.coeffs.iter() {
            self.cols[j].coeffs.set(index, v.clone());
        }
        let id = RowId(self.next_row);
        self.next_row += 1;
        self.rows.insert(id, row);
        Ok(id)
    }

    /// Adds all rows or, when one references a missing column, none.
    pub fn add_rows(&mut self, rows: impl IntoIterator<Item = Row<N>>) -> ProblemResult<Vec<RowId>> {
        let rows: Vec<Row<N>> = rows.into_iter().collect();
        if let Some(max) = rows.iter().filter_map(|r| r.coeffs.max_index()).max() {
            if max >= self.num_cols() {
                return Err(ProblemError::ColOutOfRange {
                    index: max,
                    len: self.num_cols(),
                });
            }
        }
        rows.into_iter().map(|row| self.add_row(row)).collect()
    }

    pub fn add_col(&mut self, col: Column<N>) -> ProblemResult<ColId> {
        if let Some(max) = col.coeffs.max_index() {
            if max >= self.num_rows() {
                return Err(ProblemError::RowOutOfRange {
                    index: max,
                    len: self.num_rows(),
                });
            }
        }
        let index = self.num_cols();
        for (i, v) in col.coeffs.iter() {
            self.rows[i].coeffs.set(index, v.clone());
        }
        let id = ColId(self.next_col);
        self.next_col += 1;
        self.cols.insert(id, col);
        Ok(id)
    }

    /// Adds all columns or, when one references a missing row, none.
    pub fn add_cols(
        &mut self,
        cols: impl IntoIterator<Item = Column<N>>,
    ) -> ProblemResult<Vec<ColId>> {
        let cols: Vec<Column<N>> = cols.into_iter().collect();
        if let Some(max) = cols.iter().filter_map(|c| c.coeffs.max_index()).max() {
            if max >= self.num_rows() {
                return Err(ProblemError::RowOutOfRange {
                    index: max,
                    len: self.num_rows(),
                });
            }
        }
        cols.into_iter().map(|col| self.add_col(col)).collect()
    }

    pub fn change_lhs(&mut self, handle: impl RowHandle, lhs: N) -> ProblemResult<()> {
        let i = handle.row_index(self)?;
        self.rows[i].lhs = lhs;
        Ok(())
    }

    pub fn change_rhs(&mut self, handle: impl RowHandle, rhs: N) -> ProblemResult<()> {
        let i = handle.row_index(self)?;
        self.rows[i].rhs = rhs;
        Ok(())
    }

    pub fn change_range(&mut self, handle: impl RowHandle, lhs: N, rhs: N) -> ProblemResult<()> {
        let i = handle.row_index(self)?;
        let row = &mut self.rows[i];
        row.lhs = lhs;
        row.rhs = rhs;
        Ok(())
    }

    pub fn change_lower(&mut self, handle: impl ColHandle, lower: N) -> ProblemResult<()> {
        let j = handle.col_index(self)?;
        self.cols[j].lower = lower;
        Ok(())
    }

    pub fn change_upper(&mut self, handle: impl ColHandle, upper: N) -> ProblemResult<()> {
        let j = handle.col_index(self)?;
        self.cols[j].upper = upper;
        Ok(())
    }

    pub fn change_bounds(&mut self, handle: impl ColHandle, lower: N, upper: N) -> ProblemResult<()> {
        let j = handle.col_index(self)?;
        let col = &mut self.cols[j];
        col.lower = lower;
        col.upper = upper;
        Ok(())
    }

    pub fn change_obj(&mut self, handle: impl ColHandle, obj: N) -> ProblemResult<()> {
        let j = handle.col_index(self)?;
        self.cols[j].obj = obj;
        Ok(())
    }

    pub fn change_element(
        &mut self,
        row: impl RowHandle,
        col: impl ColHandle,
        value: N,
    ) -> ProblemResult<()> {
        let i = row.row_index(self)?;
        let j = col.col_index(self)?;
        self.rows[i].coeffs.set(j, value.clone());
        self.cols[j].coeffs.set(i, value);
        Ok(())
    }

    /// Replaces sides and coefficients of a row, keeping its identifier.
    pub fn change_row(&mut self, handle: impl RowHandle, row: Row<N>) -> ProblemResult<()> {
        let i = handle.row_index(self)?;
        if let Some(max) = row.coeffs.max_index() {
            if max >= self.num_cols() {
                return Err(ProblemError::ColOutOfRange {
                    index: max,
                    len: self.num_cols(),
                });
            }
        }
        let old: Vec<usize> = self.rows[i].coeffs.iter().map(|(j, _)| j).collect();
        for j in old {
            self.cols[j].coeffs.remove(i);
        }
        for (j, v) in row.coeffs.iter() {
            self.cols[j].coeffs.set(i, v.clone());
        }
        self.rows[i] = row;
        Ok(())
    }

    /// Replaces bounds, objective and coefficients of a column, keeping its identifier.
    pub fn change_col(&mut self, handle: impl ColHandle, col: Column<N>) -> ProblemResult<()> {
        let j = handle.col_index(self)?;
        if let Some(max) = col.coeffs.max_index() {
            if max >= self.num_rows() {
                return Err(ProblemError::RowOutOfRange {
                    index: max,
                    len: self.num_rows(),
                });
            }
        }
        let old: Vec<usize> = self.cols[j].coeffs.iter().map(|(i, _)| i).collect();
        for i in old {
            self.rows[i].coeffs.remove(j);
        }
        for (i, v) in col.coeffs.iter() {
            self.rows[i].coeffs.set(j, v.clone());
        }
        self.cols[j] = col;
        Ok(())
    }

    pub fn remove_row(&mut self, handle: impl RowHandle) -> ProblemResult<Vec<Option<usize>>> {
        let i = handle.row_index(self)?;
        self.remove_row_indices(&[i])
    }

    pub fn remove_col(&mut self, handle: impl ColHandle) -> ProblemResult<Vec<Option<usize>>> {
        let j = handle.col_index(self)?;
        self.remove_col_indices(&[j])
    }

    /// Removes several rows at once. Returns the old-to-new index permutation.
    pub fn remove_rows<H: RowHandle>(&mut self, handles: &[H]) -> ProblemResult<Vec<Option<usize>>> {
        let indices = handles
            .iter()
            .map(|h| h.row_index(self))
            .collect::<ProblemResult<Vec<_>>>()?;
        self.remove_row_indices(&indices)
    }

    pub fn remove_cols<H: ColHandle>(&mut self, handles: &[H]) -> ProblemResult<Vec<Option<usize>>> {
        let indices = handles
            .iter()
            .map(|h| h.col_index(self))
            .collect::<ProblemResult<Vec<_>>>()?;
        self.remove_col_indices(&indices)
    }

    pub fn remove_row_range(&mut self, range: Range<usize>) -> ProblemResult<Vec<Option<usize>>> {
        if range.start > range.end || range.end > self.num_rows() {
            return Err(ProblemError::RowOutOfRange {
                index: range.end,
                len: self.num_rows(),
            });
        }
        let indices: Vec<usize> = range.collect();
        self.remove_row_indices(&indices)
    }

    pub fn remove_col_range(&mut self, range: Range<usize>) -> ProblemResult<Vec<Option<usize>>> {
        if range.start > range.end || range.end > self.num_cols() {
            return Err(ProblemError::ColOutOfRange {
                index: range.end,
                len: self.num_cols(),
            });
        }
        let indices: Vec<usize> = range.collect();
        self.remove_col_indices(&indices)
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.cols.clear();
        self.obj_offset = N::zero();
    }

    fn remove_row_indices(&mut self, indices: &[usize]) -> ProblemResult<Vec<Option<usize>>> {
        let perm = removal_perm(self.num_rows(), indices);
        let doomed: HashSet<RowId> = indices
            .iter()
            .map(|&i| self.row_id(i))
            .collect::<ProblemResult<_>>()?;
        self.rows.retain(|id, _| !doomed.contains(id));
        for col in self.cols.values_mut() {
            col.coeffs.reindex(&perm);
        }
        Ok(perm)
    }

    fn remove_col_indices(&mut self, indices: &[usize]) -> ProblemResult<Vec<Option<usize>>> {
        let perm = removal_perm(self.num_cols(), indices);
        let doomed: HashSet<ColId> = indices
            .iter()
            .map(|&j| self.col_id(j))
            .collect::<ProblemResult<_>>()?;
        self.cols.retain(|id, _| !doomed.contains(id));
        for row in self.rows.values_mut() {
            row.coeffs.reindex(&perm);
        }
        Ok(perm)
    }

    /// Converts every value, keeping identifiers, order and the id counters.
    pub fn map_values<M: LpNumber>(&self, mut f: impl FnMut(&N) -> M) -> LinearProgram<M> {
        let rows = self
            .rows
            .iter()
            .map(|(id, r)| {
                (
                    *id,
                    Row {
                        lhs: f(&r.lhs),
                        rhs: f(&r.rhs),
                        coeffs: r.coeffs.map(&mut f),
                    },
                )
            })
            .collect();
        let cols = self
            .cols
            .iter()
            .map(|(id, c)| {
                (
                    *id,
                    Column {
                        lower: f(&c.lower),
                        upper: f(&c.upper),
                        obj: f(&c.obj),
                        coeffs: c.coeffs.map(&mut f),
                    },
                )
            })
            .collect();
        LinearProgram {
            sense: self.sense,
            obj_offset: f(&self.obj_offset),
            rows,
            cols,
            next_row: self.next_row,
            next_col: self.next_col,
        }
    }

    /// Checks that the row-wise and column-wise copies of the matrix agree.
    pub fn validate(&self) -> ProblemResult<()> {
        let mut row_nnz = 0usize;
        for (i, row) in self.rows.values().enumerate() {
            for (j, v) in row.coeffs.iter() {
                let mirrored = self.cols.get_index(j).and_then(|(_, c)| c.coeffs.get(i));
                if mirrored != Some(v) {
                    return Err(ProblemError::InvalidStructure(format!(
                        "row {i} entry for column {j} has no matching column entry"
                    )));
                }
                row_nnz += 1;
            }
        }
        if row_nnz != self.num_nonzeros() {
            return Err(ProblemError::InvalidStructure(format!(
                "{} row entries but {} column entries",
                row_nnz,
                self.num_nonzeros()
            )));
        }
        Ok(())
    }
}

fn removal_perm(len: usize, removed: &[usize]) -> Vec<Option<usize>> {
    let mut keep = vec![true; len];
    for &i in removed {
        if i < len {
            keep[i] = false;
        }
    }
    let mut next = 0;
    keep.into_iter()
        .map(|k| {
            k.then(|| {
                next += 1;
                next - 1
            })
        })
        .collect()
}

impl LinearProgram<f64> {
    /// Exact copy; magnitudes at or beyond `infinity` become the rational sentinel.
    pub fn to_rational(&self, infinity: f64) -> LinearProgram<BigRational> {
        self.map_values(|v| BigRational::from_real(*v, infinity))
    }

    /// Constraint matrix `A` in compressed sparse column form.
    pub fn to_csmat(&self) -> CsMat<f64> {
        let mut indptr = Vec::with_capacity(self.num_cols() + 1);
        let mut indices = Vec::with_capacity(self.num_nonzeros());
        let mut data = Vec::with_capacity(self.num_nonzeros());
        indptr.push(0);
        for col in self.cols.values() {
            for (i, v) in col.coeffs.iter() {
                indices.push(i);
                data.push(*v);
            }
            indptr.push(indices.len());
        }
        CsMat::new_csc((self.num_rows(), self.num_cols()), indptr, indices, data)
    }

    /// Multiplies entry `a_ij` by `rows[i] * cols[j]`, sides by `rows[i]`, bounds by
    /// `1 / cols[j]` and objective coefficients by `cols[j]`.
    pub fn rescale(&mut self, rows: &[f64], cols: &[f64]) -> ProblemResult<()> {
        if rows.len() != self.num_rows() || cols.len() != self.num_cols() {
            return Err(ProblemError::DimensionMismatch(format!(
                "scale factors {}x{} for a {}x{} problem",
                rows.len(),
                cols.len(),
                self.num_rows(),
                self.num_cols()
            )));
        }
        for (i, row) in self.rows.values_mut().enumerate() {
            row.lhs *= rows[i];
            row.rhs *= rows[i];
            let scaled = SparseVector::from_entries(
                row.coeffs.iter().map(|(j, v)| (j, v * rows[i] * cols[j])),
            );
            row.coeffs = scaled;
        }
        for (j, col) in self.cols.values_mut().enumerate() {
            col.lower /= cols[j];
            col.upper /= cols[j];
            col.obj *= cols[j];
            let scaled = SparseVector::from_entries(
                col.coeffs.iter().map(|(i, v)| (i, v * rows[i] * cols[j])),
            );
            col.coeffs = scaled;
        }
        Ok(())
    }
}

impl LinearProgram<BigRational> {
    /// Float copy; values at the rational sentinel become `±f64::INFINITY`.
    pub fn to_real(&self, infinity: f64) -> LinearProgram<f64> {
        self.map_values(|v| v.to_real(infinity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LinearProgram<f64> {
        let mut lp = LinearProgram::new(ObjSense::Minimize);
        for obj in [1.0, 2.0, 3.0] {
            lp.add_col(Column::new(obj, SparseVector::new(), 0.0, f64::INFINITY))
                .unwrap();
        }
        lp.add_row(Row::new(
            1.0,
            SparseVector::from_entries([(0, 1.0), (1, 1.0)]),
            f64::INFINITY,
        ))
        .unwrap();
        lp.add_row(Row::new(
            f64::NEG_INFINITY,
            SparseVector::from_entries([(1, 2.0), (2, -1.0)]),
            4.0,
        ))
        .unwrap();
        lp.add_row(Row::new(0.0, SparseVector::from_entries([(2, 5.0)]), 0.0))
            .unwrap();
        lp
    }

    #[test]
    fn sparse_vector_merges_and_drops_zeros() {
        let v = SparseVector::from_entries([(3, 1.0), (1, 2.0), (3, -1.0), (0, 0.0)]);
        assert_eq!(v.len(), 1);
        assert_eq!(v.get(1), Some(&2.0));
        assert_eq!(v.get(3), None);
    }

    #[test]
    fn both_orientations_agree() {
        let mut lp = sample();
        lp.validate().unwrap();
        lp.change_element(2usize, 0usize, 7.0).unwrap();
        lp.change_element(0usize, 1usize, 0.0).unwrap();
        lp.validate().unwrap();
        assert_eq!(lp.coefficient(2usize, 0usize).unwrap(), 7.0);
        assert_eq!(lp.col(1usize).unwrap().coeffs.get(0), None);
        assert_eq!(lp.num_nonzeros(), 5);
    }

    #[test]
    fn identifiers_survive_removal() {
        let mut lp = sample();
        let ids = lp.row_ids();
        let before: Vec<f64> = ids.iter().map(|id| *lp.rhs(*id).unwrap()).collect();
        let perm = lp.remove_row(1usize).unwrap();
        assert_eq!(perm, vec![Some(0), None, Some(1)]);
        assert!(matches!(lp.rhs(ids[1]), Err(ProblemError::UnknownRow(_))));
        assert_eq!(*lp.rhs(ids[0]).unwrap(), before[0]);
        assert_eq!(*lp.rhs(ids[2]).unwrap(), before[2]);
        assert_eq!(lp.row_index(ids[2]).unwrap(), 1);
        assert_eq!(lp.row_id(1).unwrap(), ids[2]);
        assert_eq!(lp.coefficient(ids[2], 2usize).unwrap(), 5.0);
        lp.validate().unwrap();
    }

    #[test]
    fn column_removal_reindexes_rows() {
        let mut lp = sample();
        let last = lp.col_id(2).unwrap();
        lp.remove_col(0usize).unwrap();
        assert_eq!(lp.num_cols(), 2);
        assert_eq!(lp.col_index(last).unwrap(), 1);
        assert_eq!(lp.coefficient(1usize, last).unwrap(), -1.0);
        lp.validate().unwrap();
    }

    #[test]
    fn remove_row_range_empties_rows() {
        let mut lp = sample();
        lp.remove_row_range(0..lp.num_rows()).unwrap();
        assert_eq!(lp.num_rows(), 0);
        assert_eq!(lp.num_nonzeros(), 0);
        assert_eq!(lp.num_cols(), 3);
        lp.validate().unwrap();
    }

    #[test]
    fn new_ids_are_never_reused() {
        let mut lp = sample();
        let old = lp.row_id(2).unwrap();
        lp.remove_row(old).unwrap();
        let fresh = lp
            .add_row(Row::new(0.0, SparseVector::new(), 1.0))
            .unwrap();
        assert_ne!(fresh, old);
    }

    #[test]
    fn bad_handles_are_rejected() {
        let mut lp = sample();
        assert_eq!(
            lp.change_obj(9usize, 1.0),
            Err(ProblemError::ColOutOfRange { index: 9, len: 3 })
        );
        assert!(lp
            .add_row(Row::new(0.0, SparseVector::from_entries([(5, 1.0)]), 1.0))
            .is_err());
    }

    #[test]
    fn batch_add_with_bad_entry_adds_nothing() {
        let mut lp = sample();
        let rows = [
            Row::new(0.0, SparseVector::from_entries([(0, 1.0)]), 1.0),
            Row::new(0.0, SparseVector::from_entries([(7, 1.0)]), 1.0),
        ];
        assert!(lp.add_rows(rows).is_err());
        assert_eq!(lp.num_rows(), 3);
        assert_eq!(lp.col(0usize).unwrap().coeffs.get(3), None);
        lp.validate().unwrap();
    }

    #[test]
    fn sync_round_trip_preserves_values() {
        let lp = sample();
        let exact = lp.to_rational(1e100);
        let back = exact.to_real(1e100);
        assert_eq!(back.row_ids(), lp.row_ids());
        assert_eq!(back.lhs_vec(), lp.lhs_vec());
        assert_eq!(back.rhs_vec(), lp.rhs_vec());
        assert_eq!(back.upper_vec(), lp.upper_vec());
        assert_eq!(back.coefficient(1usize, 2usize).unwrap(), -1.0);
    }

    #[test]
    fn csmat_matches_entries() {
        let mat = sample().to_csmat();
        assert_eq!(mat.shape(), (3, 3));
        assert_eq!(mat.nnz(), 5);
        assert_eq!(mat.get(1, 2), Some(&-1.0));
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarStatus {
    Basic,
    OnLower,
    OnUpper,
    Fixed,
    /// Free nonbasic variable sitting at zero.
    Zero,
}

impl VarStatus {
    pub fn is_basic(self) -> bool {
        matches!(self, VarStatus::Basic)
    }

    /// Nonbasic status matching which bounds are finite.
    pub fn nonbasic_for(lower_finite: bool, upper_finite: bool, fixed: bool) -> Self {
        match (lower_finite, upper_finite) {
            _ if fixed => VarStatus::Fixed,
            (true, _) => VarStatus::OnLower,
            (false, true) => VarStatus::OnUpper,
            (false, false) => VarStatus::Zero,
        }
    }
}

/// Status of every row (its logical variable) and every column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasisStatus {
    pub rows: Vec<VarStatus>,
    pub cols: Vec<VarStatus>,
}

impl BasisStatus {
    pub fn new(rows: Vec<VarStatus>, cols: Vec<VarStatus>) -> Self {
        Self { rows, cols }
    }

    /// All logicals basic, columns as given.
    pub fn slack(num_rows: usize, cols: Vec<VarStatus>) -> Self {
        Self {
            rows: vec![VarStatus::Basic; num_rows],
            cols,
        }
    }

    pub fn num_basic(&self) -> usize {
        self.rows
            .iter()
            .chain(self.cols.iter())
            .filter(|s| s.is_basic())
            .count()
    }

    /// Dimensions match and exactly `num_rows` entries are basic.
    pub fn is_consistent(&self, num_rows: usize, num_cols: usize) -> bool {
        self.rows.len() == num_rows && self.cols.len() == num_cols && self.num_basic() == num_rows
    }

    /// Drops rows removed from the problem; `perm` as returned by the removal.
    pub fn apply_row_perm(&mut self, perm: &[Option<usize>]) {
        self.rows = permute(&self.rows, perm);
    }

    pub fn apply_col_perm(&mut self, perm: &[Option<usize>]) {
        self.cols = permute(&self.cols, perm);
    }
}

fn permute(statuses: &[VarStatus], perm: &[Option<usize>]) -> Vec<VarStatus> {
    let len = perm.iter().flatten().count();
    let mut out = vec![VarStatus::Basic; len];
    for (old, new) in perm.iter().enumerate() {
        if let (Some(new), Some(status)) = (new, statuses.get(old)) {
            out[*new] = *status;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slack_basis_is_consistent() {
        let basis = BasisStatus::slack(2, vec![VarStatus::OnLower, VarStatus::Zero]);
        assert_eq!(basis.num_basic(), 2);
        assert!(basis.is_consistent(2, 2));
        assert!(!basis.is_consistent(3, 2));
    }

    #[test]
    fn nonbasic_status_follows_bounds() {
        assert_eq!(VarStatus::nonbasic_for(true, true, true), VarStatus::Fixed);
        assert_eq!(VarStatus::nonbasic_for(true, false, false), VarStatus::OnLower);
        assert_eq!(VarStatus::nonbasic_for(false, true, false), VarStatus::OnUpper);
        assert_eq!(VarStatus::nonbasic_for(false, false, false), VarStatus::Zero);
    }

    #[test]
    fn permutation_drops_removed_entries() {
        let mut basis = BasisStatus::new(
            vec![VarStatus::Basic, VarStatus::OnUpper, VarStatus::Fixed],
            vec![],
        );
        basis.apply_row_perm(&[Some(0), None, Some(1)]);
        assert_eq!(basis.rows, vec![VarStatus::Basic, VarStatus::Fixed]);
    }
}

use irlp_core::basis::{BasisStatus, VarStatus};
use irlp_core::options::StarterKind;
use irlp_core::problem::LinearProgram;
use ordered_float::OrderedFloat;

/// Produces a starting basis for the simplex engine.
pub trait Starter {
    fn name(&self) -> &'static str;

    /// `hint` is a primal point, when one is known.
    fn start(&self, lp: &LinearProgram<f64>, hint: Option<&[f64]>) -> BasisStatus;
}

pub fn nonbasic_status(lower: f64, upper: f64) -> VarStatus {
    VarStatus::nonbasic_for(lower.is_finite(), upper.is_finite(), lower == upper)
}

/// Every logical basic, every column at the bound closest to zero.
pub fn slack_basis(lp: &LinearProgram<f64>) -> BasisStatus {
    let cols = lp
        .cols()
        .map(|(_, col)| nonbasic_status(col.lower, col.upper))
        .collect();
    BasisStatus::slack(lp.num_rows(), cols)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SlackStarter;

impl Starter for SlackStarter {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn start(&self, lp: &LinearProgram<f64>, _hint: Option<&[f64]>) -> BasisStatus {
        slack_basis(lp)
    }
}

/// Replaces logicals by columns taken in `order`, keeping the basis triangular: a column
/// may claim a row only if no earlier chosen column touches it.
fn triangular_crash(lp: &LinearProgram<f64>, order: &[usize]) -> BasisStatus {
    let mut basis = slack_basis(lp);
    let mut touched = vec![false; lp.num_rows()];
    for (i, (_, row)) in lp.rows().enumerate() {
        // free rows keep their logical
        if !row.lhs.is_finite() && !row.rhs.is_finite() {
            touched[i] = true;
        }
    }
    for &j in order {
        let Ok(col) = lp.col(j) else { continue };
        let max = col.coeffs.iter().map(|(_, v)| v.abs()).fold(0.0, f64::max);
        if max == 0.0 {
            continue;
        }
        let pivot = col
            .coeffs
            .iter()
            .filter(|&(i, v)| !touched[i] && v.abs() >= 0.1 * max)
            .max_by_key(|&(i, v)| (OrderedFloat(v.abs()), std::cmp::Reverse(i)))
            .map(|(i, _)| i);
        let Some(row) = pivot.and_then(|i| lp.row(i).ok().map(|r| (i, r))) else {
            continue;
        };
        for (i, _) in col.coeffs.iter() {
            touched[i] = true;
        }
        basis.cols[j] = VarStatus::Basic;
        basis.rows[row.0] = nonbasic_status(row.1.lhs, row.1.rhs);
    }
    basis
}

/// Crash basis preferring free and wide columns, then cheap ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightStarter;

impl WeightStarter {
    fn weight(lower: f64, upper: f64, obj: f64, max_obj: f64) -> f64 {
        let kind = match (lower.is_finite(), upper.is_finite()) {
            (false, false) => 0.0,
            (true, false) | (false, true) => 1.0,
            (true, true) if lower == upper => f64::INFINITY,
            (true, true) => 2.0,
        };
        kind + obj.abs() / max_obj.max(1.0)
    }
}

impl Starter for WeightStarter {
    fn name(&self) -> &'static str {
        "weight"
    }

    fn start(&self, lp: &LinearProgram<f64>, _hint: Option<&[f64]>) -> BasisStatus {
        let max_obj = lp.cols().map(|(_, c)| c.obj.abs()).fold(0.0, f64::max);
        let mut scored: Vec<(usize, f64)> = lp
            .cols()
            .enumerate()
            .map(|(j, (_, c))| (j, Self::weight(c.lower, c.upper, c.obj, max_obj)))
            .filter(|(_, w)| w.is_finite())
            .collect();
        scored.sort_by_key(|&(j, w)| (OrderedFloat(w), j));
        let order: Vec<usize> = scored.into_iter().map(|(j, _)| j).collect();
        triangular_crash(lp, &order)
    }
}

/// Crash basis ordered by objective cost per unit of column activity.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumStarter;

impl Starter for SumStarter {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn start(&self, lp: &LinearProgram<f64>, _hint: Option<&[f64]>) -> BasisStatus {
        let mut scored: Vec<(usize, f64)> = lp
            .cols()
            .enumerate()
            .filter(|(_, (_, c))| c.lower != c.upper)
            .map(|(j, (_, c))| {
                let sum: f64 = c.coeffs.iter().map(|(_, v)| v.abs()).sum();
                (j, c.obj.abs() / sum.max(f64::MIN_POSITIVE))
            })
            .collect();
        scored.sort_by_key(|&(j, w)| (OrderedFloat(w), j));
        let order: Vec<usize> = scored.into_iter().map(|(j, _)| j).collect();
        triangular_crash(lp, &order)
    }
}

/// Crash basis from a primal point: columns strictly between their bounds go first,
/// the ones farthest from a bound leading. No point means the slack basis.
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorStarter;

impl Starter for VectorStarter {
    fn name(&self) -> &'static str {
        "vector"
    }

    fn start(&self, lp: &LinearProgram<f64>, hint: Option<&[f64]>) -> BasisStatus {
        let Some(x) = hint.filter(|x| x.len() == lp.num_cols()) else {
            return slack_basis(lp);
        };
        let mut scored: Vec<(usize, f64)> = lp
            .cols()
            .enumerate()
            .filter_map(|(j, (_, c))| {
                let slack = (x[j] - c.lower).min(c.upper - x[j]);
                (slack > 0.0).then_some((j, slack))
            })
            .collect();
        scored.sort_by_key(|&(j, s)| (std::cmp::Reverse(OrderedFloat(s)), j));
        let order: Vec<usize> = scored.into_iter().map(|(j, _)| j).collect();
        let mut basis = triangular_crash(lp, &order);
        for (j, (_, c)) in lp.cols().enumerate() {
            if basis.cols[j].is_basic() || c.lower == c.upper {
                continue;
            }
            // nonbasic columns go to the bound the point is closest to
            if c.upper.is_finite() && (!c.lower.is_finite() || c.upper - x[j] < x[j] - c.lower) {
                basis.cols[j] = VarStatus::OnUpper;
            }
        }
        basis
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AnyStarter {
    Slack(SlackStarter),
    Weight(WeightStarter),
    Sum(SumStarter),
    Vector(VectorStarter),
}

impl AnyStarter {
    pub fn from_kind(kind: StarterKind) -> Self {
        match kind {
            StarterKind::Off => AnyStarter::Slack(SlackStarter),
            StarterKind::Weight => AnyStarter::Weight(WeightStarter),
            StarterKind::Sum => AnyStarter::Sum(SumStarter),
            StarterKind::Vector => AnyStarter::Vector(VectorStarter),
        }
    }
}

impl Starter for AnyStarter {
    fn name(&self) -> &'static str {
        match self {
            AnyStarter::Slack(s) => s.name(),
            AnyStarter::Weight(s) => s.name(),
            AnyStarter::Sum(s) => s.name(),
            AnyStarter::Vector(s) => s.name(),
        }
    }

    fn start(&self, lp: &LinearProgram<f64>, hint: Option<&[f64]>) -> BasisStatus {
        match self {
            AnyStarter::Slack(s) => s.start(lp, hint),
            AnyStarter::Weight(s) => s.start(lp, hint),
            AnyStarter::Sum(s) => s.start(lp, hint),
            AnyStarter::Vector(s) => s.start(lp, hint),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irlp_core::problem::{Column, ObjSense, Row, SparseVector};

    fn lp() -> LinearProgram<f64> {
        let mut lp = LinearProgram::new(ObjSense::Minimize);
        lp.add_col(Column::new(1.0, SparseVector::new(), 0.0, f64::INFINITY))
            .unwrap();
        lp.add_col(Column::new(
            0.0,
            SparseVector::new(),
            f64::NEG_INFINITY,
            f64::INFINITY,
        ))
        .unwrap();
        lp.add_col(Column::new(2.0, SparseVector::new(), 1.0, 1.0))
            .unwrap();
        lp.add_row(Row::new(
            1.0,
            SparseVector::from_entries([(0, 1.0), (1, 1.0), (2, 1.0)]),
            4.0,
        ))
        .unwrap();
        lp.add_row(Row::new(
            f64::NEG_INFINITY,
            SparseVector::from_entries([(0, 2.0), (1, -1.0)]),
            3.0,
        ))
        .unwrap();
        lp
    }

    #[test]
    fn slack_basis_uses_finite_bounds() {
        let basis = SlackStarter.start(&lp(), None);
        assert_eq!(basis.rows, vec![VarStatus::Basic; 2]);
        assert_eq!(
            basis.cols,
            vec![VarStatus::OnLower, VarStatus::Zero, VarStatus::Fixed]
        );
    }

    #[test]
    fn crash_starters_keep_basis_size() {
        let lp = lp();
        for starter in [
            AnyStarter::from_kind(StarterKind::Weight),
            AnyStarter::from_kind(StarterKind::Sum),
            AnyStarter::from_kind(StarterKind::Vector),
        ] {
            let basis = starter.start(&lp, Some(&[1.0, 0.5, 1.0]));
            assert!(basis.is_consistent(2, 3), "{}", starter.name());
        }
    }

    #[test]
    fn weight_starter_makes_free_column_basic() {
        let basis = WeightStarter.start(&lp(), None);
        assert_eq!(basis.cols[1], VarStatus::Basic);
        assert_eq!(basis.cols[2], VarStatus::Fixed);
        // column 1 touches both rows, so only one logical leaves
        assert_eq!(basis.num_basic(), 2);
    }

    #[test]
    fn vector_starter_without_hint_is_slack() {
        let lp = lp();
        assert_eq!(VectorStarter.start(&lp, None), slack_basis(&lp));
    }
}

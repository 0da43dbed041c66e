use bitflags::bitflags;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Status {
    Optimal,
    Infeasible,
    Unbounded,
    AbortTime,
    AbortIter,
    AbortValue,
    /// Refinement limit or stall limit reached.
    AbortRefine,
    Singular,
    NoProblem,
    Error,
}

impl Status {
    /// Limit stop with best-effort results.
    pub fn is_abort(self) -> bool {
        matches!(
            self,
            Status::AbortTime | Status::AbortIter | Status::AbortValue | Status::AbortRefine
        )
    }

    /// Optimal, infeasible or unbounded.
    pub fn is_decided(self) -> bool {
        matches!(self, Status::Optimal | Status::Infeasible | Status::Unbounded)
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Status::Singular | Status::Error)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Availability: u8 {
        const HAS_PRIMAL = 0b0001;
        const HAS_PRIMAL_RAY = 0b0010;
        const HAS_DUAL = 0b0100;
        const HAS_DUAL_FARKAS = 0b1000;
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum PrimalPart<N> {
    #[default]
    None,
    Point { values: Vec<N>, slacks: Vec<N> },
    Ray(Vec<N>),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum DualPart<N> {
    #[default]
    None,
    Multipliers { dual: Vec<N>, reduced_costs: Vec<N> },
    Farkas(Vec<N>),
}

/// Everything a solve reports besides its status. Each side holds at most one of its
/// alternatives, so a point and a ray can never both be present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution<N> {
    pub primal: PrimalPart<N>,
    pub dual: DualPart<N>,
    pub objective: Option<N>,
    pub verified: bool,
}

impl<N> Default for Solution<N> {
    fn default() -> Self {
        Self {
            primal: PrimalPart::None,
            dual: DualPart::None,
            objective: None,
            verified: false,
        }
    }
}

impl<N> Solution<N> {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn availability(&self) -> Availability {
        let mut flags = Availability::empty();
        match self.primal {
            PrimalPart::Point { .. } => flags |= Availability::HAS_PRIMAL,
            PrimalPart::Ray(_) => flags |= Availability::HAS_PRIMAL_RAY,
            PrimalPart::None => {}
        }
        match self.dual {
            DualPart::Multipliers { .. } => flags |= Availability::HAS_DUAL,
            DualPart::Farkas(_) => flags |= Availability::HAS_DUAL_FARKAS,
            DualPart::None => {}
        }
        flags
    }

    pub fn primal(&self) -> Option<&[N]> {
        match &self.primal {
            PrimalPart::Point { values, .. } => Some(values),
            _ => None,
        }
    }

    pub fn slacks(&self) -> Option<&[N]> {
        match &self.primal {
            PrimalPart::Point { slacks, .. } => Some(slacks),
            _ => None,
        }
    }

    pub fn primal_ray(&self) -> Option<&[N]> {
        match &self.primal {
            PrimalPart::Ray(ray) => Some(ray),
            _ => None,
        }
    }

    pub fn dual(&self) -> Option<&[N]> {
        match &self.dual {
            DualPart::Multipliers { dual, .. } => Some(dual),
            _ => None,
        }
    }

    pub fn reduced_costs(&self) -> Option<&[N]> {
        match &self.dual {
            DualPart::Multipliers { reduced_costs, .. } => Some(reduced_costs),
            _ => None,
        }
    }

    pub fn dual_farkas(&self) -> Option<&[N]> {
        match &self.dual {
            DualPart::Farkas(ray) => Some(ray),
            _ => None,
        }
    }

    pub fn map<M>(self, mut f: impl FnMut(N) -> M) -> Solution<M> {
        let mut map_vec = |v: Vec<N>| v.into_iter().map(&mut f).collect::<Vec<M>>();
        let primal = match self.primal {
            PrimalPart::None => PrimalPart::None,
            PrimalPart::Point { values, slacks } => PrimalPart::Point {
                values: map_vec(values),
                slacks: map_vec(slacks),
            },
            PrimalPart::Ray(ray) => PrimalPart::Ray(map_vec(ray)),
        };
        let dual = match self.dual {
            DualPart::None => DualPart::None,
            DualPart::Multipliers {
                dual,
                reduced_costs,
            } => DualPart::Multipliers {
                dual: map_vec(dual),
                reduced_costs: map_vec(reduced_costs),
            },
            DualPart::Farkas(ray) => DualPart::Farkas(map_vec(ray)),
        };
        let objective = self.objective.map(&mut f);
        Solution {
            primal,
            dual,
            objective,
            verified: self.verified,
        }
    }
}

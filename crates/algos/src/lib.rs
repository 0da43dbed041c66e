#![forbid(unsafe_code)]

pub mod float;
pub mod pricing;
pub mod ratio;
pub mod refinement;
pub mod simplex;
pub mod starter;
pub mod transform;
pub mod violation;

pub use float::{solve_float, solve_float_with};
pub use refinement::{solve_exact, ExactOutcome, IrError, IterativeRefinement, Phase};
pub use simplex::{FloatOutcome, SimplexEngine, SimplexError};
pub use violation::{check_ray, farkas_proves_infeasible, violations, RayCheck, Violations};

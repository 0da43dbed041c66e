#![forbid(unsafe_code)]

pub mod basis;
pub mod math;
pub mod options;
pub mod presolve;
pub mod problem;
pub mod rational;
pub mod scaling;
pub mod solution;
pub mod stats;
pub mod traits;

pub use basis::*;
pub use math::*;
pub use options::*;
pub use presolve::*;
pub use problem::*;
pub use rational::*;
pub use scaling::*;
pub use solution::*;
pub use stats::*;
pub use traits::*;

#![forbid(unsafe_code)]

pub mod exact;
pub mod factor;

pub use exact::RationalLu;
pub use factor::{BasisFactor, FactorError, FactorResult, SparseColumn};

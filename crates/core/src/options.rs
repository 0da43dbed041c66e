use crate::rational::Rational;
use num_bigint::BigInt;
use num_traits::Signed;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("parameter `{name}` out of range: {reason}")]
    OutOfRange { name: &'static str, reason: String },
    #[error("inconsistent parameters: {0}")]
    Inconsistent(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Representation {
    #[default]
    Column,
    Row,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Algorithm {
    Enter,
    #[default]
    Leave,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum FactorUpdate {
    Eta,
    #[default]
    ForrestTomlin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SimplifierKind {
    Off,
    #[default]
    Auto,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ScalerKind {
    Off,
    UniEqui,
    #[default]
    BiEqui,
    Geo1,
    Geo8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum StarterKind {
    #[default]
    Off,
    Weight,
    Sum,
    Vector,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PricerKind {
    #[default]
    Auto,
    Dantzig,
    ParMult,
    Devex,
    QuickSteep,
    Steep,
    Hybrid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum RatioTesterKind {
    Textbook,
    Harris,
    Fast,
    #[default]
    BoundFlipping,
}

/// Output levels, least to most talkative.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    Error,
    Warning,
    Debug,
    #[default]
    Normal,
    High,
    Full,
}

impl Verbosity {
    pub fn allows(self, level: Verbosity) -> bool {
        self >= level
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SyncMode {
    #[default]
    Auto,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverParams {
    pub partial_pricing: bool,

    pub representation: Representation,
    pub algorithm: Algorithm,
    pub factor_update: FactorUpdate,
    pub simplifier: SimplifierKind,
    pub scaler: ScalerKind,
    pub starter: StarterKind,
    pub pricer: PricerKind,
    pub ratio_tester: RatioTesterKind,
    pub verbosity: Verbosity,
    pub sync_mode: SyncMode,

    /// Updates applied before the basis is refactorized.
    pub factor_update_max: usize,
    pub iter_limit: Option<usize>,
    pub ref_limit: Option<usize>,
    pub stall_ref_limit: Option<usize>,
    /// Iterations between progress events.
    pub display_freq: usize,

    pub epsilon_zero: f64,
    pub epsilon_factorization: f64,
    pub epsilon_update: f64,
    pub epsilon_pivot: f64,
    pub infinity: f64,
    pub time_limit: Option<Duration>,
    /// Maximization stops once the dual bound falls to this value. `None` is no limit.
    pub obj_limit_lower: Option<f64>,
    /// Minimization stops once the dual bound reaches this value. `None` is no limit.
    pub obj_limit_upper: Option<f64>,
    pub fp_feastol: f64,
    pub fp_opttol: f64,
    pub max_scale_incr: f64,
    /// Problems with at most this many rows plus columns use steepest edge under the hybrid pricer.
    pub hybrid_size_threshold: usize,
    /// Density above which the hybrid pricer switches from devex to partial multiple pricing.
    pub hybrid_density_threshold: f64,
    pub partial_pricing_size: usize,

    pub feastol: Rational,
    pub opttol: Rational,
    pub rational_factorization: bool,
    pub rational_factor_max_dim: usize,
}

impl Default for SolverParams {
    fn default() -> Self {
        let tol = Rational::new(BigInt::from(1), BigInt::from(1_000_000_000));
        Self {
            partial_pricing: false,
            representation: Representation::default(),
            algorithm: Algorithm::default(),
            factor_update: FactorUpdate::default(),
            simplifier: SimplifierKind::default(),
            scaler: ScalerKind::default(),
            starter: StarterKind::default(),
            pricer: PricerKind::default(),
            ratio_tester: RatioTesterKind::default(),
            verbosity: Verbosity::default(),
            sync_mode: SyncMode::default(),
            factor_update_max: 200,
            iter_limit: None,
            ref_limit: None,
            stall_ref_limit: Some(5),
            display_freq: 200,
            epsilon_zero: 1e-16,
            epsilon_factorization: 1e-11,
            epsilon_update: 1e-16,
            epsilon_pivot: 1e-10,
            infinity: 1e100,
            time_limit: None,
            obj_limit_lower: None,
            obj_limit_upper: None,
            fp_feastol: 1e-9,
            fp_opttol: 1e-9,
            max_scale_incr: 1e25,
            hybrid_size_threshold: 2_000,
            hybrid_density_threshold: 0.1,
            partial_pricing_size: 100,
            feastol: tol.clone(),
            opttol: tol,
            rational_factorization: true,
            rational_factor_max_dim: 400,
        }
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<(), ParamError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ParamError::OutOfRange {
            name,
            reason: format!("{value} is not a positive finite number"),
        })
    }
}

impl SolverParams {
    pub fn with_tolerances(feastol: Rational, opttol: Rational) -> Self {
        Self {
            feastol,
            opttol,
            ..Self::default()
        }
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn with_iter_limit(mut self, limit: usize) -> Self {
        self.iter_limit = Some(limit);
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm, representation: Representation) -> Self {
        self.algorithm = algorithm;
        self.representation = representation;
        self
    }

    pub fn with_pricer(mut self, pricer: PricerKind) -> Self {
        self.pricer = pricer;
        self
    }

    pub fn with_ratio_tester(mut self, ratio_tester: RatioTesterKind) -> Self {
        self.ratio_tester = ratio_tester;
        self
    }

    pub fn with_preprocessing(mut self, scaler: ScalerKind, simplifier: SimplifierKind) -> Self {
        self.scaler = scaler;
        self.simplifier = simplifier;
        self
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        for (name, value) in [
            ("epsilon_zero", self.epsilon_zero),
            ("epsilon_factorization", self.epsilon_factorization),
            ("epsilon_update", self.epsilon_update),
            ("epsilon_pivot", self.epsilon_pivot),
            ("fp_feastol", self.fp_feastol),
            ("fp_opttol", self.fp_opttol),
            ("infinity", self.infinity),
            ("max_scale_incr", self.max_scale_incr),
        ] {
            check_positive(name, value)?;
        }
        if self.epsilon_zero >= 1.0 || self.epsilon_pivot >= 1.0 {
            return Err(ParamError::Inconsistent(
                "zero and pivot tolerances must be below 1".into(),
            ));
        }
        if self.infinity <= 1.0 / self.epsilon_zero.max(f64::MIN_POSITIVE).sqrt() {
            return Err(ParamError::OutOfRange {
                name: "infinity",
                reason: format!(
                    "{} does not exceed the inverse square root of epsilon_zero",
                    self.infinity
                ),
            });
        }
        if self.max_scale_incr <= 1.0 {
            return Err(ParamError::OutOfRange {
                name: "max_scale_incr",
                reason: "must exceed 1".into(),
            });
        }
        let lower = self.obj_limit_lower.unwrap_or(f64::NEG_INFINITY);
        let upper = self.obj_limit_upper.unwrap_or(f64::INFINITY);
        if lower.is_nan() || upper.is_nan() || lower > upper {
            return Err(ParamError::Inconsistent(format!(
                "objective limits [{lower}, {upper}] are not an interval"
            )));
        }
        if self.factor_update_max == 0 {
            return Err(ParamError::OutOfRange {
                name: "factor_update_max",
                reason: "at least one update is required".into(),
            });
        }
        if self.display_freq == 0 || self.partial_pricing_size == 0 {
            return Err(ParamError::OutOfRange {
                name: "display_freq/partial_pricing_size",
                reason: "must be positive".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.hybrid_density_threshold) {
            return Err(ParamError::OutOfRange {
                name: "hybrid_density_threshold",
                reason: format!("{} is not in [0, 1]", self.hybrid_density_threshold),
            });
        }
        if self.feastol.is_negative() || self.opttol.is_negative() {
            return Err(ParamError::OutOfRange {
                name: "feastol/opttol",
                reason: "exact tolerances must be nonnegative".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SolverParams::default().validate().unwrap();
    }

    #[test]
    fn rejects_inverted_objective_limits() {
        let params = SolverParams {
            obj_limit_lower: Some(5.0),
            obj_limit_upper: Some(1.0),
            ..SolverParams::default()
        };
        assert!(matches!(params.validate(), Err(ParamError::Inconsistent(_))));
    }

    #[test]
    fn rejects_nonpositive_tolerances() {
        let params = SolverParams {
            fp_feastol: 0.0,
            ..SolverParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ParamError::OutOfRange { name: "fp_feastol", .. })
        ));
        let params = SolverParams::with_tolerances(
            Rational::from_integer((-1).into()),
            Rational::from_integer(0.into()),
        );
        assert!(params.validate().is_err());
    }

    #[test]
    fn small_infinity_is_rejected() {
        let params = SolverParams {
            infinity: 100.0,
            ..SolverParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn verbosity_is_ordered() {
        assert!(Verbosity::High.allows(Verbosity::Normal));
        assert!(!Verbosity::Warning.allows(Verbosity::Normal));
    }

    #[test]
    fn params_serialize() {
        let params = SolverParams::default().with_pricer(PricerKind::Steep);
        let json = serde_json::to_string(&params).unwrap();
        let back: SolverParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pricer, PricerKind::Steep);
        assert_eq!(back.feastol, params.feastol);
        assert_eq!(back.obj_limit_upper, None);

        let limited = SolverParams {
            obj_limit_lower: Some(-2.5),
            ..SolverParams::default()
        };
        let json = serde_json::to_string(&limited).unwrap();
        let back: SolverParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back.obj_limit_lower, Some(-2.5));
        assert_eq!(back.obj_limit_upper, None);
        back.validate().unwrap();
    }
}

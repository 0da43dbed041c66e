use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive, Zero};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type Real = f64;

/// Number type a [`LinearProgram`](crate::problem::LinearProgram) can be stored in.
///
/// Floats carry a true infinity. Rationals have none, so they use `±infinity` (the
/// `infinity` parameter as an exact value) as a sentinel and every test is `|v| >= infinity`.
pub trait LpNumber:
    Clone + PartialOrd + Signed + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    fn from_real(value: f64, infinity: f64) -> Self;

    fn to_real(&self, infinity: f64) -> f64;

    fn infinity(infinity: f64) -> Self;

    fn is_infinite_at(&self, infinity: f64) -> bool;
}

impl LpNumber for f64 {
    fn from_real(value: f64, infinity: f64) -> Self {
        if value >= infinity {
            f64::INFINITY
        } else if value <= -infinity {
            f64::NEG_INFINITY
        } else {
            value
        }
    }

    fn to_real(&self, infinity: f64) -> f64 {
        Self::from_real(*self, infinity)
    }

    fn infinity(_infinity: f64) -> Self {
        f64::INFINITY
    }

    fn is_infinite_at(&self, infinity: f64) -> bool {
        self.abs() >= infinity
    }
}

impl LpNumber for BigRational {
    fn from_real(value: f64, infinity: f64) -> Self {
        if value >= infinity {
            Self::infinity(infinity)
        } else if value <= -infinity {
            -Self::infinity(infinity)
        } else {
            BigRational::from_float(value).unwrap_or_else(BigRational::zero)
        }
    }

    fn to_real(&self, infinity: f64) -> f64 {
        if self.is_infinite_at(infinity) {
            if self.is_negative() {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            }
        } else {
            self.to_f64().unwrap_or(0.0)
        }
    }

    fn infinity(infinity: f64) -> Self {
        BigRational::from_float(infinity.min(f64::MAX)).unwrap_or_else(BigRational::zero)
    }

    fn is_infinite_at(&self, infinity: f64) -> bool {
        self.abs() >= Self::infinity(infinity)
    }
}

pub fn dot(lhs: &[f64], rhs: &[f64]) -> f64 {
    assert_eq!(lhs.len(), rhs.len(), "dot product dimension mismatch");
    lhs.iter().zip(rhs.iter()).map(|(a, b)| a * b).sum()
}

pub fn norm_inf(data: &[f64]) -> f64 {
    data.iter().fold(0.0, |acc: f64, v| acc.max(v.abs()))
}

/// Nearest power of two to a positive finite `value`; anything else maps to 1.
pub fn nearest_power_of_two(value: f64) -> f64 {
    if !value.is_finite() || value <= 0.0 {
        return 1.0;
    }
    let exp = value.log2().round().clamp(-1000.0, 1000.0) as i32;
    2f64.powi(exp)
}

#[derive(Debug, Clone)]
pub struct Timer {
    origin: Instant,
    accumulated: Duration,
    running: bool,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
            accumulated: Duration::ZERO,
            running: true,
        }
    }

    pub fn stopped() -> Self {
        Self {
            origin: Instant::now(),
            accumulated: Duration::ZERO,
            running: false,
        }
    }

    pub fn stop(&mut self) -> Duration {
        if self.running {
            self.accumulated += self.origin.elapsed();
            self.running = false;
        }
        self.accumulated
    }

    pub fn resume(&mut self) {
        if !self.running {
            self.origin = Instant::now();
            self.running = true;
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.accumulated
            + if self.running {
                self.origin.elapsed()
            } else {
                Duration::ZERO
            }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::stopped()
    }
}

/// Cooperative stop request shared between a caller and a running solve.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

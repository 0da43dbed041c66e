use crate::math::LpNumber;
use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use thiserror::Error;

pub type Rational = BigRational;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseRationalError {
    #[error("empty number")]
    Empty,
    #[error("malformed number `{0}`")]
    Malformed(String),
    #[error("zero denominator in `{0}`")]
    ZeroDenominator(String),
}

/// The exact stand-in for ±infinity in rational problems.
#[derive(Debug, Clone, PartialEq)]
pub struct ExactInfinity {
    value: Rational,
}

impl ExactInfinity {
    pub fn new(infinity: f64) -> Self {
        Self {
            value: Rational::infinity(infinity),
        }
    }

    pub fn pos(&self) -> Rational {
        self.value.clone()
    }

    pub fn neg(&self) -> Rational {
        -self.value.clone()
    }

    pub fn is_infinite(&self, value: &Rational) -> bool {
        value.abs() >= self.value
    }

    pub fn is_pos_infinite(&self, value: &Rational) -> bool {
        *value >= self.value
    }

    pub fn is_neg_infinite(&self, value: &Rational) -> bool {
        -value.clone() >= self.value
    }

    pub fn value(&self) -> &Rational {
        &self.value
    }
}

impl Default for ExactInfinity {
    fn default() -> Self {
        Self::new(1e100)
    }
}

pub fn rational_from_int(value: i64) -> Rational {
    Rational::from_integer(BigInt::from(value))
}

/// `2^exp` as an exact rational.
pub fn pow2(exp: i64) -> Rational {
    let magnitude = BigInt::one() << exp.unsigned_abs() as usize;
    if exp >= 0 {
        Rational::from_integer(magnitude)
    } else {
        Rational::new(BigInt::one(), magnitude)
    }
}

/// Approximates `floor(log2(|value|))` from the bit lengths of numerator and denominator.
/// Off by at most one, which is all the refinement scaling needs.
pub fn log2_estimate(value: &Rational) -> i64 {
    if value.is_zero() {
        return i64::MIN;
    }
    value.numer().bits() as i64 - value.denom().bits() as i64
}

pub fn max_abs(values: &[Rational]) -> Rational {
    values.iter().fold(Rational::zero(), |acc, v| {
        let a = v.abs();
        if a > acc {
            a
        } else {
            acc
        }
    })
}

/// Parses integers, fractions `p/q`, decimals with an optional exponent, and `inf`.
pub fn parse_rational(text: &str, infinity: &ExactInfinity) -> Result<Rational, ParseRationalError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseRationalError::Empty);
    }
    let (negative, body) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let lowered = body.to_ascii_lowercase();
    if lowered == "inf" || lowered == "infinity" {
        return Ok(if negative { infinity.neg() } else { infinity.pos() });
    }
    let magnitude = if let Some((num, den)) = body.split_once('/') {
        let numer = parse_integer(num, trimmed)?;
        let denom = parse_integer(den, trimmed)?;
        if denom.is_zero() {
            return Err(ParseRationalError::ZeroDenominator(trimmed.to_string()));
        }
        Rational::new(numer, denom)
    } else {
        parse_decimal(body, trimmed)?
    };
    Ok(if negative { -magnitude } else { magnitude })
}

fn parse_integer(digits: &str, whole: &str) -> Result<BigInt, ParseRationalError> {
    let digits = digits.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseRationalError::Malformed(whole.to_string()));
    }
    digits
        .parse::<BigInt>()
        .map_err(|_| ParseRationalError::Malformed(whole.to_string()))
}

fn parse_decimal(body: &str, whole: &str) -> Result<Rational, ParseRationalError> {
    let malformed = || ParseRationalError::Malformed(whole.to_string());
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(pos) => {
            let exp: i64 = body[pos + 1..].parse().map_err(|_| malformed())?;
            (&body[..pos], exp)
        }
        None => (body, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(malformed());
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let digits = format!("{int_part}{frac_part}");
    let numer: BigInt = digits.parse().map_err(|_| malformed())?;
    let shift = exponent - frac_part.len() as i64;
    let ten = BigInt::from(10);
    let scale = num_traits::pow(ten, shift.unsigned_abs() as usize);
    Ok(if shift >= 0 {
        Rational::from_integer(numer * scale)
    } else {
        Rational::new(numer, scale)
    })
}

/// Integers print plainly, everything else as a reduced fraction.
pub fn format_rational(value: &Rational) -> String {
    if value.denom().is_one() {
        value.numer().to_string()
    } else {
        let reduced = value.reduced();
        debug_assert!(reduced.denom().gcd(reduced.numer()).is_one());
        format!("{}/{}", reduced.numer(), reduced.denom())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(n: i64, d: i64) -> Rational {
        Rational::new(BigInt::from(n), BigInt::from(d))
    }

    #[test]
    fn parses_exact_decimals() {
        let inf = ExactInfinity::default();
        assert_eq!(parse_rational("0.1", &inf).unwrap(), q(1, 10));
        assert_eq!(parse_rational("-2.50", &inf).unwrap(), q(-5, 2));
        assert_eq!(parse_rational("1.5e2", &inf).unwrap(), q(150, 1));
        assert_eq!(parse_rational("25E-2", &inf).unwrap(), q(1, 4));
        assert_eq!(parse_rational(".5", &inf).unwrap(), q(1, 2));
    }

    #[test]
    fn parses_fractions_and_infinity() {
        let inf = ExactInfinity::default();
        assert_eq!(parse_rational("3/6", &inf).unwrap(), q(1, 2));
        assert_eq!(parse_rational("-inf", &inf).unwrap(), inf.neg());
        assert!(inf.is_pos_infinite(&parse_rational("Infinity", &inf).unwrap()));
    }

    #[test]
    fn rejects_garbage() {
        let inf = ExactInfinity::default();
        assert_eq!(parse_rational("", &inf), Err(ParseRationalError::Empty));
        assert!(matches!(
            parse_rational("1/0", &inf),
            Err(ParseRationalError::ZeroDenominator(_))
        ));
        assert!(matches!(
            parse_rational("1.2.3", &inf),
            Err(ParseRationalError::Malformed(_))
        ));
        assert!(matches!(
            parse_rational("abc", &inf),
            Err(ParseRationalError::Malformed(_))
        ));
    }

    #[test]
    fn powers_of_two_are_exact() {
        assert_eq!(pow2(3), q(8, 1));
        assert_eq!(pow2(-2), q(1, 4));
        assert_eq!(pow2(0), q(1, 1));
        assert_eq!(log2_estimate(&q(1, 1024)), -10);
        assert_eq!(log2_estimate(&q(1024, 1)), 10);
    }

    #[test]
    fn formats_reduced() {
        assert_eq!(format_rational(&q(4, 2)), "2");
        assert_eq!(format_rational(&q(-3, 9)), "-1/3");
    }
}

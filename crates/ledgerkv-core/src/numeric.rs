use std::{cmp::Ordering, fmt::Display};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("rational value with a zero denominator")]
    ZeroDenominator,
    #[error("numeric overflow: {0}")]
    Overflow(String),
}

/// Fixed-point rational number, `num / denom`.
///
/// The denominator is always positive; the sign lives in the numerator.
/// Equality and ordering are exact, so `1/2 == 2/4`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "RawNumeric")]
pub struct Numeric {
    num: i64,
    denom: i64,
}

#[derive(Deserialize)]
struct RawNumeric {
    num: i64,
    denom: i64,
}

impl TryFrom<RawNumeric> for Numeric {
    type Error = ValueError;

    fn try_from(raw: RawNumeric) -> Result<Self, Self::Error> {
        Numeric::new(raw.num, raw.denom)
    }
}

impl Numeric {
    pub fn new(num: i64, denom: i64) -> Result<Self, ValueError> {
        if denom == 0 {
            return Err(ValueError::ZeroDenominator);
        }
        if denom < 0 {
            let overflow = || ValueError::Overflow(format!("{}/{}", num, denom));
            return Ok(Self {
                num: num.checked_neg().ok_or_else(overflow)?,
                denom: denom.checked_neg().ok_or_else(overflow)?,
            });
        }
        Ok(Self { num, denom })
    }

    pub fn from_int(value: i64) -> Self {
        Self { num: value, denom: 1 }
    }

    pub fn zero() -> Self {
        Self::from_int(0)
    }

    pub fn num(&self) -> i64 {
        self.num
    }

    pub fn denom(&self) -> i64 {
        self.denom
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    /// Converts to a decimal, rounding when the quotient does not terminate
    /// within `Decimal`'s 28 digits of precision.
    pub fn to_decimal(&self) -> Option<Decimal> {
        Decimal::from(self.num).checked_div(Decimal::from(self.denom))
    }

    /// Exact conversion from a decimal: `12.345` becomes `12345/1000`.
    pub fn from_decimal(value: Decimal) -> Result<Self, ValueError> {
        let overflow = || ValueError::Overflow(value.to_string());
        let num = i64::try_from(value.mantissa()).map_err(|_| overflow())?;
        let denom = 10i64.checked_pow(value.scale()).ok_or_else(overflow)?;
        Numeric::new(num, denom)
    }
}

impl Ord for Numeric {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.num as i128 * other.denom as i128;
        let rhs = other.num as i128 * self.denom as i128;
        lhs.cmp(&rhs)
    }
}

impl PartialOrd for Numeric {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Numeric {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Numeric {}

impl Default for Numeric {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<i64> for Numeric {
    fn from(value: i64) -> Self {
        Self::from_int(value)
    }
}

impl Display for Numeric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.denom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_zero_denominator_rejected() {
        assert_eq!(Numeric::new(1, 0), Err(ValueError::ZeroDenominator));
    }

    #[test]
    fn test_sign_moves_to_numerator() {
        let n = Numeric::new(3, -4).unwrap();
        assert_eq!(n.num(), -3);
        assert_eq!(n.denom(), 4);
        assert!(Numeric::new(1, i64::MIN).is_err());
    }

    #[test]
    fn test_equal_fractions_compare_equal() {
        let half = Numeric::new(1, 2).unwrap();
        let two_quarters = Numeric::new(2, 4).unwrap();
        assert_eq!(half, two_quarters);
        assert!(Numeric::new(1, 3).unwrap() < half);
        assert!(Numeric::new(-1, 2).unwrap() < Numeric::zero());
    }

    #[test]
    fn test_compare_does_not_overflow() {
        let big = Numeric::new(i64::MAX, 3).unwrap();
        let bigger = Numeric::new(i64::MAX, 2).unwrap();
        assert!(big < bigger);
    }

    #[test]
    fn test_decimal_conversion() {
        let n = Numeric::from_decimal(Decimal::from_str("12.345").unwrap()).unwrap();
        assert_eq!(n.num(), 12345);
        assert_eq!(n.denom(), 1000);
        assert_eq!(n.to_decimal().unwrap().to_string(), "12.345");
        assert_eq!(Numeric::new(1, 4).unwrap().to_decimal().unwrap().to_string(), "0.25");
    }
}

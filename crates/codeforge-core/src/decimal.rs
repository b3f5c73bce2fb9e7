//! Exact scaled decimal arithmetic.
//!
//! Money-like fields need arithmetic without binary floating point drift:
//! `100.95 / 4` must be exactly `25.2375`. A [`Decimal`] is an i128 mantissa
//! plus a decimal scale (number of fractional digits). Division extends the
//! scale until the remainder is exhausted, up to [`Decimal::MAX_SCALE`]
//! digits, then rounds half to even.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::str::FromStr;

use thiserror::Error;

/// Error parsing a decimal literal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecimalParseError {
    /// The literal was empty or contained non-digit characters.
    #[error("invalid decimal literal '{0}'")]
    Invalid(String),
    /// The literal has more fractional digits than a decimal can carry.
    #[error("decimal literal '{0}' exceeds maximum scale")]
    ScaleOverflow(String),
}

/// An exact decimal number: `mantissa * 10^(-scale)`.
#[derive(Clone, Copy, Debug)]
pub struct Decimal {
    mantissa: i128,
    scale: u32,
}

impl Decimal {
    /// Maximum number of fractional digits carried.
    pub const MAX_SCALE: u32 = 28;

    /// Zero.
    pub const ZERO: Decimal = Decimal {
        mantissa: 0,
        scale: 0,
    };

    /// Build from a raw mantissa and scale.
    pub const fn from_parts(mantissa: i128, scale: u32) -> Self {
        Self { mantissa, scale }
    }

    /// Build from an integer.
    pub const fn from_int(value: i64) -> Self {
        Self {
            mantissa: value as i128,
            scale: 0,
        }
    }

    /// Raw mantissa.
    pub const fn mantissa(self) -> i128 {
        self.mantissa
    }

    /// Number of fractional digits.
    pub const fn scale(self) -> u32 {
        self.scale
    }

    /// Check for zero regardless of scale.
    pub const fn is_zero(self) -> bool {
        self.mantissa == 0
    }

    /// Rescale both operands to a common scale.
    fn align(a: Decimal, b: Decimal) -> (i128, i128, u32) {
        if a.scale == b.scale {
            (a.mantissa, b.mantissa, a.scale)
        } else if a.scale > b.scale {
            let factor = pow10(a.scale - b.scale);
            (a.mantissa, b.mantissa * factor, a.scale)
        } else {
            let factor = pow10(b.scale - a.scale);
            (a.mantissa * factor, b.mantissa, b.scale)
        }
    }

    /// Exact division, extending the scale as needed.
    ///
    /// Returns `None` on division by zero. If the quotient does not
    /// terminate within [`Self::MAX_SCALE`] digits it is rounded half to
    /// even on the last digit.
    pub fn checked_div(self, rhs: Decimal) -> Option<Decimal> {
        if rhs.mantissa == 0 {
            return None;
        }

        // Normalize to a common scale so the integer quotient is exact.
        let (lhs, rhs_m, _) = Self::align(self, rhs);

        let negative = (lhs < 0) != (rhs_m < 0);
        let mut rem = lhs.unsigned_abs();
        let divisor = rhs_m.unsigned_abs();

        let mut mantissa = rem / divisor;
        rem %= divisor;
        let mut scale = 0u32;

        while rem != 0 && scale < Self::MAX_SCALE {
            rem *= 10;
            mantissa = mantissa * 10 + rem / divisor;
            rem %= divisor;
            scale += 1;
        }

        if rem != 0 {
            // Round half to even on the digit past MAX_SCALE.
            let next = rem * 10 / divisor;
            if next > 5 || (next == 5 && mantissa % 2 == 1) {
                mantissa += 1;
            }
        }

        let signed = if negative {
            -(mantissa as i128)
        } else {
            mantissa as i128
        };
        Some(Decimal {
            mantissa: signed,
            scale,
        })
    }

    /// Strip trailing fractional zeros (value-preserving).
    pub fn normalize(self) -> Decimal {
        let mut mantissa = self.mantissa;
        let mut scale = self.scale;
        while scale > 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            scale -= 1;
        }
        Decimal { mantissa, scale }
    }
}

fn pow10(exp: u32) -> i128 {
    10i128.pow(exp)
}

impl Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        let (a, b, scale) = Decimal::align(self, rhs);
        Decimal {
            mantissa: a + b,
            scale,
        }
    }
}

impl Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        let (a, b, scale) = Decimal::align(self, rhs);
        Decimal {
            mantissa: a - b,
            scale,
        }
    }
}

impl Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal {
            mantissa: self.mantissa * rhs.mantissa,
            scale: self.scale + rhs.scale,
        }
        .normalize()
    }
}

impl Div for Decimal {
    type Output = Decimal;

    /// Panics on division by zero, like integer division.
    fn div(self, rhs: Decimal) -> Decimal {
        self.checked_div(rhs).expect("decimal division by zero")
    }
}

impl Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal {
            mantissa: -self.mantissa,
            scale: self.scale,
        }
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Decimal) -> bool {
        let (a, b, _) = Decimal::align(*self, *other);
        a == b
    }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Decimal) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Decimal) -> std::cmp::Ordering {
        let (a, b, _) = Decimal::align(*self, *other);
        a.cmp(&b)
    }
}

impl std::hash::Hash for Decimal {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        let n = self.normalize();
        n.mantissa.hash(state);
        n.scale.hash(state);
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Decimal::from_int(value)
    }
}

impl FromStr for Decimal {
    type Err = DecimalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DecimalParseError::Invalid(s.to_string());

        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        if digits.is_empty() {
            return Err(invalid());
        }

        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if frac_part.len() as u32 > Decimal::MAX_SCALE {
            return Err(DecimalParseError::ScaleOverflow(s.to_string()));
        }

        let mut mantissa: i128 = 0;
        for ch in int_part.chars().chain(frac_part.chars()) {
            let digit = ch.to_digit(10).ok_or_else(invalid)?;
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(digit as i128))
                .ok_or_else(invalid)?;
        }
        if negative {
            mantissa = -mantissa;
        }

        Ok(Decimal {
            mantissa,
            scale: frac_part.len() as u32,
        })
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.mantissa);
        }
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let abs = self.mantissa.unsigned_abs();
        let factor = pow10(self.scale) as u128;
        let int_part = abs / factor;
        let frac_part = abs % factor;
        write!(
            f,
            "{sign}{int_part}.{frac:0width$}",
            frac = frac_part,
            width = self.scale as usize
        )
    }
}

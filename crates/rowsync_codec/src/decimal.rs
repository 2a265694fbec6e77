//! Exact fixed-point decimal values.

use crate::error::{CodecError, CodecResult};
use std::fmt;
use std::str::FromStr;

/// A fixed-point decimal number: `mantissa * 10^-scale`.
///
/// Decimals are compared structurally, so `1.0` and `1.00` are different
/// values. This keeps encode/decode exact: the scale a producer wrote is the
/// scale a consumer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa: i128,
    scale: u8,
}

impl Decimal {
    /// Largest supported scale (number of fractional digits).
    pub const MAX_SCALE: u8 = 28;

    /// Creates a decimal from a mantissa and a scale.
    pub fn new(mantissa: i128, scale: u8) -> CodecResult<Self> {
        if scale > Self::MAX_SCALE {
            return Err(CodecError::invalid_decimal(format!(
                "scale {} exceeds {}",
                scale,
                Self::MAX_SCALE
            )));
        }
        Ok(Self { mantissa, scale })
    }

    /// Creates an integral decimal.
    pub fn from_i64(value: i64) -> Self {
        Self {
            mantissa: i128::from(value),
            scale: 0,
        }
    }

    /// Returns the unscaled mantissa.
    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    /// Returns the number of fractional digits.
    pub fn scale(&self) -> u8 {
        self.scale
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.unsigned_abs().to_string();
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let scale = usize::from(self.scale);

        if scale == 0 {
            return write!(f, "{}{}", sign, digits);
        }

        let padded = if digits.len() <= scale {
            format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits)
        } else {
            digits
        };
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{}{}.{}", sign, int_part, frac_part)
    }
}

impl FromStr for Decimal {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, body) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };

        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(CodecError::invalid_decimal(format!("empty literal {:?}", s)));
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(CodecError::invalid_decimal(format!("not a number: {:?}", s)));
        }

        let scale = u8::try_from(frac_part.len())
            .ok()
            .filter(|scale| *scale <= Self::MAX_SCALE)
            .ok_or_else(|| CodecError::invalid_decimal(format!("too many digits: {:?}", s)))?;

        let digits = format!("{}{}", int_part, frac_part);
        let out_of_range = || CodecError::invalid_decimal(format!("out of range: {:?}", s));
        let magnitude: u128 = if digits.is_empty() {
            0
        } else {
            digits.parse().map_err(|_| out_of_range())?
        };

        // The magnitude of i128::MIN does not fit in a positive i128.
        let mantissa = if negative {
            0i128.checked_sub_unsigned(magnitude)
        } else {
            i128::try_from(magnitude).ok()
        }
        .ok_or_else(out_of_range)?;

        Decimal::new(mantissa, scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_pads_fraction() {
        assert_eq!(Decimal::new(12345, 2).unwrap().to_string(), "123.45");
        assert_eq!(Decimal::new(5, 3).unwrap().to_string(), "0.005");
        assert_eq!(Decimal::new(-5, 3).unwrap().to_string(), "-0.005");
        assert_eq!(Decimal::new(42, 0).unwrap().to_string(), "42");
        assert_eq!(Decimal::new(0, 2).unwrap().to_string(), "0.00");
    }

    #[test]
    fn parse_keeps_scale() {
        let d: Decimal = "1.50".parse().unwrap();
        assert_eq!(d.mantissa(), 150);
        assert_eq!(d.scale(), 2);

        let d: Decimal = "-0.005".parse().unwrap();
        assert_eq!(d.mantissa(), -5);
        assert_eq!(d.scale(), 3);

        let d: Decimal = ".5".parse().unwrap();
        assert_eq!(d, Decimal::new(5, 1).unwrap());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<Decimal>().is_err());
        assert!("1.2.3".parse::<Decimal>().is_err());
        assert!("abc".parse::<Decimal>().is_err());
        assert!("0.00000000000000000000000000001".parse::<Decimal>().is_err());
    }

    #[test]
    fn text_form_is_exact() {
        for literal in ["0", "-1", "79228162514264337593543950335", "3.1415926535", "-0.10"] {
            let d: Decimal = literal.parse().unwrap();
            assert_eq!(d.to_string(), literal);
        }
    }

    #[test]
    fn extreme_mantissas_parse_back() {
        for mantissa in [i128::MIN, i128::MAX, i128::MIN + 1] {
            for scale in [0, 4, Decimal::MAX_SCALE] {
                let d = Decimal::new(mantissa, scale).unwrap();
                assert_eq!(d.to_string().parse::<Decimal>().unwrap(), d);
            }
        }
        assert!("170141183460469231731687303715884105728".parse::<Decimal>().is_err());
        assert!("-170141183460469231731687303715884105729".parse::<Decimal>().is_err());
    }

    #[test]
    fn scale_limit() {
        assert!(Decimal::new(1, 29).is_err());
        assert!(Decimal::new(1, 28).is_ok());
    }
}

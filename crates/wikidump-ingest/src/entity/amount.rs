//! Arbitrary-precision quantity amounts
//!
//! Amounts travel as decimal strings with a mandatory sign (`"+5"`,
//! `"-0.25"`). Decoding keeps full precision; encoding drops trailing zeros
//! so the rendered scale is the smallest one that still represents the value
//! exactly.

use super::{CodecError, Result};
use bigdecimal::BigDecimal;
use num_bigint::Sign;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Exact signed decimal amount
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(BigDecimal);

impl Amount {
    pub fn new(value: BigDecimal) -> Self {
        Self(value)
    }

    pub fn as_decimal(&self) -> &BigDecimal {
        &self.0
    }

    pub fn into_decimal(self) -> BigDecimal {
        self.0
    }

    /// Parse an amount numeral; the leading sign is optional on input
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || CodecError::InvalidNumber(text.to_string());

        let unsigned = text
            .strip_prefix('+')
            .or_else(|| text.strip_prefix('-'))
            .unwrap_or(text);
        if !is_decimal_numeral(unsigned) {
            return Err(invalid());
        }

        let value = BigDecimal::from_str(unsigned).map_err(|_| invalid())?;
        Ok(Self(if text.starts_with('-') { -value } else { value }))
    }

    /// Render with an explicit sign and no superfluous trailing zeros
    pub fn encode(&self) -> String {
        let normalized = self.0.normalized();
        let (digits, scale) = normalized.as_bigint_and_exponent();

        let sign = if digits.sign() == Sign::Minus { '-' } else { '+' };
        let mut magnitude = digits.magnitude().to_string();

        if scale <= 0 {
            // Integral value stored with a positive exponent, e.g. 12E+3.
            if magnitude != "0" {
                magnitude.extend(std::iter::repeat('0').take(scale.unsigned_abs() as usize));
            }
            return format!("{}{}", sign, magnitude);
        }

        let scale = scale as usize;
        if magnitude.len() <= scale {
            let padding = "0".repeat(scale - magnitude.len());
            format!("{}0.{}{}", sign, padding, magnitude)
        } else {
            let (int_part, frac_part) = magnitude.split_at(magnitude.len() - scale);
            format!("{}{}.{}", sign, int_part, frac_part)
        }
    }
}

/// `digits` or `digits.digits`, ASCII only; exponents are not part of the wire form
fn is_decimal_numeral(text: &str) -> bool {
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    match text.split_once('.') {
        Some((int_part, frac_part)) => all_digits(int_part) && all_digits(frac_part),
        None => all_digits(text),
    }
}

impl FromStr for Amount {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self> {
        Amount::parse(s)
    }
}

impl From<BigDecimal> for Amount {
    fn from(value: BigDecimal) -> Self {
        Self(value)
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self(BigDecimal::from(value))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Amount::parse(&text).map_err(de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_positive_integer_gets_plus_sign() {
        assert_eq!(Amount::from(5).encode(), "+5");
    }

    #[test]
    fn test_zero_is_positive() {
        assert_eq!(Amount::parse("0").unwrap().encode(), "+0");
        assert_eq!(Amount::parse("-0").unwrap().encode(), "+0");
        assert_eq!(Amount::parse("+0.000").unwrap().encode(), "+0");
    }

    #[test]
    fn test_negative_fraction() {
        assert_eq!(Amount::parse("-0.25").unwrap().encode(), "-0.25");
        assert_eq!(Amount::parse("-0.0025").unwrap().encode(), "-0.0025");
    }

    #[test]
    fn test_trailing_zeros_are_dropped() {
        assert_eq!(Amount::parse("+1.50").unwrap().encode(), "+1.5");
        assert_eq!(Amount::parse("+1200").unwrap().encode(), "+1200");
        assert_eq!(Amount::parse("+1200.00").unwrap().encode(), "+1200");
    }

    #[test]
    fn test_large_values_keep_precision() {
        let text = "+123456789012345678901234567890.000000000000000000001";
        assert_eq!(Amount::parse(text).unwrap().encode(), text);
    }

    #[test]
    fn test_equality_ignores_scale() {
        assert_eq!(Amount::parse("+1.50").unwrap(), Amount::parse("1.5").unwrap());
    }

    #[test]
    fn test_malformed_numerals_are_rejected() {
        for text in [
            "", "+", "-", "abc", "+-1", "1.2.3", "++1", "+e5", "+1e100000000000000000", "1E5",
            "+1.5e-3", ".5", "5.", "+١٢", " 1",
        ] {
            let err = Amount::parse(text).unwrap_err();
            assert!(matches!(err, CodecError::InvalidNumber(ref s) if s == text), "{}", text);
        }
    }

    #[test]
    fn test_serde_uses_signed_string() {
        let amount: Amount = serde_json::from_str(r#""-17.5""#).unwrap();
        assert_eq!(serde_json::to_string(&amount).unwrap(), r#""-17.5""#);
        assert!(serde_json::from_str::<Amount>("17").is_err());
    }

    proptest! {
        #[test]
        fn prop_encode_is_signed_and_reversible(int in any::<i64>(), scale in 0i64..12) {
            let amount = Amount::new(BigDecimal::new(int.into(), scale));
            let encoded = amount.encode();
            prop_assert!(encoded.starts_with('+') || encoded.starts_with('-'));
            prop_assert_eq!(Amount::parse(&encoded).unwrap(), amount);
        }
    }
}

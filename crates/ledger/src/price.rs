use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockrecon_core::{DomainError, DomainResult, ValueObject};

/// Number of decimal places every price carries.
pub const PRICE_SCALE: u32 = 2;

/// Largest representable price: ten digits, two of them decimals.
fn max_price() -> Decimal {
    Decimal::new(9_999_999_999, PRICE_SCALE)
}

/// Fixed-point unit price with exactly two decimal places.
///
/// Constructed only through validating constructors, so a `Price` in hand is
/// always non-negative, within `0.00..=99999999.99`, and carries scale 2
/// (`120` and `120.00` are the same price).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl ValueObject for Price {}

impl Price {
    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value < Decimal::ZERO {
            return Err(DomainError::validation("price cannot be negative"));
        }
        if value.normalize().scale() > PRICE_SCALE {
            return Err(DomainError::validation(format!(
                "price {value} has more than {PRICE_SCALE} decimal places"
            )));
        }
        if value > max_price() {
            return Err(DomainError::validation(format!(
                "price {value} exceeds the maximum of {}",
                max_price()
            )));
        }

        let mut scaled = value;
        scaled.rescale(PRICE_SCALE);
        Ok(Self(scaled))
    }

    pub fn zero() -> Self {
        Self(Decimal::new(0, PRICE_SCALE))
    }

    /// Parse the canonical form, e.g. `"1234.56"`.
    pub fn parse(input: &str) -> DomainResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("price is required"));
        }
        let value = Decimal::from_str(trimmed)
            .map_err(|_| DomainError::validation(format!("invalid price '{trimmed}'")))?;
        Self::new(value)
    }

    /// Parse the localized catalog form, e.g. `"1.234,56"`.
    ///
    /// `.` groups thousands and is dropped, `,` is the decimal separator.
    /// A blank field means `0.00`.
    pub fn parse_localized(input: &str) -> DomainResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::zero());
        }
        let numeric = trimmed.replace('.', "").replace(',', ".");
        let value = Decimal::from_str(&numeric).map_err(|_| {
            DomainError::validation(format!("invalid price '{trimmed}' (expected e.g. 55,99)"))
        })?;
        Self::new(value)
    }

    /// Parse user input: localized rules when it contains a comma, canonical otherwise.
    pub fn parse_input(input: &str) -> DomainResult<Self> {
        if input.contains(',') {
            Self::parse_localized(input)
        } else {
            Self::parse(input)
        }
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Price {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(value: Price) -> Self {
        value.0
    }
}

impl FromStr for Price {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl core::fmt::Display for Price {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn normalizes_to_two_decimal_places() {
        let a = Price::new(dec("120")).unwrap();
        let b = Price::new(dec("120.00")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "120.00");
        assert_eq!(a.as_decimal().scale(), 2);
    }

    #[test]
    fn trailing_zeros_beyond_scale_are_accepted() {
        let p = Price::new(dec("9.500")).unwrap();
        assert_eq!(p.to_string(), "9.50");
    }

    #[test]
    fn rejects_negative_and_overprecise_values() {
        assert!(matches!(Price::new(dec("-0.01")), Err(DomainError::Validation(_))));
        assert!(matches!(Price::new(dec("1.001")), Err(DomainError::Validation(_))));
        assert!(matches!(Price::new(dec("100000000.00")), Err(DomainError::Validation(_))));
        assert!(Price::new(dec("99999999.99")).is_ok());
    }

    #[test]
    fn parses_canonical_form() {
        assert_eq!(Price::parse(" 55.99 ").unwrap().to_string(), "55.99");
        assert!(Price::parse("").is_err());
        assert!(Price::parse("abc").is_err());
    }

    #[test]
    fn parses_localized_form() {
        assert_eq!(Price::parse_localized("55,99").unwrap().to_string(), "55.99");
        assert_eq!(Price::parse_localized("1.234,56").unwrap().to_string(), "1234.56");
        assert_eq!(Price::parse_localized("   ").unwrap(), Price::zero());
        assert!(matches!(Price::parse_localized("12,ab"), Err(DomainError::Validation(_))));
    }

    #[test]
    fn input_parsing_picks_rules_by_separator() {
        assert_eq!(Price::parse_input("1.234,50").unwrap().to_string(), "1234.50");
        assert_eq!(Price::parse_input("1234.50").unwrap().to_string(), "1234.50");
    }

    #[test]
    fn serde_revalidates() {
        let json = serde_json::to_string(&Price::parse("100.00").unwrap()).unwrap();
        assert_eq!(json, "\"100.00\"");

        let back: Price = serde_json::from_str(&json).unwrap();
        assert_eq!(back.to_string(), "100.00");

        assert!(serde_json::from_str::<Price>("\"-5\"").is_err());
    }
}

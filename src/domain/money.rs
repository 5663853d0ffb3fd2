//! Exact monetary amounts held as integer minor units.
//!
//! The CRM reports amounts as JSON numbers or decimal strings. Every amount is
//! converted once (`major * 100`, rounded) and all arithmetic afterwards is
//! integer arithmetic, so balances that accumulate over many payments never
//! pick up binary floating-point drift.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Amount in minor units (cents)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    #[must_use]
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Convert a major-unit amount, rounding to the nearest minor unit.
    ///
    /// Returns `None` for non-finite values and for amounts whose minor-unit
    /// count does not fit in an `i64`.
    #[must_use]
    pub fn from_major(major: f64) -> Option<Self> {
        let minor = (major * 100.0).round();
        if !minor.is_finite() || minor.abs() >= MINOR_LIMIT {
            return None;
        }
        Some(Self(minor as i64))
    }

    /// Line total for a (possibly fractional) quantity at this unit price
    #[must_use]
    pub fn times_quantity(self, quantity: f64) -> Self {
        Self((self.0 as f64 * quantity).round() as i64)
    }

    #[must_use]
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }
}

/// 2^63; float minor-unit counts at or beyond this do not fit in an `i64`
const MINOR_LIMIT: f64 = 9_223_372_036_854_775_808.0;

/// Saturates at the `i64` bounds; use [`Money::checked_add`] where overflow must be seen
impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        *self = *self + rhs;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl FromStr for Money {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<f64>()
            .ok()
            .and_then(Self::from_major)
            .ok_or_else(|| format!("Invalid monetary amount: {}", s))
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Number(f64),
    Text(String),
}

impl RawAmount {
    fn into_money<E: serde::de::Error>(self) -> Result<Option<Money>, E> {
        match self {
            RawAmount::Number(n) => Money::from_major(n)
                .map(Some)
                .ok_or_else(|| E::custom(format!("monetary amount out of range: {}", n))),
            RawAmount::Text(s) if s.trim().is_empty() => Ok(None),
            RawAmount::Text(s) => s.parse().map(Some).map_err(E::custom),
        }
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawAmount::deserialize(deserializer)?
            .into_money::<D::Error>()?
            .ok_or_else(|| serde::de::Error::custom("empty monetary amount"))
    }
}

/// Deserialize an optional amount where `null` and `""` both mean absent
pub fn deserialize_optional<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Money>, D::Error> {
    match Option::<RawAmount>::deserialize(deserializer)? {
        Some(raw) => raw.into_money(),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_accumulation_is_exact() {
        let mut balance = Money::from_major(10.10).unwrap();
        for _ in 0..3 {
            balance += Money::from_major(0.20).unwrap();
        }
        assert_eq!(balance, Money::from_minor(1070));
        assert_eq!(balance.to_string(), "10.70");
    }

    #[test]
    fn test_float_drift_is_absorbed_by_rounding() {
        // 0.1 + 0.2 == 0.30000000000000004 in binary floating point
        let sum = Money::from_major(0.1).unwrap() + Money::from_major(0.2).unwrap();
        assert_eq!(sum.to_string(), "0.30");
    }

    #[test]
    fn test_display_pads_minor_units() {
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
        assert_eq!(Money::from_minor(150_000).to_string(), "1500.00");
        assert_eq!(Money::from_minor(-250).to_string(), "-2.50");
    }

    #[test]
    fn test_parse_from_str() {
        assert_eq!("1500.5".parse::<Money>().unwrap(), Money::from_minor(150_050));
        assert_eq!(" 3.50 ".parse::<Money>().unwrap(), Money::from_minor(350));
        assert!("abc".parse::<Money>().is_err());
        assert!("inf".parse::<Money>().is_err());
    }

    #[test]
    fn test_times_quantity() {
        assert_eq!(Money::from_minor(500).times_quantity(2.0), Money::from_minor(1000));
        assert_eq!(Money::from_minor(999).times_quantity(1.5), Money::from_minor(1499));
        assert_eq!(Money::from_minor(350).times_quantity(0.0), Money::ZERO);
    }

    #[test]
    fn test_sum() {
        let total: Money = [Money::from_minor(1000), Money::from_minor(350)].iter().sum();
        assert_eq!(total.to_string(), "13.50");
    }

    #[test]
    fn test_deserialize_number_and_string() {
        let from_number: Money = serde_json::from_str("12.3").unwrap();
        let from_string: Money = serde_json::from_str("\"12.30\"").unwrap();
        assert_eq!(from_number, from_string);
        assert!(serde_json::from_str::<Money>("\"\"").is_err());
    }

    #[test]
    fn test_serialize_as_two_decimal_string() {
        let json = serde_json::to_string(&Money::from_minor(1070)).unwrap();
        assert_eq!(json, "\"10.70\"");
    }

    #[test]
    fn test_out_of_range_amounts_are_rejected() {
        assert!(Money::from_major(1e30).is_none());
        assert!(Money::from_major(f64::NAN).is_none());
        assert!("1e30".parse::<Money>().is_err());
        assert!(serde_json::from_str::<Money>("1e30").is_err());
        assert_eq!(Money::from_major(-2.5), Some(Money::from_minor(-250)));
    }

    #[test]
    fn test_addition_overflow() {
        let near_max = Money::from_minor(i64::MAX - 1);
        assert_eq!(near_max.checked_add(Money::from_minor(2)), None);
        assert_eq!(near_max + Money::from_minor(2), Money::from_minor(i64::MAX));
        assert_eq!(
            Money::from_minor(1).checked_add(Money::from_minor(2)),
            Some(Money::from_minor(3))
        );
    }
}

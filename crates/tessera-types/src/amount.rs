use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

pub const TESS_DECIMALS: u32 = 18;
pub const TESS_BASE_UNIT: u128 = 1_000_000_000_000_000_000; // 10^18

/// Token quantity in base units. u128 because assigned license amounts are
/// whole-token counts scaled by 10^18 and overflow u64.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TokenAmount(u128);

impl TokenAmount {
    pub const ZERO: Self = Self(0);

    pub fn from_whole(tokens: u128) -> Self {
        Self(tokens.saturating_mul(TESS_BASE_UNIT))
    }

    pub fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    pub fn to_base_units(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn min(&self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    /// `self * num / den` with flooring division. Callers keep `num` small
    /// (availability and adoption weights are at most 255, share weights at
    /// most 10_000) so the intermediate product stays far below u128::MAX.
    pub fn mul_div(&self, num: u128, den: u128) -> Self {
        debug_assert!(den > 0);
        Self(self.0 / den * num + self.0 % den * num / den)
    }
}

impl Sum for TokenAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, v| acc.saturating_add(v))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / TESS_BASE_UNIT;
        let frac = self.0 % TESS_BASE_UNIT;
        if frac == 0 {
            write!(f, "{} TESS", whole)
        } else {
            write!(f, "{}.{:018} TESS", whole, frac)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_floors() {
        let amount = TokenAmount::from_base_units(1000);
        assert_eq!(amount.mul_div(255, 255), amount);
        assert_eq!(amount.mul_div(0, 255), TokenAmount::ZERO);
        // 1000 * 130 / 255 = 509.8.. floors to 509
        assert_eq!(amount.mul_div(130, 255), TokenAmount::from_base_units(509));
    }

    #[test]
    fn test_mul_div_no_overflow_at_scale() {
        // Largest realistic assigned amount times the largest weight.
        let assigned = TokenAmount::from_whole(1_000_000_000);
        let weighted = assigned.mul_div(255, 255);
        assert_eq!(weighted, assigned);
    }

    #[test]
    fn test_checked_sub_underflow() {
        let a = TokenAmount::from_base_units(1);
        let b = TokenAmount::from_base_units(2);
        assert!(a.checked_sub(b).is_none());
        assert_eq!(a.saturating_sub(b), TokenAmount::ZERO);
    }

    #[test]
    fn test_display() {
        assert_eq!(TokenAmount::from_whole(42).to_string(), "42 TESS");
        assert_eq!(
            TokenAmount::from_base_units(TESS_BASE_UNIT + 5).to_string(),
            "1.000000000000000005 TESS"
        );
    }
}

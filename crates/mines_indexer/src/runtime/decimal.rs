//! Fixed-point decimal over wad-scaled integers.
//!
//! Values are kept as an integer numerator over `10^18`, so converting an
//! on-chain wad into a decimal never loses precision. Conversions that do
//! drop precision (`whole_units`, `scale_down_truncating`) truncate toward
//! zero, matching on-chain integer division.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::IndexerError;

pub const WAD_DECIMALS: usize = 18;

/// `10^18`.
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Integer-domain division by the wad scale.
pub fn scale_down_truncating(raw: U256) -> U256 {
    raw / WAD
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FixedPointDecimal {
    wad: U256,
}

impl FixedPointDecimal {
    pub const fn zero() -> Self {
        Self { wad: U256::ZERO }
    }

    pub const fn one() -> Self {
        Self { wad: WAD }
    }

    /// Scale a raw wad down into decimal form. Exact for every input.
    pub const fn from_wad(wad: U256) -> Self {
        Self { wad }
    }

    pub fn from_whole(units: U256) -> Result<Self, IndexerError> {
        let wad = units
            .checked_mul(WAD)
            .ok_or_else(|| IndexerError::arithmetic(format!("{units} whole units overflow")))?;
        Ok(Self { wad })
    }

    pub fn wad(&self) -> U256 {
        self.wad
    }

    /// Whole-unit part, truncated.
    pub fn whole_units(&self) -> U256 {
        scale_down_truncating(self.wad)
    }

    pub fn is_zero(&self) -> bool {
        self.wad.is_zero()
    }

    pub fn checked_add(&self, other: &Self) -> Result<Self, IndexerError> {
        self.wad
            .checked_add(other.wad)
            .map(Self::from_wad)
            .ok_or_else(|| IndexerError::arithmetic(format!("{self} + {other} overflows")))
    }

    pub fn checked_sub(&self, other: &Self) -> Result<Self, IndexerError> {
        self.wad
            .checked_sub(other.wad)
            .map(Self::from_wad)
            .ok_or_else(|| IndexerError::arithmetic(format!("{self} - {other} is negative")))
    }

    pub fn checked_mul_scalar(&self, factor: U256) -> Result<Self, IndexerError> {
        self.wad
            .checked_mul(factor)
            .map(Self::from_wad)
            .ok_or_else(|| IndexerError::arithmetic(format!("{self} * {factor} overflows")))
    }
}

impl fmt::Display for FixedPointDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.wad / WAD;
        let fraction = self.wad % WAD;
        if fraction.is_zero() {
            return write!(f, "{whole}");
        }
        let digits = format!("{:0>width$}", fraction.to_string(), width = WAD_DECIMALS);
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for FixedPointDecimal {
    type Err = IndexerError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| IndexerError::arithmetic(format!("{reason}: {input:?}"));
        let trimmed = input.trim();
        let (whole, fraction) = match trimmed.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (trimmed, ""),
        };
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("invalid whole part"));
        }
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("invalid fractional part"));
        }
        if fraction.len() > WAD_DECIMALS {
            return Err(invalid("more than 18 fractional digits"));
        }
        let whole = U256::from_str_radix(whole, 10).map_err(|_| invalid("whole part overflows"))?;
        let padded = format!("{fraction:0<width$}", width = WAD_DECIMALS);
        let fraction =
            U256::from_str_radix(&padded, 10).map_err(|_| invalid("invalid fractional part"))?;
        let value = Self::from_whole(whole)?;
        value.checked_add(&Self::from_wad(fraction))
    }
}

impl TryFrom<String> for FixedPointDecimal {
    type Error = IndexerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FixedPointDecimal> for String {
    fn from(value: FixedPointDecimal) -> Self {
        value.to_string()
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Human size strings for partition requests
//!
//! Grammar: an unsigned integer immediately followed by one of `MiB`, `GiB`,
//! `MB` or `GB` (case-insensitive). Nothing else is accepted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A size string that does not match the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid size '{token}': {reason}")]
pub struct ParseSizeError {
    pub token: String,
    pub reason: &'static str,
}

impl ParseSizeError {
    fn new(token: &str, reason: &'static str) -> Self {
        Self {
            token: token.to_string(),
            reason,
        }
    }
}

/// Units accepted by [`SizeSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeUnit {
    MiB,
    GiB,
    /// Decimal megabytes; converted lossily.
    MB,
    /// Decimal gigabytes; converted lossily.
    GB,
}

impl SizeUnit {
    pub fn suffix(self) -> &'static str {
        match self {
            SizeUnit::MiB => "MiB",
            SizeUnit::GiB => "GiB",
            SizeUnit::MB => "MB",
            SizeUnit::GB => "GB",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.to_ascii_lowercase().as_str() {
            "mib" => Some(SizeUnit::MiB),
            "gib" => Some(SizeUnit::GiB),
            "mb" => Some(SizeUnit::MB),
            "gb" => Some(SizeUnit::GB),
            _ => None,
        }
    }
}

/// A requested partition size: a value and the unit it was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SizeSpec {
    pub value: u64,
    pub unit: SizeUnit,
}

impl SizeSpec {
    pub const fn mib(value: u64) -> Self {
        Self {
            value,
            unit: SizeUnit::MiB,
        }
    }

    pub const fn gib(value: u64) -> Self {
        Self {
            value,
            unit: SizeUnit::GiB,
        }
    }

    /// Absolute size in MiB.
    ///
    /// `MB` and `GB` use integer division and therefore round down
    /// (`500MB` is 488 MiB).
    pub fn to_mib(&self) -> u64 {
        match self.unit {
            SizeUnit::MiB => self.value,
            SizeUnit::GiB => self.value * 1024,
            SizeUnit::MB => self.value * 1000 / 1024,
            SizeUnit::GB => self.value * 1_000_000 / 1024,
        }
    }

    fn multiplier(unit: SizeUnit) -> u64 {
        match unit {
            SizeUnit::MiB => 1,
            SizeUnit::GiB => 1024,
            SizeUnit::MB => 1000,
            SizeUnit::GB => 1_000_000,
        }
    }
}

impl FromStr for SizeSpec {
    type Err = ParseSizeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let split = input
            .find(|character: char| !character.is_ascii_digit())
            .ok_or_else(|| ParseSizeError::new(input, "missing unit (MiB, GiB, MB or GB)"))?;
        let (digits, suffix) = input.split_at(split);

        if digits.is_empty() {
            return Err(ParseSizeError::new(input, "expected an integer before the unit"));
        }

        let unit = SizeUnit::from_suffix(suffix)
            .ok_or_else(|| ParseSizeError::new(suffix, "unrecognized unit"))?;
        let value: u64 = digits
            .parse()
            .map_err(|_| ParseSizeError::new(digits, "integer out of range"))?;

        if value == 0 {
            return Err(ParseSizeError::new(input, "size must be positive"));
        }

        // Reject values whose MiB conversion would overflow.
        value
            .checked_mul(Self::multiplier(unit))
            .ok_or_else(|| ParseSizeError::new(input, "size too large"))?;

        Ok(Self { value, unit })
    }
}

impl TryFrom<String> for SizeSpec {
    type Error = ParseSizeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SizeSpec> for String {
    fn from(value: SizeSpec) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

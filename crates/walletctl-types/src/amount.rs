//! Amount types
//!
//! Backends account in sats; the wire protocol speaks millisats. Both are
//! signed so that budget arithmetic can go below zero before clamping.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed multiplier from the base unit to the wire unit
pub const MSAT_PER_SAT: i64 = 1000;

/// An amount in the backend's base unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sats(pub i64);

impl Sats {
    pub const ZERO: Sats = Sats(0);

    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn saturating_add(self, other: Sats) -> Sats {
        Sats(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Sats) -> Sats {
        Sats(self.0.saturating_sub(other.0))
    }

    /// Clamp negative values to zero
    pub fn non_negative(self) -> Sats {
        Sats(self.0.max(0))
    }

    /// Convert to the wire unit
    pub fn to_msats(self) -> MilliSats {
        MilliSats(self.0.saturating_mul(MSAT_PER_SAT))
    }
}

impl fmt::Display for Sats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat", self.0)
    }
}

/// An amount in the protocol's wire unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MilliSats(pub i64);

impl MilliSats {
    pub const ZERO: MilliSats = MilliSats(0);

    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn saturating_add(self, other: MilliSats) -> MilliSats {
        MilliSats(self.0.saturating_add(other.0))
    }

    /// Convert to whole sats, rounding toward zero
    pub fn to_sats(self) -> Sats {
        Sats(self.0 / MSAT_PER_SAT)
    }
}

impl fmt::Display for MilliSats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} msat", self.0)
    }
}
